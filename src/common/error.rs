//! Error types for the test coordinator
//!
//! Errors fall into four groups. Configuration and drift errors are fatal and
//! stop a container's scheduler. Execution errors belong to a single test and
//! are recorded on it. Timeout errors surface from waiting, never from the
//! work being waited on.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the coordinator
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Containers should have unique Ids. Found duplicate Id: '{0}'")]
    DuplicateContainer(String),

    #[error("Duplicate group ID found: {0}")]
    DuplicateGroup(String),

    #[error("Duplicate test ID found: {0}")]
    DuplicateTest(String),

    #[error("Group \"{0}\" not found.")]
    GroupNotFound(String),

    #[error("Container with ID '{0}' is not mounted in the document")]
    ContainerNotMounted(String),

    #[error("Found a container without an Id. Every container must have an Id.")]
    ContainerWithoutId,

    #[error("No test containers found. Document: {0}")]
    NoContainers(String),

    #[error("Could not find frame with src: {0}")]
    FrameNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === Drift Errors ===
    #[error("Container with ID '{0}' not found in the published state")]
    UnknownContainer(String),

    // === Execution Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    #[error("Test panicked: {0}")]
    TestPanicked(String),

    #[error("Frame test in '{0}' reported Fail")]
    FrameTestFailed(String),

    // === Timeout Errors ===
    #[error("timed out waiting for condition to be true after {waited_ms}ms (waiting since {location})")]
    WaitTimeout { waited_ms: u64, location: String },

    #[error("Test timed out: no result from frame after {0}ms")]
    FrameTimeout(u64),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a wait timeout error attributed to a caller location
    pub fn wait_timeout(waited: std::time::Duration, location: &std::panic::Location<'_>) -> Self {
        Self::WaitTimeout {
            waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
            location: location.to_string(),
        }
    }

    /// Create a file read error
    pub fn file_read(path: &std::path::Path, error: impl std::fmt::Display) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Configuration and drift errors stop scheduling; nothing retries them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::DuplicateContainer(_)
                | Error::DuplicateGroup(_)
                | Error::DuplicateTest(_)
                | Error::GroupNotFound(_)
                | Error::ContainerNotMounted(_)
                | Error::ContainerWithoutId
                | Error::NoContainers(_)
                | Error::FrameNotFound(_)
                | Error::Config(_)
                | Error::ConfigParse(_)
                | Error::UnknownContainer(_)
        )
    }

    /// Whether this error came from waiting rather than from the work itself
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::WaitTimeout { .. } | Error::FrameTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::DuplicateTest("a".into()).is_fatal());
        assert!(Error::UnknownContainer("root".into()).is_fatal());
        assert!(!Error::TestAssertion("nope".into()).is_fatal());
        assert!(!Error::FrameTimeout(5000).is_fatal());
    }

    #[test]
    fn test_wait_timeout_carries_location() {
        let location = std::panic::Location::caller();
        let err = Error::wait_timeout(std::time::Duration::from_millis(250), location);
        assert!(err.is_timeout());
        let message = err.to_string();
        assert!(message.contains("250ms"));
        assert!(message.contains("error.rs"));
    }

    #[test]
    fn test_wait_timeout_saturates_huge_durations() {
        let err = Error::wait_timeout(std::time::Duration::MAX, std::panic::Location::caller());
        assert!(matches!(err, Error::WaitTimeout { waited_ms: u64::MAX, .. }));
    }
}
