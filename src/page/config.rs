//! Page fixture types
//!
//! Defines the data structures for deserializing YAML pages: the containers,
//! groups, hooks and scripted tests a document is built from.

use std::path::Path;

use serde::Deserialize;

use crate::common::{Error, Result};

/// A complete page loaded from a YAML file
#[derive(Deserialize, Debug, Clone)]
pub struct PageFixture {
    /// Url of the top-level document
    #[serde(default = "default_url")]
    pub url: String,
    /// Optional description shown by the runner
    pub description: Option<String>,
    /// Test containers mounted in the top-level document
    #[serde(default)]
    pub containers: Vec<ContainerFixture>,
    /// Frames embedded in the top-level document
    #[serde(default)]
    pub frames: Vec<FrameFixture>,
}

fn default_url() -> String {
    "/".to_string()
}

impl PageFixture {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse page: {}", e)))
    }
}

/// An embedded frame and the containers its document mounts
#[derive(Deserialize, Debug, Clone)]
pub struct FrameFixture {
    pub src: String,
    #[serde(default)]
    pub containers: Vec<ContainerFixture>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ContainerFixture {
    pub id: String,
    #[serde(default)]
    pub hooks: HookFixture,
    #[serde(default)]
    pub groups: Vec<GroupFixture>,
    #[serde(default)]
    pub tests: Vec<TestFixture>,
}

/// Hooks are scripted as messages; each invocation logs its message
#[derive(Deserialize, Debug, Clone, Default)]
pub struct HookFixture {
    pub before_all: Option<String>,
    pub before_each: Option<String>,
    pub after_each: Option<String>,
    pub after_all: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GroupFixture {
    pub title: String,
    #[serde(default)]
    pub hooks: HookFixture,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TestFixture {
    pub title: String,
    /// Title of the group the test belongs to
    pub group: Option<String>,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub only: bool,
    /// Child content rendered with the test
    pub content: Option<String>,
    /// Run the steps inside the frame with this src
    pub frame: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A single scripted action in a test body
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Suspend the body
    Sleep { ms: u64 },
    /// Fail the test with a message
    Fail { message: String },
    /// Panic inside the body
    Panic { message: String },
    /// Require a container to be mounted in the document the body runs in
    ExpectContainer { id: String },
    /// Emit a log line
    Log { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page() {
        let page = PageFixture::parse(
            r#"
url: /async-tests
containers:
  - id: root
    hooks:
      before_all: setting up
    groups:
      - title: math
    tests:
      - title: adds
        group: math
        steps:
          - action: sleep
            ms: 10
          - action: expect_container
            id: root
      - title: broken
        skip: true
        steps:
          - action: fail
            message: nope
frames:
  - src: /child
    containers:
      - id: inner
"#,
        )
        .unwrap();

        assert_eq!(page.url, "/async-tests");
        let root = &page.containers[0];
        assert_eq!(root.hooks.before_all.as_deref(), Some("setting up"));
        assert_eq!(root.groups[0].title, "math");
        assert_eq!(root.tests[0].steps[0], Step::Sleep { ms: 10 });
        assert!(root.tests[1].skip);
        assert_eq!(page.frames[0].containers[0].id, "inner");
    }

    #[test]
    fn test_defaults() {
        let page = PageFixture::parse("containers: []").unwrap();
        assert_eq!(page.url, "/");
        assert!(page.frames.is_empty());
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let err = PageFixture::parse(
            "containers:\n  - id: a\n    tests:\n      - title: t\n        steps:\n          - action: teleport\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = PageFixture::load(Path::new("/nonexistent/page.yaml")).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
