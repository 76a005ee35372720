//! browser-tests - a coordinator for tests declared in a document tree
//!
//! Tests are discovered from marked nodes, run one at a time in declaration
//! order with scoped hooks, and their state is published per document so
//! observers in other frames or outside the engine can follow along.

pub mod cli;
pub mod commands;
pub mod common;
pub mod coordinator;
pub mod document;
pub mod frame;
pub mod observe;
pub mod page;
pub mod publish;
pub mod report;
pub mod wait;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use coordinator::{Hooks, TestContainer, TestDeclaration, TestFn, TestScope, TestState};
pub use document::Document;
pub use wait::wait_for;
