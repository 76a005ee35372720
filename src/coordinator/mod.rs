//! Test execution coordinator
//!
//! Registration, scheduling and hooks for test containers. Declaring code
//! mounts a [`TestContainer`], spawns its [`Scheduler`], then renders and
//! registers tests; every state change is published to the document's
//! registry as it happens.

pub mod container;
pub mod hooks;
pub mod reconciler;
pub mod scheduler;
pub mod state;
pub mod store;

pub use container::TestContainer;
pub use scheduler::{ContainerEvent, Scheduler, Step};
pub use state::{
    ContainerState, GroupRecord, Hooks, TestDeclaration, TestFn, TestMap, TestRecord, TestScope,
    TestState,
};
pub use store::ContainerStore;
