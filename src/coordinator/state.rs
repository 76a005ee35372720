//! Test, group and container records
//!
//! These are the values the store holds and the registry publishes. They
//! serialize with camelCase names; bodies and hooks are skipped.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use serde::Serialize;

use crate::common::Result;
use crate::document::Document;

/// Tests keyed by id, in registration order
pub type TestMap = IndexMap<String, TestRecord>;

/// Groups keyed by title
pub type GroupMap = IndexMap<String, GroupRecord>;

/// Lifecycle of a single test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestState {
    Pending,
    Running,
    Skipped,
    Success,
    Fail,
}

impl TestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Skipped | Self::Success | Self::Fail)
    }

    /// Whether the test body has been (or is being) executed
    pub fn has_executed(self) -> bool {
        matches!(self, Self::Running | Self::Success | Self::Fail)
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Skipped => write!(f, "Skipped"),
            Self::Success => write!(f, "Success"),
            Self::Fail => write!(f, "Fail"),
        }
    }
}

/// What a test body gets to see when it runs
#[derive(Debug, Clone)]
pub struct TestScope {
    /// The document the body executes in (a frame's own document for frame tests)
    pub document: Document,
    pub test_id: String,
    pub title: String,
}

type BodyFn = dyn Fn(TestScope) -> BoxFuture<'static, Result<()>> + Send + Sync;

/// Executable test body
#[derive(Clone)]
pub struct TestFn(Arc<BodyFn>);

impl TestFn {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(TestScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self(Arc::new(move |scope| Box::pin(f(scope))))
    }

    /// A body with no await points
    pub fn from_sync<F>(f: F) -> Self
    where
        F: Fn(&TestScope) -> Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(move |scope| {
            let result = f(&scope);
            Box::pin(async move { result })
        }))
    }

    pub fn call(&self, scope: TestScope) -> BoxFuture<'static, Result<()>> {
        (self.0)(scope)
    }

    /// Identity comparison; two bodies are the same only if they share an allocation
    pub fn same_as(&self, other: &TestFn) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for TestFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TestFn({:p})", Arc::as_ptr(&self.0))
    }
}

/// Derive a test's id from its title and enclosing group
pub fn test_id(title: &str, group_title: Option<&str>) -> String {
    match group_title {
        Some(group) if !group.is_empty() => format!("{} - {}", group, title),
        _ => title.to_string(),
    }
}

/// One schedulable test
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_title: Option<String>,
    #[serde(skip)]
    pub body: TestFn,
    pub skip: bool,
    pub only: bool,
    pub state: TestState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_info: Option<String>,
}

impl TestRecord {
    /// Whether scheduling resolves this test to `Skipped`
    pub fn resolves_to_skip(&self, has_only: bool) -> bool {
        self.skip || (has_only && !self.only)
    }

    pub fn with_state(mut self, state: TestState) -> Self {
        self.state = state;
        self
    }

    pub fn scope(&self, document: Document) -> TestScope {
        TestScope {
            document,
            test_id: self.id.clone(),
            title: self.title.clone(),
        }
    }
}

/// Parameters a test node declares. A change to any of them re-runs the
/// whole container.
#[derive(Debug, Clone)]
pub struct TestDeclaration {
    pub title: String,
    pub group_title: Option<String>,
    pub body: TestFn,
    pub skip: bool,
    pub only: bool,
    /// Child content rendered once the test starts
    pub content: Option<String>,
}

impl TestDeclaration {
    pub fn new(title: impl Into<String>, body: TestFn) -> Self {
        Self {
            title: title.into(),
            group_title: None,
            body,
            skip: false,
            only: false,
            content: None,
        }
    }

    pub fn in_group(mut self, group_title: impl Into<String>) -> Self {
        self.group_title = Some(group_title.into());
        self
    }

    pub fn skipped(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    pub fn only(mut self, only: bool) -> Self {
        self.only = only;
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn id(&self) -> String {
        test_id(&self.title, self.group_title.as_deref())
    }

    pub fn props_changed(&self, other: &TestDeclaration) -> bool {
        self.title != other.title
            || self.skip != other.skip
            || self.only != other.only
            || !self.body.same_as(&other.body)
            || self.content != other.content
    }

    /// A fresh `Pending` record for this declaration
    pub fn to_record(&self) -> TestRecord {
        TestRecord {
            id: self.id(),
            title: self.title.clone(),
            group_title: self.group_title.clone(),
            body: self.body.clone(),
            skip: self.skip,
            only: self.only,
            state: TestState::Pending,
            result_info: None,
        }
    }
}

pub type EachHook = Arc<dyn Fn() + Send + Sync>;
pub type AllHook = Arc<dyn Fn(&TestMap) + Send + Sync>;

/// Before/after hooks of a container or group
#[derive(Clone, Default)]
pub struct Hooks {
    pub before_each: Option<EachHook>,
    pub after_each: Option<EachHook>,
    pub before_all: Option<AllHook>,
    pub after_all: Option<AllHook>,
}

impl Hooks {
    pub fn before_each(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.before_each = Some(Arc::new(f));
        self
    }

    pub fn after_each(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.after_each = Some(Arc::new(f));
        self
    }

    pub fn before_all(mut self, f: impl Fn(&TestMap) + Send + Sync + 'static) -> Self {
        self.before_all = Some(Arc::new(f));
        self
    }

    pub fn after_all(mut self, f: impl Fn(&TestMap) + Send + Sync + 'static) -> Self {
        self.after_all = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_each", &self.before_each.is_some())
            .field("after_each", &self.after_each.is_some())
            .field("before_all", &self.before_all.is_some())
            .field("after_all", &self.after_all.is_some())
            .finish()
    }
}

/// A named sub-scope of tests sharing hooks
#[derive(Debug, Clone, Serialize)]
pub struct GroupRecord {
    pub title: String,
    #[serde(skip)]
    pub hooks: Hooks,
}

impl GroupRecord {
    pub fn new(title: impl Into<String>, hooks: Hooks) -> Self {
        Self {
            title: title.into(),
            hooks,
        }
    }
}

/// Authoritative record of one container
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerState {
    pub tests: TestMap,
    #[serde(rename = "groupRecord")]
    pub groups: GroupMap,
    pub re_run_count: u64,
    pub current_test_index: usize,
    pub container_id: String,
    pub total_number_of_tests: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iframe_url: Option<String>,
}

impl ContainerState {
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            tests: TestMap::new(),
            groups: GroupMap::new(),
            re_run_count: 0,
            current_test_index: 0,
            container_id: container_id.into(),
            total_number_of_tests: None,
            iframe_url: None,
        }
    }

    pub fn registered_count(&self) -> usize {
        self.tests.len()
    }

    pub fn test_array(&self) -> Vec<TestRecord> {
        self.tests.values().cloned().collect()
    }

    pub fn has_only(&self) -> bool {
        self.tests.values().any(|t| t.only)
    }

    pub fn has_running(&self) -> bool {
        self.tests.values().any(|t| t.state == TestState::Running)
    }

    /// Every registered test has reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.tests.values().all(|t| t.state.is_terminal())
    }

    pub fn group_tests<'a>(&'a self, group_title: &'a str) -> impl Iterator<Item = &'a TestRecord> + 'a {
        self.tests
            .values()
            .filter(move |t| t.group_title.as_deref() == Some(group_title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> TestFn {
        TestFn::from_sync(|_| Ok(()))
    }

    #[test]
    fn test_ids_include_group_title() {
        assert_eq!(test_id("adds", Some("math")), "math - adds");
        assert_eq!(test_id("adds", None), "adds");
        assert_eq!(test_id("adds", Some("")), "adds");
    }

    #[test]
    fn test_skip_resolution_is_per_test() {
        let decl = TestDeclaration::new("a", noop());
        let plain = decl.to_record();
        let only = decl.clone().only(true).to_record();
        let skipped = decl.skipped(true).to_record();

        assert!(!plain.resolves_to_skip(false));
        assert!(plain.resolves_to_skip(true));
        assert!(!only.resolves_to_skip(true));
        assert!(skipped.resolves_to_skip(false));
    }

    #[test]
    fn test_props_changed_compares_body_identity() {
        let body = noop();
        let a = TestDeclaration::new("a", body.clone());
        let same = TestDeclaration::new("a", body);
        let other_body = TestDeclaration::new("a", noop());

        assert!(!a.props_changed(&same));
        assert!(a.props_changed(&other_body));
        assert!(a.props_changed(&same.clone().with_content("<p>done</p>")));
        assert!(a.props_changed(&same.only(true)));
    }

    #[test]
    fn test_container_state_serializes_without_bodies() {
        let mut state = ContainerState::new("root");
        let record = TestDeclaration::new("adds", noop()).in_group("math").to_record();
        state.tests.insert(record.id.clone(), record);
        state.groups.insert("math".into(), GroupRecord::new("math", Hooks::default()));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["containerId"], "root");
        assert_eq!(json["totalNumberOfTests"], serde_json::Value::Null);
        assert_eq!(json["tests"]["math - adds"]["state"], "Pending");
        assert_eq!(json["tests"]["math - adds"]["groupTitle"], "math");
        assert!(json["tests"]["math - adds"].get("body").is_none());
        assert_eq!(json["groupRecord"]["math"]["title"], "math");
    }
}
