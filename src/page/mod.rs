//! Documents built from YAML page fixtures
//!
//! A [`Page`] mounts every container of a fixture (frames included), spawns
//! the schedulers and registers the scripted tests. Hooks append to a shared
//! log so callers can check when they fired.

pub mod config;
pub mod runner;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::common::{Error, Result};
use crate::coordinator::state::ContainerState;
use crate::coordinator::{Hooks, TestContainer, TestDeclaration, TestFn, TestScope};
use crate::document::Document;
use crate::frame;

pub use config::{ContainerFixture, FrameFixture, HookFixture, PageFixture, Step, TestFixture};

type HookLog = Arc<Mutex<Vec<String>>>;

/// How a page is put together
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Register each container's tests last to first
    pub reverse_registration: bool,
    /// How long a frame test waits for the frame's result
    pub frame_timeout: Duration,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            reverse_registration: false,
            frame_timeout: frame::DEFAULT_RESULT_TIMEOUT,
        }
    }
}

struct RunningScheduler {
    url: String,
    container_id: String,
    handle: JoinHandle<Result<Vec<Error>>>,
}

pub struct Page {
    document: Document,
    containers: Vec<TestContainer>,
    schedulers: Vec<RunningScheduler>,
    hook_log: HookLog,
}

impl Page {
    /// Build the page's documents and start scheduling
    ///
    /// Must be called within a tokio runtime.
    pub fn build(fixture: &PageFixture, options: &BuildOptions) -> Result<Self> {
        let mut page = Self {
            document: Document::new(fixture.url.clone()),
            containers: Vec::new(),
            schedulers: Vec::new(),
            hook_log: Arc::new(Mutex::new(Vec::new())),
        };

        for frame in &fixture.frames {
            let child = page.document.append_frame(&frame.src)?;
            for container in &frame.containers {
                page.mount(&child, container, options)?;
            }
        }
        let document = page.document.clone();
        for container in &fixture.containers {
            page.mount(&document, container, options)?;
        }

        Ok(page)
    }

    fn mount(&mut self, document: &Document, fixture: &ContainerFixture, options: &BuildOptions) -> Result<()> {
        let hooks = scripted_hooks(&fixture.hooks, &fixture.id, &self.hook_log);
        let (container, scheduler) = TestContainer::mount(document, &fixture.id, hooks)?;
        self.schedulers.push(RunningScheduler {
            url: document.url().to_string(),
            container_id: fixture.id.clone(),
            handle: scheduler.spawn(),
        });

        for group in &fixture.groups {
            let scope = format!("{}/{}", fixture.id, group.title);
            container.add_group(&group.title, scripted_hooks(&group.hooks, &scope, &self.hook_log))?;
        }

        let mut declarations = Vec::with_capacity(fixture.tests.len());
        for test in &fixture.tests {
            let declaration = declaration(test, options);
            container.render_test(declaration.clone())?;
            declarations.push(declaration);
        }

        container.discover_total_tests()?;
        if options.reverse_registration {
            declarations.reverse();
        }
        for declaration in &declarations {
            container.register_test(declaration)?;
        }

        self.containers.push(container);
        Ok(())
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn container(&self, id: &str) -> Option<&TestContainer> {
        self.containers.iter().find(|c| c.id() == id)
    }

    /// Every published container, frames included, tagged with its frame url
    pub fn containers(&self) -> Vec<ContainerState> {
        let mut states = self.document.registry().containers();
        for src in self.document.frame_srcs() {
            if let Ok(child) = self.document.frame(&src) {
                states.extend(child.registry().containers().into_iter().map(|mut state| {
                    state.iframe_url = Some(src.clone());
                    state
                }));
            }
        }
        states
    }

    /// The page document and its frame documents, keeping those that mount a container
    fn published_documents(&self) -> Vec<Document> {
        let mut documents = vec![self.document.clone()];
        documents.extend(
            self.document
                .frame_srcs()
                .iter()
                .filter_map(|src| self.document.frame(src).ok()),
        );
        documents.retain(|d| !d.container_ids().is_empty());
        documents
    }

    /// Whether every document's registry reports all of its tests registered
    pub fn all_tests_registered(&self) -> bool {
        let documents = self.published_documents();
        !documents.is_empty() && documents.iter().all(|d| d.registry().are_all_tests_registered())
    }

    /// Whether some scheduler already stopped, which only a fatal error does
    pub fn has_stopped_scheduler(&self) -> bool {
        self.schedulers.iter().any(|s| s.handle.is_finished())
    }

    /// Hook invocations so far, as `"<scope> <hook>"`
    pub fn hook_log(&self) -> Vec<String> {
        self.hook_log.lock().clone()
    }

    /// Release every container and wait for the schedulers
    ///
    /// Returns the execution errors of failed tests; the first fatal
    /// scheduler error is returned as `Err`.
    pub async fn shutdown(self) -> Result<Vec<Error>> {
        let Page {
            containers,
            schedulers,
            ..
        } = self;
        drop(containers);

        let mut failures = Vec::new();
        let mut fatal = None;
        for scheduler in schedulers {
            match scheduler.handle.await {
                Ok(Ok(errors)) => failures.extend(errors),
                Ok(Err(e)) => {
                    tracing::debug!(url = %scheduler.url, container = %scheduler.container_id, "scheduler failed");
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    fatal.get_or_insert(Error::Internal(format!(
                        "Scheduler of container '{}' crashed: {}",
                        scheduler.container_id, e
                    )));
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(failures),
        }
    }
}

fn scripted_hooks(fixture: &HookFixture, scope: &str, log: &HookLog) -> Hooks {
    let entry = |hook: &str, message: &Option<String>| {
        message.clone().map(|message| {
            let line = format!("{} {}", scope, hook);
            (line, message, log.clone())
        })
    };

    let mut hooks = Hooks::default();
    if let Some((line, message, log)) = entry("before_all", &fixture.before_all) {
        hooks = hooks.before_all(move |_| record_hook(&log, &line, &message));
    }
    if let Some((line, message, log)) = entry("before_each", &fixture.before_each) {
        hooks = hooks.before_each(move || record_hook(&log, &line, &message));
    }
    if let Some((line, message, log)) = entry("after_each", &fixture.after_each) {
        hooks = hooks.after_each(move || record_hook(&log, &line, &message));
    }
    if let Some((line, message, log)) = entry("after_all", &fixture.after_all) {
        hooks = hooks.after_all(move |_| record_hook(&log, &line, &message));
    }
    hooks
}

fn record_hook(log: &HookLog, line: &str, message: &str) {
    tracing::info!(hook = line, "{}", message);
    log.lock().push(line.to_string());
}

fn declaration(fixture: &TestFixture, options: &BuildOptions) -> TestDeclaration {
    let body = scripted_body(fixture.steps.clone());
    let body = match &fixture.frame {
        Some(src) => frame::frame_test(src.clone(), body, options.frame_timeout),
        None => body,
    };

    let mut declaration = TestDeclaration::new(fixture.title.clone(), body)
        .skipped(fixture.skip)
        .only(fixture.only);
    if let Some(group) = &fixture.group {
        declaration = declaration.in_group(group.clone());
    }
    if let Some(content) = &fixture.content {
        declaration = declaration.with_content(content.clone());
    }
    declaration
}

fn scripted_body(steps: Vec<Step>) -> TestFn {
    let steps = Arc::new(steps);
    TestFn::new(move |scope: TestScope| {
        let steps = steps.clone();
        async move {
            for step in steps.iter() {
                run_step(&scope, step).await?;
            }
            Ok(())
        }
    })
}

async fn run_step(scope: &TestScope, step: &Step) -> Result<()> {
    match step {
        Step::Sleep { ms } => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            Ok(())
        }
        Step::Fail { message } => Err(Error::TestAssertion(message.clone())),
        Step::Panic { message } => panic!("{}", message),
        Step::ExpectContainer { id } => {
            if scope.document.contains_container(id) {
                Ok(())
            } else {
                Err(Error::TestAssertion(format!(
                    "Expected container '{}' in document '{}'",
                    id,
                    scope.document.url()
                )))
            }
        }
        Step::Log { message } => {
            tracing::info!(test = %scope.test_id, "{}{}", scope.document.frame_prefix(), message);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::TestState;

    #[tokio::test]
    async fn test_build_runs_scripted_tests() {
        let fixture = PageFixture::parse(
            r#"
containers:
  - id: root
    hooks:
      before_all: start
      after_all: finish
    tests:
      - title: first
        steps:
          - action: log
            message: hello
      - title: second
        steps:
          - action: fail
            message: broken
"#,
        )
        .unwrap();

        let page = Page::build(&fixture, &BuildOptions::default()).unwrap();
        crate::wait::wait_for(
            || page.all_tests_registered() && page.document().registry().are_all_containers_complete(),
            Duration::from_secs(2),
        )
        .await
        .unwrap();

        let tests = page.document().registry().test_array("root").unwrap();
        assert_eq!(tests[0].state, TestState::Success);
        assert_eq!(tests[1].state, TestState::Fail);
        assert_eq!(page.hook_log(), vec!["root before_all", "root after_all"]);

        let failures = page.shutdown().await.unwrap();
        assert_eq!(failures.len(), 1);
    }

    #[tokio::test]
    async fn test_frame_containers_are_tagged() {
        let fixture = PageFixture::parse(
            r#"
frames:
  - src: /child
    containers:
      - id: inner
        tests:
          - title: t
"#,
        )
        .unwrap();

        let page = Page::build(&fixture, &BuildOptions::default()).unwrap();
        assert!(page.document().registry().is_empty());
        let child = page.document().frame("/child").unwrap();
        crate::wait::wait_for(
            || page.all_tests_registered() && child.registry().are_all_containers_complete(),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        let containers = page.containers();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].iframe_url.as_deref(), Some("/child"));
        page.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_group_fails_build() {
        let fixture = PageFixture::parse(
            "containers:\n  - id: a\n    groups:\n      - title: g\n      - title: g\n",
        )
        .unwrap();
        assert!(matches!(
            Page::build(&fixture, &BuildOptions::default()),
            Err(Error::DuplicateGroup(_))
        ));
    }
}
