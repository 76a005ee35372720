//! One-at-a-time test scheduling
//!
//! Each container gets a [`Scheduler`] task fed by container events. On every
//! wake it takes as many steps as it can: skips resolve synchronously, a
//! runnable test is awaited inline, so no second test can start while one is
//! in flight.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::hooks;
use super::reconciler;
use super::state::{ContainerState, Hooks, TestState};
use super::store::ContainerStore;
use crate::common::{Error, Result};

/// Something changed in a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEvent {
    Registered(String),
    GroupAdded(String),
    Discovered(usize),
    ReRun(u64),
}

/// What the scheduler should do next for a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Registration incomplete, or a test is in flight
    Wait,
    /// Every expected test registered, but there are none
    Empty,
    /// The cursor has passed the last test
    Done,
    Skip(String),
    Run(String),
}

/// Decide the next step from a container snapshot
pub fn next_step(state: &ContainerState) -> Step {
    if !reconciler::all_tests_registered(state) {
        return Step::Wait;
    }

    let registered = state.registered_count();
    if registered == 0 {
        return Step::Empty;
    }
    if state.current_test_index >= registered {
        return Step::Done;
    }
    if state.has_running() {
        return Step::Wait;
    }

    match state.tests.get_index(state.current_test_index) {
        Some((id, test)) if test.resolves_to_skip(state.has_only()) => Step::Skip(id.clone()),
        Some((id, _)) => Step::Run(id.clone()),
        None => Step::Wait,
    }
}

#[derive(Debug)]
pub struct Scheduler {
    store: ContainerStore,
    hooks: Hooks,
    events: mpsc::UnboundedReceiver<ContainerEvent>,
    failures: Vec<Error>,
    done_epoch: Option<u64>,
    warned_empty: Option<u64>,
}

impl Scheduler {
    pub(crate) fn new(
        store: ContainerStore,
        hooks: Hooks,
        events: mpsc::UnboundedReceiver<ContainerEvent>,
    ) -> Self {
        Self {
            store,
            hooks,
            events,
            failures: Vec::new(),
            done_epoch: None,
            warned_empty: None,
        }
    }

    /// Run until every handle to the container is dropped
    ///
    /// Returns the execution errors of failed tests. A fatal error stops
    /// scheduling and is returned as `Err`.
    pub async fn run(mut self) -> Result<Vec<Error>> {
        let container_id = self.store.container_id();
        loop {
            if let Err(e) = self.schedule().await {
                tracing::error!(container = %container_id, error = %e, "Scheduler stopped");
                return Err(e);
            }
            match self.events.recv().await {
                Some(event) => tracing::trace!(container = %container_id, ?event, "woken"),
                None => break,
            }
        }
        tracing::debug!(container = %container_id, "scheduler finished");
        Ok(self.failures)
    }

    pub fn spawn(self) -> JoinHandle<Result<Vec<Error>>> {
        tokio::spawn(self.run())
    }

    /// Take steps until the container has to wait for something
    pub async fn schedule(&mut self) -> Result<()> {
        loop {
            let state = self.store.snapshot();
            let epoch = state.re_run_count;
            let prefix = self.store.document().frame_prefix();

            match next_step(&state) {
                Step::Wait => return Ok(()),
                Step::Empty => {
                    if self.warned_empty != Some(epoch) {
                        self.warned_empty = Some(epoch);
                        tracing::warn!(container = %state.container_id, "{}No tests found :(", prefix);
                    }
                    return Ok(());
                }
                Step::Done => {
                    if self.done_epoch != Some(epoch) {
                        self.done_epoch = Some(epoch);
                        tracing::info!(
                            "{}All tests from container with Id '{}' have been run.",
                            prefix,
                            state.container_id
                        );
                        tracing::info!("{}Done ✨", prefix);
                    }
                    return Ok(());
                }
                Step::Skip(id) => {
                    if state.current_test_index == 0 {
                        self.announce_start(&prefix);
                    }
                    tracing::debug!(test = %id, "skipping");
                    self.store.settle(epoch, &id, TestState::Skipped, None, true)?;
                }
                Step::Run(id) => {
                    if state.current_test_index == 0 {
                        self.announce_start(&prefix);
                    }
                    if let Err(e) = self.execute_test(epoch, &id).await {
                        if e.is_fatal() {
                            return Err(e);
                        }
                        self.failures.push(e);
                    }
                }
            }
        }
    }

    fn announce_start(&self, prefix: &str) {
        tracing::info!("{}All tests have been registered. Running tests 1 by 1...", prefix);
    }

    /// Run one test with its hooks and record the outcome
    ///
    /// A body error is recorded on the test and returned after the after-hooks
    /// ran. A result arriving after a re-run is discarded.
    async fn execute_test(&mut self, epoch: u64, test_id: &str) -> Result<()> {
        let before = self.store.snapshot();
        let record = before
            .tests
            .get(test_id)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("Test '{}' vanished before it ran", test_id)))?;

        if !self.store.transition(epoch, test_id, TestState::Running)? {
            return Ok(());
        }
        hooks::run_before_hooks(&self.hooks, &before, &record)?;

        let document = self.store.document().clone();
        let prefix = document.frame_prefix();
        let body = record.body.clone();
        let scope = record.scope(document);
        tracing::debug!(test = %record.id, "running");

        let outcome = AssertUnwindSafe(async move { body.call(scope).await })
            .catch_unwind()
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(Error::TestPanicked(panic_message(payload.as_ref()))),
        };

        let (next, result_info) = match &result {
            Ok(()) => {
                tracing::info!(test = %record.id, "{}Test \"{}\" passed", prefix, record.title);
                (TestState::Success, None)
            }
            Err(e) => {
                let info = format!("{}Test \"{}\" failed: {}", prefix, record.title, e);
                tracing::warn!(test = %record.id, "{}", info);
                (TestState::Fail, Some(info))
            }
        };

        if !self.store.settle(epoch, test_id, next, result_info, true)? {
            tracing::warn!(
                test = %record.id,
                "Discarding result of a test from a run that was restarted"
            );
            return Ok(());
        }

        let after = hooks::run_after_hooks(&self.hooks, &self.store.snapshot(), &record);
        result?;
        after
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "test body panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::state::{TestDeclaration, TestFn};

    fn state(specs: &[(&str, bool, bool, TestState)], total: Option<usize>) -> ContainerState {
        let mut state = ContainerState::new("root");
        for (title, skip, only, s) in specs {
            let record = TestDeclaration::new(*title, TestFn::from_sync(|_| Ok(())))
                .skipped(*skip)
                .only(*only)
                .to_record()
                .with_state(*s);
            state.tests.insert(record.id.clone(), record);
        }
        state.total_number_of_tests = total;
        state
    }

    #[test]
    fn test_waits_for_registration() {
        let s = state(&[("a", false, false, TestState::Pending)], None);
        assert_eq!(next_step(&s), Step::Wait);
        let s = state(&[("a", false, false, TestState::Pending)], Some(2));
        assert_eq!(next_step(&s), Step::Wait);
    }

    #[test]
    fn test_empty_and_done() {
        assert_eq!(next_step(&state(&[], Some(0))), Step::Empty);

        let mut s = state(&[("a", false, false, TestState::Success)], Some(1));
        s.current_test_index = 1;
        assert_eq!(next_step(&s), Step::Done);
    }

    #[test]
    fn test_running_test_blocks_next() {
        let mut s = state(
            &[
                ("a", false, false, TestState::Running),
                ("b", false, false, TestState::Pending),
            ],
            Some(2),
        );
        assert_eq!(next_step(&s), Step::Wait);
        s.tests["a"].state = TestState::Success;
        s.current_test_index = 1;
        assert_eq!(next_step(&s), Step::Run("b".into()));
    }

    #[test]
    fn test_only_skips_everything_else() {
        let mut s = state(
            &[
                ("a", false, false, TestState::Pending),
                ("b", false, true, TestState::Pending),
                ("c", true, true, TestState::Pending),
            ],
            Some(3),
        );
        assert_eq!(next_step(&s), Step::Skip("a".into()));
        s.current_test_index = 1;
        assert_eq!(next_step(&s), Step::Run("b".into()));
        s.current_test_index = 2;
        assert_eq!(next_step(&s), Step::Skip("c".into()));
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "test body panicked");
    }
}
