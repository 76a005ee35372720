//! Container and group hooks around a test
//!
//! `before_all` fires when nothing in its scope has executed yet, and
//! `after_all` once nothing in its scope is left to execute. Tests that will
//! resolve to `Skipped` count as finished for `after_all` and as untouched
//! for `before_all`, so leading or trailing skips don't suppress either hook.
//! Requiring every test `Pending` or every test complete instead would let a
//! leading or trailing skip suppress a hook that must fire once per run.

use super::state::{ContainerState, Hooks, TestRecord, TestState};
use crate::common::{Error, Result};

fn nothing_executed<'a>(mut tests: impl Iterator<Item = &'a TestRecord>) -> bool {
    !tests.any(|t| t.state.has_executed())
}

fn nothing_left<'a>(mut tests: impl Iterator<Item = &'a TestRecord>, has_only: bool) -> bool {
    tests.all(|t| {
        t.state.is_terminal() || (t.state == TestState::Pending && t.resolves_to_skip(has_only))
    })
}

fn group_hooks<'a>(state: &'a ContainerState, record: &TestRecord) -> Result<Option<&'a Hooks>> {
    match record.group_title.as_deref() {
        None => Ok(None),
        Some(title) => state
            .groups
            .get(title)
            .map(|g| Some(&g.hooks))
            .ok_or_else(|| Error::GroupNotFound(title.to_string())),
    }
}

/// Run before-hooks for `record` against the state captured before it started
pub fn run_before_hooks(container: &Hooks, state: &ContainerState, record: &TestRecord) -> Result<()> {
    if let Some(before_all) = &container.before_all {
        if nothing_executed(state.tests.values()) {
            tracing::debug!(container = %state.container_id, "running beforeAll");
            before_all(&state.tests);
        }
    }
    if let Some(before_each) = &container.before_each {
        before_each();
    }

    if let Some(group) = group_hooks(state, record)? {
        let title = record.group_title.as_deref().unwrap_or_default();
        if let Some(before_all) = &group.before_all {
            if nothing_executed(state.group_tests(title)) {
                tracing::debug!(group = title, "running group beforeAll");
                before_all(&state.tests);
            }
        }
        if let Some(before_each) = &group.before_each {
            before_each();
        }
    }

    Ok(())
}

/// Run after-hooks for `record` against the state after it settled
pub fn run_after_hooks(container: &Hooks, state: &ContainerState, record: &TestRecord) -> Result<()> {
    let has_only = state.has_only();

    if let Some(after_each) = &container.after_each {
        after_each();
    }
    if let Some(after_all) = &container.after_all {
        if nothing_left(state.tests.values(), has_only) {
            tracing::debug!(container = %state.container_id, "running afterAll");
            after_all(&state.tests);
        }
    }

    if let Some(group) = group_hooks(state, record)? {
        let title = record.group_title.as_deref().unwrap_or_default();
        if let Some(after_each) = &group.after_each {
            after_each();
        }
        if let Some(after_all) = &group.after_all {
            if nothing_left(state.group_tests(title), has_only) {
                tracing::debug!(group = title, "running group afterAll");
                after_all(&state.tests);
            }
        }
    }

    Ok(())
}
