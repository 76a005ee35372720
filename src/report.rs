//! Test statistics and progress rendering

use indexmap::IndexMap;
use serde::Serialize;

use crate::coordinator::state::{ContainerState, TestRecord, TestState};

/// Group name used for tests outside any group
pub const NO_GROUP: &str = "(no test group)";

/// Counts per state plus an aggregate state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TestStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
    pub running: usize,
    pub state: TestState,
}

impl TestStats {
    pub fn from_tests<'a>(tests: impl IntoIterator<Item = &'a TestRecord>) -> Self {
        let mut stats = Self {
            total: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            pending: 0,
            running: 0,
            state: TestState::Pending,
        };

        for test in tests {
            stats.total += 1;
            match test.state {
                TestState::Success => stats.passed += 1,
                TestState::Fail => stats.failed += 1,
                TestState::Skipped => stats.skipped += 1,
                TestState::Pending => stats.pending += 1,
                TestState::Running => stats.running += 1,
            }
        }

        stats.state = if stats.running > 0 {
            TestState::Running
        } else if stats.failed > 0 {
            TestState::Fail
        } else if stats.pending == stats.total {
            TestState::Pending
        } else if stats.skipped == stats.total {
            TestState::Skipped
        } else if stats.passed + stats.skipped == stats.total {
            TestState::Success
        } else {
            TestState::Pending
        };
        stats
    }

    pub fn from_containers(containers: &[ContainerState]) -> Self {
        Self::from_tests(containers.iter().flat_map(|c| c.tests.values()))
    }
}

/// Tests bucketed by group title, in first-seen order
pub fn group_tests<'a>(
    tests: impl IntoIterator<Item = &'a TestRecord>,
    no_group_name: &str,
) -> IndexMap<String, Vec<&'a TestRecord>> {
    let mut groups: IndexMap<String, Vec<&TestRecord>> = IndexMap::new();
    for test in tests {
        let name = match test.group_title.as_deref() {
            Some(title) if !title.is_empty() => title,
            _ => no_group_name,
        };
        groups.entry(name.to_string()).or_default().push(test);
    }
    groups
}

pub fn count_failed(containers: &[ContainerState]) -> usize {
    containers
        .iter()
        .flat_map(|c| c.tests.values())
        .filter(|t| t.state == TestState::Fail)
        .count()
}

/// Plain-text tree of containers, groups and test states
pub fn render_progress(containers: &[ContainerState]) -> String {
    let mut out = String::new();
    let many = containers.len() > 1;

    for (i, container) in containers.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        if many {
            out.push_str(&format!("Container Id - {}:\n", container.container_id));
        }

        let groups = group_tests(container.tests.values(), NO_GROUP);
        let mut lines = Vec::new();
        for (title, tests) in &groups {
            lines.push(format!("  Group - {}:", title));
            for test in tests {
                lines.push(format!("    {}: {}", test.title, test.state));
            }
        }
        out.push_str(&lines.join("\n"));
    }

    out
}
