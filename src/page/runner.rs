//! Page runner implementation
//!
//! Acts as the automation driver: builds a page, waits for every test to
//! register, then reads published state until all containers complete,
//! printing progress along the way.

use std::path::Path;
use std::time::Duration;

use colored::Colorize;

use super::{BuildOptions, Page, PageFixture};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::coordinator::state::{ContainerState, TestState};
use crate::observe;
use crate::report::{self, TestStats};
use crate::wait;

/// Flags of a single run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub verbose: bool,
    /// Print the final published state as JSON instead of the tree
    pub json: bool,
    pub reverse_registration: bool,
}

/// Result of a page run
#[derive(Debug)]
pub struct RunSummary {
    pub url: String,
    pub stats: TestStats,
    /// `result_info` of every failed test
    pub failures: Vec<String>,
    /// Hook invocations in the order they fired
    pub hooks: Vec<String>,
}

impl RunSummary {
    pub fn passed(&self) -> bool {
        self.stats.failed == 0
    }
}

/// Run a page from a YAML file
pub async fn run_page(path: &Path, options: &RunOptions, config: &Config) -> Result<RunSummary> {
    let fixture = PageFixture::load(path)?;
    run_fixture(&fixture, options, config).await
}

pub async fn run_fixture(fixture: &PageFixture, options: &RunOptions, config: &Config) -> Result<RunSummary> {
    if !options.json {
        println!("\n{} {}", "Running Page:".blue().bold(), fixture.url.white().bold());
        if let Some(desc) = &fixture.description {
            println!("  {}", desc.dimmed());
        }
    }

    let build = BuildOptions {
        reverse_registration: options.reverse_registration,
        frame_timeout: config.timeouts.frame_result(),
    };
    let page = Page::build(fixture, &build)?;

    let containers = match drive(&page, options, config).await {
        Ok(containers) => containers,
        Err(e) => {
            // A stopped scheduler reports its own error first
            page.shutdown().await?;
            return Err(e);
        }
    };

    let hooks = page.hook_log();
    let execution_errors = page.shutdown().await?;
    tracing::debug!(count = execution_errors.len(), "execution errors collected");

    let summary = RunSummary {
        url: fixture.url.clone(),
        stats: TestStats::from_containers(&containers),
        failures: failure_details(&containers),
        hooks,
    };

    if options.json {
        let json = serde_json::json!({
            "url": summary.url,
            "stats": summary.stats,
            "testContainers": containers,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        print_summary(&containers, &summary);
    }

    Ok(summary)
}

/// Wait for registration, then follow every container until it completes
async fn drive(page: &Page, options: &RunOptions, config: &Config) -> Result<Vec<ContainerState>> {
    let timeouts = &config.timeouts;
    let progress_interval = Duration::from_millis(config.driver.progress_interval_ms.max(1));
    let document = page.document();
    let frame_srcs = document.frame_srcs();

    // (frame src, container id) of everything the page publishes
    let mut targets: Vec<(Option<String>, String)> = match observe::container_ids(document) {
        Ok(ids) => ids.into_iter().map(|id| (None, id)).collect(),
        Err(Error::NoContainers(_)) if !frame_srcs.is_empty() => Vec::new(),
        Err(e) => return Err(e),
    };
    for src in frame_srcs {
        let ids = observe::wait_for_frame_containers(document, &src, timeouts.wait_default()).await?;
        if !options.json {
            println!("  {} Frame {} has containers: {}", "✓".green(), src, ids.join(", ").dimmed());
        }
        targets.extend(ids.into_iter().map(|id| (Some(src.clone()), id)));
    }

    if !options.json {
        println!("\n{}", "Waiting for all tests to register...".cyan());
    }
    wait::wait_for_with_interval(
        || page.all_tests_registered() || page.has_stopped_scheduler(),
        timeouts.registration(),
        timeouts.poll_interval(),
    )
    .await?;
    if !options.json {
        println!("  {} All tests have been registered.", "✓".green());
        println!("\n{}", "Running tests...".cyan());
    }

    let mut containers = Vec::with_capacity(targets.len());
    let mut last_progress = String::new();
    for (src, id) in &targets {
        let watch = observe::watch_container_until_complete(document, id, src.as_deref(), |_| {
            if !options.verbose || options.json {
                return;
            }
            let progress = report::render_progress(&page.containers());
            if progress != last_progress {
                println!("{}\n", progress.dimmed());
                last_progress = progress;
            }
        });
        let state = tokio::select! {
            state = watch => state?,
            _ = scheduler_stopped(page, progress_interval) => {
                return Err(Error::Internal("A container stopped scheduling".to_string()));
            }
        };
        containers.push(state);
    }
    Ok(containers)
}

/// Resolve once some scheduler of the page has stopped
async fn scheduler_stopped(page: &Page, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if page.has_stopped_scheduler() {
            return;
        }
    }
}

fn failure_details(containers: &[ContainerState]) -> Vec<String> {
    containers
        .iter()
        .flat_map(|c| c.tests.values())
        .filter(|t| t.state == TestState::Fail)
        .map(|t| {
            t.result_info
                .clone()
                .unwrap_or_else(|| format!("Test \"{}\" failed", t.title))
        })
        .collect()
}

fn print_summary(containers: &[ContainerState], summary: &RunSummary) {
    println!("\n{}", report::render_progress(containers));

    let stats = &summary.stats;
    println!(
        "\n  {} total, {} passed, {} failed, {} skipped",
        stats.total,
        stats.passed.to_string().green(),
        stats.failed.to_string().red(),
        stats.skipped.to_string().yellow()
    );

    if summary.passed() {
        println!("\n{} {}\n", "✓".green().bold(), "All tests passed".green().bold());
    } else {
        for failure in &summary.failures {
            println!("  {} {}", "✗".red(), failure);
        }
        println!(
            "\n{} {}\n",
            "✗".red().bold(),
            format!("{} test(s) failed", report::count_failed(containers)).red().bold()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> Config {
        let mut config = Config::default();
        config.timeouts.poll_interval_ms = 10;
        config.timeouts.registration_ms = 2000;
        config.driver.progress_interval_ms = 10;
        config
    }

    #[tokio::test]
    async fn test_run_fixture_summarizes_failures() {
        let fixture = PageFixture::parse(
            r#"
url: /summary
containers:
  - id: root
    tests:
      - title: ok
      - title: bad
        steps:
          - action: fail
            message: expected failure
      - title: ignored
        skip: true
"#,
        )
        .unwrap();

        let options = RunOptions {
            json: true,
            ..Default::default()
        };
        let summary = run_fixture(&fixture, &options, &quick_config()).await.unwrap();
        assert!(!summary.passed());
        assert_eq!((summary.stats.passed, summary.stats.failed, summary.stats.skipped), (1, 1, 1));
        assert_eq!(
            summary.failures,
            vec!["Test \"bad\" failed: Test assertion failed: expected failure".to_string()]
        );
    }

    #[tokio::test]
    async fn test_fatal_group_error_stops_run() {
        let fixture = PageFixture::parse(
            r#"
containers:
  - id: root
    tests:
      - title: orphan
        group: missing
"#,
        )
        .unwrap();

        let options = RunOptions {
            json: true,
            ..Default::default()
        };
        let err = run_fixture(&fixture, &options, &quick_config()).await.unwrap_err();
        assert!(matches!(err, Error::GroupNotFound(ref g) if g == "missing"));
    }

    #[tokio::test]
    async fn test_frame_only_page_runs_frame_containers() {
        let fixture = PageFixture::parse(
            r#"
url: /host
frames:
  - src: /child
    containers:
      - id: inner
        tests:
          - title: ok
          - title: bad
            steps:
              - action: fail
                message: nope
"#,
        )
        .unwrap();

        let options = RunOptions {
            json: true,
            ..Default::default()
        };
        let summary = run_fixture(&fixture, &options, &quick_config()).await.unwrap();
        assert_eq!((summary.stats.passed, summary.stats.failed), (1, 1));
        assert_eq!(
            summary.failures,
            vec!["Iframe /child - Test \"bad\" failed: Test assertion failed: nope".to_string()]
        );
    }

    #[tokio::test]
    async fn test_page_without_containers_is_an_error() {
        let fixture = PageFixture::parse("url: /empty\n").unwrap();
        let options = RunOptions {
            json: true,
            ..Default::default()
        };
        let err = run_fixture(&fixture, &options, &quick_config()).await.unwrap_err();
        assert!(matches!(err, Error::NoContainers(ref url) if url == "/empty"));
    }
}
