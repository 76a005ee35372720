//! Frame execution protocol
//!
//! A test owned by a frame runs inside the frame's document. The parent
//! posts `registerTest` to the child, then `executeTest`, and awaits a
//! `testResult` posted back. The child side is a listener task installed
//! once per document; it keeps the most recently registered test.
//!
//! Every exchange carries a request id. A parent only accepts the result
//! for its own request, so a body still running in the child after its
//! parent gave up cannot settle a later test.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::common::{Error, Result};
use crate::coordinator::scheduler::panic_message;
use crate::coordinator::state::{TestFn, TestRecord, TestScope, TestState};
use crate::document::Document;

/// How long the parent waits for a frame's result by default
pub const DEFAULT_RESULT_TIMEOUT: Duration = Duration::from_secs(5);

const CHILD_LISTENER: &str = "frame-child";

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

/// Fresh id for one register/execute/result exchange
pub fn next_request() -> u64 {
    NEXT_REQUEST.fetch_add(1, Ordering::Relaxed)
}

/// Outcome reported by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameResult {
    Success,
    Fail,
}

/// Message crossing a frame boundary
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FrameMessage {
    RegisterTest { request: u64, test: TestRecord },
    ExecuteTest { request: u64 },
    TestResult { request: u64, result: FrameResult },
}

/// Install the child-side listener on `child`; false if it already has one
///
/// The listener holds the document weakly and ends when it is dropped.
pub fn install_child_listener(child: &Document) -> bool {
    if !child.claim_listener(CHILD_LISTENER) {
        return false;
    }

    let mut inbox = child.listen();
    let document = child.downgrade();
    tokio::spawn(async move {
        let mut registered: Option<(u64, TestRecord)> = None;
        loop {
            let message = match inbox.recv().await {
                Ok(message) => message,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "frame listener lagged behind");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match message {
                FrameMessage::RegisterTest { request, test } => {
                    tracing::debug!(test = %test.id, request, "registering test from parent");
                    registered = Some((request, test));
                }
                FrameMessage::ExecuteTest { request } => {
                    let Some(document) = document.upgrade() else {
                        break;
                    };
                    let test = match &registered {
                        Some((registered_request, test)) if *registered_request == request => Some(test),
                        _ => None,
                    };
                    let result = execute_registered(&document, test).await;
                    document.post_to_parent(FrameMessage::TestResult { request, result });
                }
                FrameMessage::TestResult { .. } => {}
            }
        }
        tracing::trace!("frame listener finished");
    });

    true
}

async fn execute_registered(document: &Document, test: Option<&TestRecord>) -> FrameResult {
    let Some(test) = test else {
        tracing::warn!(url = document.url(), "executeTest received without a matching registered test");
        return FrameResult::Fail;
    };

    let body = test.body.clone();
    let scope = test.scope(document.clone());
    let outcome = AssertUnwindSafe(async move { body.call(scope).await })
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => FrameResult::Success,
        Ok(Err(e)) => {
            tracing::warn!(test = %test.id, error = %e, "{}frame test failed", document.frame_prefix());
            FrameResult::Fail
        }
        Err(payload) => {
            tracing::warn!(test = %test.id, panic = %panic_message(payload.as_ref()), "frame test panicked");
            FrameResult::Fail
        }
    }
}

/// Hand a test to the child's listener under `request`
pub fn register_test(child: &Document, request: u64, test: TestRecord) {
    child.post_message(FrameMessage::RegisterTest { request, test });
}

/// Ask the child to run the test registered under `request` and wait for its result
///
/// Results for other requests are ignored. Dropping the subscription on
/// timeout detaches the parent's listener.
pub async fn await_test_result(
    parent: &Document,
    child: &Document,
    request: u64,
    timeout: Duration,
) -> Result<FrameResult> {
    let mut inbox = parent.listen();
    child.post_message(FrameMessage::ExecuteTest { request });

    let result = async {
        loop {
            match inbox.recv().await {
                Ok(FrameMessage::TestResult { request: answered, result }) if answered == request => {
                    return Ok(result)
                }
                Ok(FrameMessage::TestResult { request: answered, .. }) => {
                    tracing::debug!(request, answered, "ignoring frame result of another request");
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => {
                    return Err(Error::Internal(format!("Document '{}' was dropped", parent.url())))
                }
            }
        }
    };

    match tokio::time::timeout(timeout, result).await {
        Ok(result) => result,
        Err(_) => Err(Error::FrameTimeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))),
    }
}

/// A body that runs `body` inside the frame with `src`
pub fn frame_test(src: impl Into<String>, body: TestFn, timeout: Duration) -> TestFn {
    let src = src.into();
    TestFn::new(move |scope: TestScope| {
        let src = src.clone();
        let body = body.clone();
        async move {
            let child = scope.document.frame(&src)?;
            install_child_listener(&child);

            let request = next_request();
            register_test(
                &child,
                request,
                TestRecord {
                    id: scope.test_id.clone(),
                    title: scope.title.clone(),
                    group_title: None,
                    body,
                    skip: false,
                    only: false,
                    state: TestState::Pending,
                    result_info: None,
                },
            );

            match await_test_result(&scope.document, &child, request, timeout).await? {
                FrameResult::Success => Ok(()),
                FrameResult::Fail => Err(Error::FrameTestFailed(src)),
            }
        }
    })
}

impl TestFn {
    /// Run `body` inside the frame with `src`, waiting up to the default timeout
    pub fn in_frame(src: impl Into<String>, body: TestFn) -> TestFn {
        frame_test(src, body, DEFAULT_RESULT_TIMEOUT)
    }
}
