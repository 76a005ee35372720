//! Observers reading published state
//!
//! Within one document the registry's version channel is enough to follow a
//! container. Across a frame boundary observers poll the frame's own registry,
//! since its containers may mount long after the frame exists.

use std::time::Duration;

use crate::common::{Error, Result};
use crate::coordinator::reconciler;
use crate::coordinator::state::ContainerState;
use crate::document::Document;
use crate::wait::{self, DEFAULT_POLL_INTERVAL};

fn finished(state: &ContainerState) -> bool {
    reconciler::all_tests_registered(state) && state.is_complete()
}

/// Follow a container until every expected test has finished
///
/// With `iframe_url` the container is read from that frame's document and
/// every reported state is tagged with the url.
pub async fn watch_container_until_complete<F>(
    document: &Document,
    container_id: &str,
    iframe_url: Option<&str>,
    mut on_update: F,
) -> Result<ContainerState>
where
    F: FnMut(&ContainerState),
{
    let Some(url) = iframe_url else {
        let registry = document.registry();
        let mut changes = registry.subscribe();
        loop {
            let state = registry.container_state(container_id)?;
            on_update(&state);
            if finished(&state) {
                return Ok(state);
            }
            changes
                .changed()
                .await
                .map_err(|_| Error::Internal(format!("Registry of '{}' was dropped", document.url())))?;
        }
    };

    let child = document.frame(url)?;
    let mut ticker = tokio::time::interval(DEFAULT_POLL_INTERVAL);
    loop {
        ticker.tick().await;
        let mut state = child.registry().container_state(container_id)?;
        state.iframe_url = Some(url.to_string());
        on_update(&state);
        if finished(&state) {
            return Ok(state);
        }
    }
}

/// Wait until the frame with `src` publishes at least one container
pub async fn wait_for_frame_containers(document: &Document, src: &str, max: Duration) -> Result<Vec<String>> {
    let child = document.frame(src)?;
    wait::wait_for(|| !child.registry().is_empty(), max).await?;
    Ok(child.registry().container_ids())
}

/// Ids of the containers mounted in `document`
pub fn container_ids(document: &Document) -> Result<Vec<String>> {
    let ids = document.container_ids();
    if ids.is_empty() {
        return Err(Error::NoContainers(document.url().to_string()));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{Hooks, TestContainer, TestDeclaration, TestFn, TestState};

    #[tokio::test]
    async fn test_watch_same_document() {
        let doc = Document::new("/");
        let (container, scheduler) = TestContainer::mount(&doc, "root", Hooks::default()).unwrap();
        let _handle = scheduler.spawn();
        container
            .declare_test(TestDeclaration::new("a", TestFn::from_sync(|_| Ok(()))))
            .unwrap();
        container.discover_total_tests().unwrap();

        let mut updates = 0;
        let state = watch_container_until_complete(&doc, "root", None, |_| updates += 1)
            .await
            .unwrap();
        assert!(updates >= 1);
        assert_eq!(state.tests["a"].state, TestState::Success);
        assert_eq!(state.iframe_url, None);
    }

    #[tokio::test]
    async fn test_watch_frame_tags_url() {
        let doc = Document::new("/overview");
        let child = doc.append_frame("/child").unwrap();
        let (container, scheduler) = TestContainer::mount(&child, "inner", Hooks::default()).unwrap();
        let _handle = scheduler.spawn();

        assert_eq!(
            wait_for_frame_containers(&doc, "/child", Duration::from_secs(1)).await.unwrap(),
            vec!["inner".to_string()]
        );

        container
            .declare_test(TestDeclaration::new("a", TestFn::from_sync(|_| Ok(()))))
            .unwrap();
        container.discover_total_tests().unwrap();

        let state = watch_container_until_complete(&doc, "inner", Some("/child"), |s| {
            assert_eq!(s.iframe_url.as_deref(), Some("/child"));
        })
        .await
        .unwrap();
        assert!(state.is_complete());
    }

    #[tokio::test]
    async fn test_unknown_container_is_drift() {
        let doc = Document::new("/");
        let err = watch_container_until_complete(&doc, "ghost", None, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownContainer(_)));
    }

    #[tokio::test]
    async fn test_frame_without_containers_times_out() {
        let doc = Document::new("/");
        doc.append_frame("/empty").unwrap();
        let err = wait_for_frame_containers(&doc, "/empty", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_container_ids_requires_one() {
        let doc = Document::new("/page");
        assert!(matches!(container_ids(&doc), Err(Error::NoContainers(url)) if url == "/page"));
        doc.mount_container("a").unwrap();
        assert_eq!(container_ids(&doc).unwrap(), vec!["a".to_string()]);
    }
}
