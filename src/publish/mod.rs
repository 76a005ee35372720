//! Published container state
//!
//! Every document owns a [`Registry`]: an ordered list of container states
//! that observers in the same document, in a parent document or outside the
//! engine read without holding a reference to any container. Writes are
//! upserts keyed by container id and bump a version on a watch channel so
//! in-process observers can subscribe instead of polling.

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::common::{Error, Result};
use crate::coordinator::state::{ContainerState, TestRecord};
use crate::document::Document;

/// Container states of one document
pub struct Registry {
    containers: RwLock<Vec<ContainerState>>,
    version: watch::Sender<u64>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("containers", &self.container_ids())
            .field("version", &self.version())
            .finish()
    }
}

impl Registry {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            containers: RwLock::new(Vec::new()),
            version,
        }
    }

    /// Append the state, or replace the entry with the same container id in place
    pub(crate) fn upsert(&self, state: ContainerState) {
        {
            let mut containers = self.containers.write();
            match containers
                .iter_mut()
                .find(|c| c.container_id == state.container_id)
            {
                Some(existing) => *existing = state,
                None => containers.push(state),
            }
        }
        self.bump();
    }

    /// Drop entries whose id fails `keep`; returns how many were removed
    pub(crate) fn retain(&self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let removed = {
            let mut containers = self.containers.write();
            let before = containers.len();
            containers.retain(|c| keep(&c.container_id));
            before - containers.len()
        };
        if removed > 0 {
            self.bump();
        }
        removed
    }

    pub(crate) fn remove(&self, container_id: &str) -> bool {
        self.retain(|id| id != container_id) > 0
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    // === Accessors ===

    /// Snapshot of every published container, in publication order
    pub fn containers(&self) -> Vec<ContainerState> {
        self.containers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.containers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.read().is_empty()
    }

    pub fn container_ids(&self) -> Vec<String> {
        self.containers
            .read()
            .iter()
            .map(|c| c.container_id.clone())
            .collect()
    }

    fn with_container<T>(&self, id: &str, f: impl FnOnce(&ContainerState) -> T) -> Result<T> {
        self.containers
            .read()
            .iter()
            .find(|c| c.container_id == id)
            .map(f)
            .ok_or_else(|| Error::UnknownContainer(id.to_string()))
    }

    pub fn container_state(&self, id: &str) -> Result<ContainerState> {
        self.with_container(id, Clone::clone)
    }

    pub fn test_record(&self, container_id: &str, test_id: &str) -> Result<Option<TestRecord>> {
        self.with_container(container_id, |c| c.tests.get(test_id).cloned())
    }

    /// Tests of a container, in registration order
    pub fn test_array(&self, id: &str) -> Result<Vec<TestRecord>> {
        self.with_container(id, ContainerState::test_array)
    }

    pub fn is_container_complete(&self, id: &str) -> Result<bool> {
        self.with_container(id, ContainerState::is_complete)
    }

    pub fn are_all_containers_complete(&self) -> bool {
        self.containers.read().iter().all(ContainerState::is_complete)
    }

    /// Expected tests across all containers, `None` until every container knows its total
    pub fn sum_total_number_of_tests(&self) -> Option<usize> {
        let containers = self.containers.read();
        if containers.is_empty() {
            return None;
        }
        containers
            .iter()
            .map(|c| c.total_number_of_tests)
            .sum::<Option<usize>>()
    }

    /// Whether every expected test across the document has registered
    pub fn are_all_tests_registered(&self) -> bool {
        let containers = self.containers.read();
        let registered: usize = containers.iter().map(ContainerState::registered_count).sum();
        drop(containers);

        self.sum_total_number_of_tests() == Some(registered)
    }

    /// Receiver that changes on every write
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// JSON rendering for out-of-process observers
    pub fn snapshot_json(&self) -> Result<serde_json::Value> {
        let containers = self.containers.read();
        Ok(serde_json::json!({ "testContainers": serde_json::to_value(&*containers)? }))
    }
}

/// Publish a container's state into its document's registry
///
/// The container root must be mounted; a state is never created for a
/// container the document does not contain.
pub fn publish(document: &Document, state: ContainerState) -> Result<()> {
    if !document.contains_container(&state.container_id) {
        return Err(Error::ContainerNotMounted(state.container_id));
    }
    document.registry().upsert(state);
    Ok(())
}

/// Prune entries for containers no longer mounted; returns how many were removed
pub fn init(document: &Document) -> usize {
    let removed = document
        .registry()
        .retain(|id| document.contains_container(id));
    if removed > 0 {
        tracing::debug!(url = document.url(), removed, "pruned retired container states");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::state::{TestDeclaration, TestFn, TestState};

    fn state_with_tests(id: &str, states: &[TestState]) -> ContainerState {
        let mut state = ContainerState::new(id);
        for (i, s) in states.iter().enumerate() {
            let record = TestDeclaration::new(format!("t{i}"), TestFn::from_sync(|_| Ok(())))
                .to_record()
                .with_state(*s);
            state.tests.insert(record.id.clone(), record);
        }
        state.total_number_of_tests = Some(states.len());
        state
    }

    #[test]
    fn test_publish_twice_replaces() {
        let doc = Document::new("/");
        doc.mount_container("root").unwrap();

        publish(&doc, state_with_tests("root", &[TestState::Pending])).unwrap();
        publish(&doc, state_with_tests("root", &[TestState::Success])).unwrap();

        let registry = doc.registry();
        assert_eq!(registry.len(), 1);
        assert!(registry.is_container_complete("root").unwrap());
        assert_eq!(registry.version(), 2);
    }

    #[test]
    fn test_publish_requires_mounted_container() {
        let doc = Document::new("/");
        let err = publish(&doc, ContainerState::new("ghost")).unwrap_err();
        assert!(matches!(err, Error::ContainerNotMounted(id) if id == "ghost"));
        assert!(doc.registry().is_empty());
    }

    #[test]
    fn test_unknown_container_is_drift() {
        let doc = Document::new("/");
        let registry = doc.registry();
        assert!(matches!(registry.container_state("x"), Err(Error::UnknownContainer(_))));
        assert!(matches!(registry.test_array("x"), Err(Error::UnknownContainer(_))));
        assert!(matches!(registry.is_container_complete("x"), Err(Error::UnknownContainer(_))));
    }

    #[test]
    fn test_record_lookup() {
        let doc = Document::new("/");
        doc.mount_container("root").unwrap();
        publish(&doc, state_with_tests("root", &[TestState::Pending, TestState::Fail])).unwrap();

        let registry = doc.registry();
        let record = registry.test_record("root", "t1").unwrap().unwrap();
        assert_eq!(record.title, "t1");
        assert_eq!(record.state, TestState::Fail);
        assert!(registry.test_record("root", "t9").unwrap().is_none());
        assert!(matches!(
            registry.test_record("ghost", "t0"),
            Err(Error::UnknownContainer(id)) if id == "ghost"
        ));
    }

    #[test]
    fn test_totals_require_every_container() {
        let doc = Document::new("/");
        doc.mount_container("a").unwrap();
        doc.mount_container("b").unwrap();
        assert_eq!(doc.registry().sum_total_number_of_tests(), None);

        publish(&doc, state_with_tests("a", &[TestState::Pending, TestState::Pending])).unwrap();
        publish(&doc, ContainerState::new("b")).unwrap();
        assert_eq!(doc.registry().sum_total_number_of_tests(), None);
        assert!(!doc.registry().are_all_tests_registered());

        publish(&doc, state_with_tests("b", &[TestState::Pending])).unwrap();
        assert_eq!(doc.registry().sum_total_number_of_tests(), Some(3));
        assert!(doc.registry().are_all_tests_registered());
        assert!(!doc.registry().are_all_containers_complete());
    }

    #[test]
    fn test_init_prunes_unmounted() {
        let doc = Document::new("/");
        doc.mount_container("a").unwrap();
        doc.mount_container("b").unwrap();
        publish(&doc, ContainerState::new("a")).unwrap();
        publish(&doc, ContainerState::new("b")).unwrap();

        doc.unmount_container("a");
        assert_eq!(init(&doc), 1);
        assert_eq!(doc.registry().container_ids(), vec!["b".to_string()]);
        assert_eq!(init(&doc), 0);
    }

    #[test]
    fn test_snapshot_json_lists_containers() {
        let doc = Document::new("/");
        doc.mount_container("root").unwrap();
        publish(&doc, state_with_tests("root", &[TestState::Fail])).unwrap();

        let json = doc.registry().snapshot_json().unwrap();
        assert_eq!(json["testContainers"][0]["containerId"], "root");
        assert_eq!(json["testContainers"][0]["tests"]["t0"]["state"], "Fail");
    }
}
