//! Registration gate
//!
//! Test nodes register asynchronously. Scheduling waits until the number of
//! test nodes in the document is known and that many records have registered.

use super::state::ContainerState;
use super::store::ContainerStore;
use crate::common::Result;

/// Count the container's test nodes and record the total, once per epoch
///
/// Returns the newly recorded total, or `None` if it was already known.
pub fn discover_total_tests(store: &ContainerStore) -> Result<Option<usize>> {
    let container_id = store.container_id();
    if store.snapshot().total_number_of_tests.is_some() {
        return Ok(None);
    }

    let total = store.document().count_tests(&container_id);
    if !store.set_total(total)? {
        return Ok(None);
    }

    let prefix = store.document().frame_prefix();
    tracing::info!(container = %container_id, "{}Found {} tests", prefix, total);
    tracing::info!(container = %container_id, "{}Waiting for the tests to be registered...", prefix);
    Ok(Some(total))
}

/// True iff the expected total is known and exactly that many tests registered
pub fn all_tests_registered(state: &ContainerState) -> bool {
    state.total_number_of_tests == Some(state.registered_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::state::{TestDeclaration, TestFn};
    use crate::document::Document;

    #[test]
    fn test_gate_opens_when_counts_match() {
        let doc = Document::new("/");
        doc.mount_container("root").unwrap();
        doc.mount_test("root", "a").unwrap();
        doc.mount_test("root", "b").unwrap();
        let store = ContainerStore::new(doc, "root").unwrap();

        assert!(!all_tests_registered(&store.snapshot()));
        assert_eq!(discover_total_tests(&store).unwrap(), Some(2));
        assert_eq!(discover_total_tests(&store).unwrap(), None);

        for title in ["a", "b"] {
            assert!(!all_tests_registered(&store.snapshot()));
            let record = TestDeclaration::new(title, TestFn::from_sync(|_| Ok(()))).to_record();
            store.register_test(record).unwrap();
        }
        assert!(all_tests_registered(&store.snapshot()));
    }

    #[test]
    fn test_empty_container_counts_as_registered() {
        let doc = Document::new("/");
        doc.mount_container("root").unwrap();
        let store = ContainerStore::new(doc, "root").unwrap();

        assert_eq!(discover_total_tests(&store).unwrap(), Some(0));
        assert!(all_tests_registered(&store.snapshot()));
    }
}
