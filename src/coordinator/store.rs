//! Authoritative per-container state
//!
//! Every write goes through [`ContainerStore::update`], which mirrors the new
//! state into the document's registry before releasing the lock, so the
//! published copy never runs behind or out of order.

use std::sync::Arc;

use parking_lot::Mutex;

use super::state::{ContainerState, GroupRecord, TestRecord, TestState};
use crate::common::{Error, Result};
use crate::document::{to_valid_dom_id, Document};
use crate::publish;

#[derive(Clone)]
pub struct ContainerStore {
    document: Document,
    state: Arc<Mutex<ContainerState>>,
}

impl std::fmt::Debug for ContainerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerStore")
            .field("container_id", &self.state.lock().container_id)
            .finish()
    }
}

impl ContainerStore {
    /// Create the store for a mounted container and publish its empty state
    pub fn new(document: Document, container_id: &str) -> Result<Self> {
        let store = Self {
            document,
            state: Arc::new(Mutex::new(ContainerState::new(container_id))),
        };
        store.update(|_| ())?;
        Ok(store)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn container_id(&self) -> String {
        self.state.lock().container_id.clone()
    }

    pub fn snapshot(&self) -> ContainerState {
        self.state.lock().clone()
    }

    /// Current run-epoch
    pub fn epoch(&self) -> u64 {
        self.state.lock().re_run_count
    }

    /// Apply a mutation and publish the result
    pub fn update<T>(&self, f: impl FnOnce(&mut ContainerState) -> T) -> Result<T> {
        let mut state = self.state.lock();
        let out = f(&mut state);
        publish::publish(&self.document, state.clone())?;
        Ok(out)
    }

    /// Insert a record, or replace the one with the same id in place
    ///
    /// New ids are slotted into the document order of their test nodes, so
    /// tests that register late still run where they were declared.
    pub fn register_test(&self, record: TestRecord) -> Result<()> {
        let order = self.document.test_dom_ids(&self.container_id());
        self.update(|state| {
            let (_, previous) = state.tests.insert_full(record.id.clone(), record);
            if previous.is_none() {
                let position = |id: &str| {
                    let dom_id = to_valid_dom_id(id);
                    order.iter().position(|d| *d == dom_id).unwrap_or(usize::MAX)
                };
                state.tests.sort_by(|a, _, b, _| position(a).cmp(&position(b)));
            }
        })
    }

    pub fn add_group(&self, group: GroupRecord) -> Result<()> {
        self.update(|state| {
            if state.groups.contains_key(&group.title) {
                return Err(Error::DuplicateGroup(group.title));
            }
            state.groups.insert(group.title.clone(), group);
            Ok(())
        })?
    }

    /// Record the expected test count; a no-op once known for this epoch
    pub fn set_total(&self, total: usize) -> Result<bool> {
        self.update(|state| {
            if state.total_number_of_tests.is_some() {
                return false;
            }
            state.total_number_of_tests = Some(total);
            true
        })
    }

    /// Move a test into `next` if `epoch` is still current
    pub fn transition(&self, epoch: u64, test_id: &str, next: TestState) -> Result<bool> {
        self.settle(epoch, test_id, next, None, false)
    }

    /// Write a test's outcome, optionally advancing the cursor
    ///
    /// Returns false, leaving the state untouched, when a re-run has started
    /// a new epoch since `epoch`.
    pub fn settle(
        &self,
        epoch: u64,
        test_id: &str,
        next: TestState,
        result_info: Option<String>,
        advance: bool,
    ) -> Result<bool> {
        self.update(|state| {
            if state.re_run_count != epoch {
                return false;
            }
            let Some(test) = state.tests.get_mut(test_id) else {
                return false;
            };
            test.state = next;
            test.result_info = result_info;
            if advance {
                state.current_test_index += 1;
            }
            true
        })
    }

    /// Start a new epoch: clear tests, rewind the cursor, forget the total
    pub fn reset_for_re_run(&self) -> Result<u64> {
        self.update(|state| {
            state.re_run_count += 1;
            state.current_test_index = 0;
            state.tests.clear();
            state.total_number_of_tests = None;
            state.re_run_count
        })
    }
}
