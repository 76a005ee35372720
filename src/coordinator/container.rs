//! Container handle
//!
//! A [`TestContainer`] is what declaring code holds: it mounts group and test
//! nodes into the document, registers their records with the store and wakes
//! the container's scheduler after every change.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::reconciler;
use super::scheduler::{ContainerEvent, Scheduler};
use super::state::{ContainerState, GroupRecord, Hooks, TestDeclaration};
use super::store::ContainerStore;
use crate::common::{Error, Result};
use crate::document::{to_valid_dom_id, Document};
use crate::publish;

#[derive(Clone)]
pub struct TestContainer {
    id: String,
    store: ContainerStore,
    events: mpsc::UnboundedSender<ContainerEvent>,
    /// Mounted test declarations keyed by dom id
    declarations: Arc<Mutex<IndexMap<String, TestDeclaration>>>,
}

impl std::fmt::Debug for TestContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestContainer")
            .field("id", &self.id)
            .field("declarations", &self.declarations.lock().len())
            .finish()
    }
}

impl TestContainer {
    /// Mount a container root into `document`
    ///
    /// States of containers no longer mounted are pruned from the
    /// document's registry first.
    ///
    /// Returns the handle and the scheduler that drives it; the caller decides
    /// where the scheduler runs (usually [`Scheduler::spawn`]).
    pub fn mount(document: &Document, id: &str, hooks: Hooks) -> Result<(Self, Scheduler)> {
        document.mount_container(id)?;
        publish::init(document);
        let store = match ContainerStore::new(document.clone(), id) {
            Ok(store) => store,
            Err(e) => {
                document.unmount_container(id);
                return Err(e);
            }
        };

        let (events, rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(store.clone(), hooks, rx);
        tracing::debug!(container = id, url = document.url(), "container mounted");

        Ok((
            Self {
                id: id.to_string(),
                store,
                events,
                declarations: Arc::new(Mutex::new(IndexMap::new())),
            },
            scheduler,
        ))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn document(&self) -> &Document {
        self.store.document()
    }

    pub fn state(&self) -> ContainerState {
        self.store.snapshot()
    }

    fn notify(&self, event: ContainerEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!(container = %self.id, "scheduler is gone, event dropped");
        }
    }

    /// Mount a group root and record its hooks
    pub fn add_group(&self, title: &str, hooks: Hooks) -> Result<()> {
        self.document().mount_group(&self.id, title)?;
        self.store.add_group(GroupRecord::new(title, hooks))?;
        self.notify(ContainerEvent::GroupAdded(title.to_string()));
        Ok(())
    }

    /// Mount a test node without registering it yet
    pub fn render_test(&self, declaration: TestDeclaration) -> Result<String> {
        let dom_id = self.document().mount_test(&self.id, &declaration.id())?;
        self.declarations.lock().insert(dom_id.clone(), declaration);
        Ok(dom_id)
    }

    /// Register the record of a rendered test
    pub fn register_test(&self, declaration: &TestDeclaration) -> Result<()> {
        let id = declaration.id();
        self.store.register_test(declaration.to_record())?;
        self.notify(ContainerEvent::Registered(id));
        Ok(())
    }

    /// Render and register in one step
    pub fn declare_test(&self, declaration: TestDeclaration) -> Result<String> {
        let dom_id = self.render_test(declaration.clone())?;
        self.register_test(&declaration)?;
        Ok(dom_id)
    }

    /// Replace the declaration of a mounted test
    ///
    /// Any change to its defining parameters re-runs the whole container.
    pub fn update_test(&self, test_id: &str, declaration: TestDeclaration) -> Result<bool> {
        let old_dom_id = to_valid_dom_id(test_id);
        {
            let mut declarations = self.declarations.lock();
            let previous = declarations
                .get(&old_dom_id)
                .ok_or_else(|| Error::Internal(format!("Test '{}' is not rendered", test_id)))?;

            let new_id = declaration.id();
            if new_id == previous.id() && !previous.props_changed(&declaration) {
                return Ok(false);
            }

            let new_dom_id = self.document().rename_test(&self.id, test_id, &new_id)?;
            declarations.shift_remove(&old_dom_id);
            declarations.insert(new_dom_id, declaration);
        }

        self.re_run()?;
        Ok(true)
    }

    /// Start a new run-epoch and re-register every mounted test in document order
    pub fn re_run(&self) -> Result<u64> {
        let epoch = self.store.reset_for_re_run()?;
        tracing::info!(container = %self.id, epoch, "Re-running container");
        reconciler::discover_total_tests(&self.store)?;

        let order = self.document().test_dom_ids(&self.id);
        let declarations: Vec<TestDeclaration> = {
            let declarations = self.declarations.lock();
            order
                .iter()
                .filter_map(|dom_id| declarations.get(dom_id).cloned())
                .collect()
        };
        for declaration in &declarations {
            self.store.register_test(declaration.to_record())?;
        }

        self.notify(ContainerEvent::ReRun(epoch));
        Ok(epoch)
    }

    /// Count the container's test nodes; scheduling waits until this ran
    pub fn discover_total_tests(&self) -> Result<Option<usize>> {
        let total = reconciler::discover_total_tests(&self.store)?;
        if let Some(total) = total {
            self.notify(ContainerEvent::Discovered(total));
        }
        Ok(total)
    }

    /// Remove the container from the document and its published state
    pub fn unmount(self) {
        let document = self.document().clone();
        document.unmount_container(&self.id);
        document.registry().remove(&self.id);
        tracing::debug!(container = %self.id, "container unmounted");
    }
}
