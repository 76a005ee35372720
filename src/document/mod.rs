//! Document tree model
//!
//! A `Document` stands in for one browsing context: an ordered list of
//! marked nodes, the registry of published container states, and a message
//! inbox for cross-document messages. Frames own a child document whose
//! parent link is weak, so dropping the top document tears the whole tree
//! down together with every registry in it.

pub mod id;

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

use crate::common::{Error, Result};
use crate::frame::FrameMessage;
use crate::publish::Registry;

pub use id::to_valid_dom_id;

/// Capacity of a document's message inbox
const INBOX_CAPACITY: usize = 64;

/// Discovery marker carried by a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// Root of a test container
    Container { id: String },
    /// A declared test, tagged with its owning container
    Test { container_id: String },
    /// Root of a test group
    Group { container_id: String },
    /// An embedded frame with its own document
    Frame { src: String },
}

/// A marked node in the document
#[derive(Debug, Clone)]
pub struct Node {
    pub dom_id: String,
    pub marker: Marker,
}

struct DocumentInner {
    url: String,
    nodes: RwLock<Vec<Node>>,
    frames: RwLock<Vec<(String, Document)>>,
    parent: Option<Weak<DocumentInner>>,
    registry: Registry,
    inbox: broadcast::Sender<FrameMessage>,
    listeners: Mutex<HashSet<&'static str>>,
}

/// Shared handle to a browsing context
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

/// Non-owning handle, used by listeners that must not keep a document alive
#[derive(Clone)]
pub struct WeakDocument {
    inner: Weak<DocumentInner>,
}

impl WeakDocument {
    pub fn upgrade(&self) -> Option<Document> {
        self.inner.upgrade().map(|inner| Document { inner })
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("url", &self.inner.url)
            .field("nodes", &self.inner.nodes.read().len())
            .finish()
    }
}

impl Document {
    /// Create a top-level document
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_parent(url.into(), None)
    }

    fn with_parent(url: String, parent: Option<Weak<DocumentInner>>) -> Self {
        let (inbox, _) = broadcast::channel(INBOX_CAPACITY);
        Self {
            inner: Arc::new(DocumentInner {
                url,
                nodes: RwLock::new(Vec::new()),
                frames: RwLock::new(Vec::new()),
                parent,
                registry: Registry::new(),
                inbox,
                listeners: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Published container states of this document
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn downgrade(&self) -> WeakDocument {
        WeakDocument {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The embedding document, if this one lives inside a frame
    pub fn parent(&self) -> Option<Document> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Document { inner })
    }

    pub fn is_frame(&self) -> bool {
        self.inner.parent.is_some()
    }

    /// Prefix for log lines and failure details produced inside a frame
    pub fn frame_prefix(&self) -> String {
        if self.is_frame() {
            format!("Iframe {} - ", self.inner.url)
        } else {
            String::new()
        }
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.inner.nodes.read().clone()
    }

    // === Containers ===

    /// Mount a container root; ids are unique across the document
    pub fn mount_container(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::ContainerWithoutId);
        }

        let mut nodes = self.inner.nodes.write();
        let duplicate = nodes
            .iter()
            .any(|n| matches!(&n.marker, Marker::Container { id: existing } if existing == id));
        if duplicate {
            return Err(Error::DuplicateContainer(id.to_string()));
        }

        nodes.push(Node {
            dom_id: id.to_string(),
            marker: Marker::Container { id: id.to_string() },
        });
        Ok(())
    }

    /// Remove a container root together with its test and group nodes
    pub fn unmount_container(&self, id: &str) {
        self.inner.nodes.write().retain(|n| match &n.marker {
            Marker::Container { id: existing } => existing != id,
            Marker::Test { container_id } | Marker::Group { container_id } => container_id != id,
            Marker::Frame { .. } => true,
        });
    }

    pub fn contains_container(&self, id: &str) -> bool {
        self.inner
            .nodes
            .read()
            .iter()
            .any(|n| matches!(&n.marker, Marker::Container { id: existing } if existing == id))
    }

    /// Ids of every mounted container, in document order
    pub fn container_ids(&self) -> Vec<String> {
        self.inner
            .nodes
            .read()
            .iter()
            .filter_map(|n| match &n.marker {
                Marker::Container { id } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    // === Tests and groups ===

    /// Mount a test node for `test_id`, returning its dom id
    pub fn mount_test(&self, container_id: &str, test_id: &str) -> Result<String> {
        let dom_id = to_valid_dom_id(test_id);
        let mut nodes = self.inner.nodes.write();
        if Self::find_owned(&nodes, container_id, &dom_id, false).is_some() {
            return Err(Error::DuplicateTest(test_id.to_string()));
        }

        nodes.push(Node {
            dom_id: dom_id.clone(),
            marker: Marker::Test {
                container_id: container_id.to_string(),
            },
        });
        Ok(dom_id)
    }

    /// Give a mounted test node a new id without moving it
    pub fn rename_test(&self, container_id: &str, old_test_id: &str, new_test_id: &str) -> Result<String> {
        let old_dom_id = to_valid_dom_id(old_test_id);
        let new_dom_id = to_valid_dom_id(new_test_id);
        if old_dom_id == new_dom_id {
            return Ok(new_dom_id);
        }

        let mut nodes = self.inner.nodes.write();
        if Self::find_owned(&nodes, container_id, &new_dom_id, false).is_some() {
            return Err(Error::DuplicateTest(new_test_id.to_string()));
        }
        let index = Self::find_owned(&nodes, container_id, &old_dom_id, false)
            .ok_or_else(|| Error::Internal(format!("Test node '{}' is not mounted", old_test_id)))?;

        nodes[index].dom_id = new_dom_id.clone();
        Ok(new_dom_id)
    }

    /// Mount a group root; titles are unique within a container
    pub fn mount_group(&self, container_id: &str, title: &str) -> Result<String> {
        let dom_id = to_valid_dom_id(title);
        let mut nodes = self.inner.nodes.write();
        if Self::find_owned(&nodes, container_id, &dom_id, true).is_some() {
            return Err(Error::DuplicateGroup(title.to_string()));
        }

        nodes.push(Node {
            dom_id: dom_id.clone(),
            marker: Marker::Group {
                container_id: container_id.to_string(),
            },
        });
        Ok(dom_id)
    }

    /// Count of test nodes tagged with `container_id`
    pub fn count_tests(&self, container_id: &str) -> usize {
        self.inner
            .nodes
            .read()
            .iter()
            .filter(|n| matches!(&n.marker, Marker::Test { container_id: owner } if owner == container_id))
            .count()
    }

    /// Dom ids of a container's test nodes, in document order
    pub fn test_dom_ids(&self, container_id: &str) -> Vec<String> {
        self.inner
            .nodes
            .read()
            .iter()
            .filter(|n| matches!(&n.marker, Marker::Test { container_id: owner } if owner == container_id))
            .map(|n| n.dom_id.clone())
            .collect()
    }

    fn find_owned(nodes: &[Node], container_id: &str, dom_id: &str, group: bool) -> Option<usize> {
        nodes.iter().position(|n| {
            n.dom_id == dom_id
                && match (&n.marker, group) {
                    (Marker::Test { container_id: owner }, false)
                    | (Marker::Group { container_id: owner }, true) => owner == container_id,
                    _ => false,
                }
        })
    }

    // === Frames ===

    /// Embed a frame and return its (empty) child document
    pub fn append_frame(&self, src: &str) -> Result<Document> {
        let mut frames = self.inner.frames.write();
        if frames.iter().any(|(existing, _)| existing == src) {
            return Err(Error::Config(format!("Frame with src '{}' is already mounted", src)));
        }

        let child = Self::with_parent(src.to_string(), Some(Arc::downgrade(&self.inner)));
        frames.push((src.to_string(), child.clone()));
        self.inner.nodes.write().push(Node {
            dom_id: format!("{}-frame", to_valid_dom_id(src)),
            marker: Marker::Frame { src: src.to_string() },
        });

        Ok(child)
    }

    /// The content document of the frame with `src`
    pub fn frame(&self, src: &str) -> Result<Document> {
        self.inner
            .frames
            .read()
            .iter()
            .find(|(existing, _)| existing == src)
            .map(|(_, doc)| doc.clone())
            .ok_or_else(|| Error::FrameNotFound(src.to_string()))
    }

    pub fn frame_srcs(&self) -> Vec<String> {
        self.inner.frames.read().iter().map(|(src, _)| src.clone()).collect()
    }

    // === Messaging ===

    /// Deliver a message to every listener currently attached to this document
    pub fn post_message(&self, message: FrameMessage) {
        if self.inner.inbox.send(message).is_err() {
            tracing::trace!(url = %self.inner.url, "message posted with no listener attached");
        }
    }

    /// Post to the embedding document; a no-op at the top level
    pub fn post_to_parent(&self, message: FrameMessage) {
        match self.parent() {
            Some(parent) => parent.post_message(message),
            None => tracing::warn!(url = %self.inner.url, "post_to_parent called on a top-level document"),
        }
    }

    /// Attach a listener. Dropping the receiver detaches it.
    pub fn listen(&self) -> broadcast::Receiver<FrameMessage> {
        self.inner.inbox.subscribe()
    }

    /// Mark a named listener as installed; false if it already was
    pub(crate) fn claim_listener(&self, name: &'static str) -> bool {
        self.inner.listeners.lock().insert(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_container_is_fatal() {
        let doc = Document::new("/");
        doc.mount_container("root").unwrap();
        let err = doc.mount_container("root").unwrap_err();
        assert!(matches!(err, Error::DuplicateContainer(id) if id == "root"));
        assert!(matches!(doc.mount_container(""), Err(Error::ContainerWithoutId)));
    }

    #[test]
    fn test_tests_are_scoped_to_their_container() {
        let doc = Document::new("/");
        doc.mount_container("a").unwrap();
        doc.mount_container("b").unwrap();

        doc.mount_test("a", "first").unwrap();
        doc.mount_test("a", "second").unwrap();
        doc.mount_test("b", "first").unwrap();

        assert_eq!(doc.count_tests("a"), 2);
        assert_eq!(doc.count_tests("b"), 1);
        assert!(matches!(doc.mount_test("a", "first"), Err(Error::DuplicateTest(_))));
    }

    #[test]
    fn test_rename_keeps_document_order() {
        let doc = Document::new("/");
        doc.mount_container("a").unwrap();
        doc.mount_test("a", "one").unwrap();
        doc.mount_test("a", "two").unwrap();

        doc.rename_test("a", "one", "uno").unwrap();
        assert_eq!(
            doc.test_dom_ids("a"),
            vec![to_valid_dom_id("uno"), to_valid_dom_id("two")]
        );
        assert!(matches!(doc.rename_test("a", "uno", "two"), Err(Error::DuplicateTest(_))));
    }

    #[test]
    fn test_unmount_removes_owned_nodes() {
        let doc = Document::new("/");
        doc.mount_container("a").unwrap();
        doc.mount_group("a", "g").unwrap();
        doc.mount_test("a", "g - t").unwrap();

        doc.unmount_container("a");
        assert!(!doc.contains_container("a"));
        assert_eq!(doc.count_tests("a"), 0);
        assert!(doc.nodes().is_empty());
    }

    #[test]
    fn test_frames_link_back_to_parent() {
        let doc = Document::new("/overview");
        let child = doc.append_frame("/child").unwrap();

        assert!(child.is_frame());
        assert_eq!(child.parent().unwrap().url(), "/overview");
        assert_eq!(child.frame_prefix(), "Iframe /child - ");
        assert_eq!(doc.frame_prefix(), "");
        assert!(matches!(doc.frame("/missing"), Err(Error::FrameNotFound(_))));
        assert!(doc.append_frame("/child").is_err());
    }

    #[test]
    fn test_claim_listener_is_idempotent() {
        let doc = Document::new("/");
        assert!(doc.claim_listener("child"));
        assert!(!doc.claim_listener("child"));
    }
}
