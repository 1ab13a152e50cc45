//! MemoryTree - in-memory live tree with change notification
//!
//! Minimal element tree (tags, attributes, parent/child links) that reports
//! its own mutations to subscribers. It backs embedding scenarios where the
//! host keeps its document in Rust, and it is what the tests drive.
//!
//! Notification targets follow the usual mutation-observer convention:
//! - attribute change: the element itself
//! - child added/removed: the parent
//!
//! Nodes live in an append-only arena. `remove` only detaches, so a
//! `TreeNode` handle never dangles or aliases a newer node, and a removed
//! subtree can be appended again with its attributes intact. Memory grows
//! with the number of elements ever created; long-lived hosts that churn
//! nodes should back `ChangeSource` with their own document instead.

use crate::change::{ChangeCallback, ChangeSource, Subscription, WatchOptions};
use crate::error::{AuditError, Result};
use crate::subject::{Subject, SubjectId, SubjectRef};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::trace;

const DOCUMENT: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutationKind {
    Attributes,
    ChildList,
}

#[derive(Debug)]
struct NodeData {
    id: SubjectId,
    tag: String,
    attributes: BTreeMap<String, String>,
    parent: Option<usize>,
    children: Vec<usize>,
}

struct Watcher {
    id: u64,
    root: usize,
    options: WatchOptions,
    callback: ChangeCallback,
}

#[derive(Default)]
struct TreeState {
    nodes: Vec<NodeData>,
    watchers: Vec<Watcher>,
    next_watcher: u64,
}

impl TreeState {
    fn is_ancestor(&self, ancestor: usize, mut node: usize) -> bool {
        while let Some(parent) = self.nodes[node].parent {
            if parent == ancestor {
                return true;
            }
            node = parent;
        }
        false
    }

    fn detach(&mut self, node: usize) -> Option<usize> {
        let parent = self.nodes[node].parent.take()?;
        self.nodes[parent].children.retain(|&child| child != node);
        Some(parent)
    }
}

struct TreeShared {
    state: RwLock<TreeState>,
}

/// Shared handle to one tree
#[derive(Clone)]
pub struct MemoryTree {
    shared: Arc<TreeShared>,
}

impl MemoryTree {
    /// Create a tree holding only the document node
    pub fn new() -> Self {
        let mut state = TreeState::default();
        state.nodes.push(NodeData {
            id: SubjectId::next(),
            tag: "#document".to_string(),
            attributes: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
        });

        Self {
            shared: Arc::new(TreeShared {
                state: RwLock::new(state),
            }),
        }
    }

    pub fn document(&self) -> TreeNode {
        self.node_at(DOCUMENT)
    }

    /// Arena slots in use, document included; removed nodes still count
    pub fn node_count(&self) -> usize {
        self.shared.state.read().nodes.len()
    }

    /// Create a detached element; its arena slot is never reused
    pub fn create_element(&self, tag: impl Into<String>) -> TreeNode {
        let index = {
            let mut state = self.shared.state.write();
            state.nodes.push(NodeData {
                id: SubjectId::next(),
                tag: tag.into(),
                attributes: BTreeMap::new(),
                parent: None,
                children: Vec::new(),
            });
            state.nodes.len() - 1
        };
        self.node_at(index)
    }

    /// Move `child` under `parent` (as last child)
    pub fn append_child(&self, parent: &TreeNode, child: &TreeNode) -> Result<()> {
        self.check_owned(parent)?;
        self.check_owned(child)?;

        let old_parent = {
            let mut state = self.shared.state.write();
            if child.index == DOCUMENT {
                return Err(AuditError::invalid_argument("the document cannot be a child"));
            }
            if child.index == parent.index || state.is_ancestor(child.index, parent.index) {
                return Err(AuditError::invalid_argument(format!(
                    "{} cannot contain its own ancestor",
                    parent.locator()
                )));
            }

            let old_parent = state.detach(child.index);
            state.nodes[child.index].parent = Some(parent.index);
            state.nodes[parent.index].children.push(child.index);
            old_parent
        };

        if let Some(old_parent) = old_parent {
            self.notify(old_parent, MutationKind::ChildList);
        }
        self.notify(parent.index, MutationKind::ChildList);
        Ok(())
    }

    /// Detach `node` from its parent; a no-op for detached nodes
    pub fn remove(&self, node: &TreeNode) -> Result<()> {
        self.check_owned(node)?;
        if node.index == DOCUMENT {
            return Err(AuditError::invalid_argument("the document cannot be removed"));
        }

        let parent = self.shared.state.write().detach(node.index);
        if let Some(parent) = parent {
            self.notify(parent, MutationKind::ChildList);
        }
        Ok(())
    }

    pub fn set_attribute(
        &self,
        node: &TreeNode,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.check_owned(node)?;
        self.shared.state.write().nodes[node.index]
            .attributes
            .insert(name.into(), value.into());
        self.notify(node.index, MutationKind::Attributes);
        Ok(())
    }

    pub fn remove_attribute(&self, node: &TreeNode, name: &str) -> Result<()> {
        self.check_owned(node)?;
        let removed = self.shared.state.write().nodes[node.index]
            .attributes
            .remove(name)
            .is_some();
        if removed {
            self.notify(node.index, MutationKind::Attributes);
        }
        Ok(())
    }

    /// Number of live subscriptions
    pub fn watcher_count(&self) -> usize {
        self.shared.state.read().watchers.len()
    }

    fn node_at(&self, index: usize) -> TreeNode {
        let id = self.shared.state.read().nodes[index].id;
        TreeNode {
            shared: self.shared.clone(),
            index,
            id,
        }
    }

    fn check_owned(&self, node: &TreeNode) -> Result<()> {
        if Arc::ptr_eq(&self.shared, &node.shared) {
            Ok(())
        } else {
            Err(AuditError::invalid_argument(format!(
                "{} belongs to another tree",
                node.id
            )))
        }
    }

    /// Deliver one change to every matching watcher, outside the lock
    fn notify(&self, target: usize, kind: MutationKind) {
        let callbacks: Vec<ChangeCallback> = {
            let state = self.shared.state.read();
            state
                .watchers
                .iter()
                .filter(|watcher| match kind {
                    MutationKind::Attributes => watcher.options.attributes,
                    MutationKind::ChildList => watcher.options.child_list,
                })
                .filter(|watcher| {
                    watcher.root == target
                        || (watcher.options.subtree && state.is_ancestor(watcher.root, target))
                })
                .map(|watcher| watcher.callback.clone())
                .collect()
        };

        if callbacks.is_empty() {
            return;
        }

        trace!(target = target, kind = ?kind, watchers = callbacks.len(), "Tree mutation");
        let subject: SubjectRef = Arc::new(self.node_at(target));
        for callback in callbacks {
            callback(vec![subject.clone()]);
        }
    }
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("MemoryTree")
            .field("nodes", &state.nodes.len())
            .field("watchers", &state.watchers.len())
            .finish()
    }
}

impl ChangeSource for MemoryTree {
    fn subscribe(
        &self,
        root: &SubjectRef,
        options: WatchOptions,
        callback: ChangeCallback,
    ) -> Result<Box<dyn Subscription>> {
        let node = root
            .as_any()
            .downcast_ref::<TreeNode>()
            .filter(|node| Arc::ptr_eq(&node.shared, &self.shared))
            .ok_or_else(|| {
                AuditError::Subscription(format!(
                    "{} is not a node of this tree",
                    root.locator()
                ))
            })?;

        let mut state = self.shared.state.write();
        let id = state.next_watcher;
        state.next_watcher += 1;
        state.watchers.push(Watcher {
            id,
            root: node.index,
            options,
            callback,
        });

        Ok(Box::new(TreeSubscription {
            shared: Arc::downgrade(&self.shared),
            watcher: id,
            active: true,
        }))
    }
}

struct TreeSubscription {
    shared: Weak<TreeShared>,
    watcher: u64,
    active: bool,
}

impl Subscription for TreeSubscription {
    fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(shared) = self.shared.upgrade() {
            shared
                .state
                .write()
                .watchers
                .retain(|watcher| watcher.id != self.watcher);
        }
    }
}

impl Drop for TreeSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Handle to one node of a `MemoryTree`
#[derive(Clone)]
pub struct TreeNode {
    shared: Arc<TreeShared>,
    index: usize,
    id: SubjectId,
}

impl TreeNode {
    pub fn tag(&self) -> String {
        self.shared.state.read().nodes[self.index].tag.clone()
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.shared.state.read().nodes[self.index]
            .attributes
            .get(name)
            .cloned()
    }

    pub fn parent(&self) -> Option<TreeNode> {
        let parent = self.shared.state.read().nodes[self.index].parent?;
        Some(self.sibling_handle(parent))
    }

    pub fn children(&self) -> Vec<TreeNode> {
        let children = self.shared.state.read().nodes[self.index].children.clone();
        children
            .into_iter()
            .map(|index| self.sibling_handle(index))
            .collect()
    }

    /// This node as a shared subject
    pub fn subject(&self) -> SubjectRef {
        Arc::new(self.clone())
    }

    fn sibling_handle(&self, index: usize) -> TreeNode {
        let id = self.shared.state.read().nodes[index].id;
        TreeNode {
            shared: self.shared.clone(),
            index,
            id,
        }
    }
}

impl Subject for TreeNode {
    fn id(&self) -> SubjectId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.index == DOCUMENT || self.shared.state.read().is_ancestor(DOCUMENT, self.index)
    }

    /// `#id` when the node has one, else a `tag:nth-child(n)` path
    fn locator(&self) -> String {
        let state = self.shared.state.read();
        let mut segments = Vec::new();
        let mut current = self.index;

        loop {
            let node = &state.nodes[current];
            if let Some(id) = node.attributes.get("id") {
                segments.push(format!("#{}", id));
                break;
            }
            match node.parent {
                Some(parent) if parent != DOCUMENT => {
                    let position = state.nodes[parent]
                        .children
                        .iter()
                        .position(|&child| child == current)
                        .map_or(1, |p| p + 1);
                    segments.push(format!("{}:nth-child({})", node.tag, position));
                    current = parent;
                }
                _ => {
                    segments.push(node.tag.clone());
                    break;
                }
            }
        }

        segments.reverse();
        segments.join(" > ")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeNode")
            .field("id", &self.id)
            .field("index", &self.index)
            .finish()
    }
}
