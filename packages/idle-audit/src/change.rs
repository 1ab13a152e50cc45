//! Ports - change-notification interface
//!
//! A change source reports "something changed under this node". The auditor
//! only subscribes and unsubscribes; how changes are detected is up to the
//! implementation (see `tree::MemoryTree` for the in-memory one).

use crate::error::Result;
use crate::subject::SubjectRef;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which changes a subscription reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Attribute changes on the watched nodes
    pub attributes: bool,
    /// Children added to or removed from the watched nodes
    pub child_list: bool,
    /// Changes anywhere below the root, not only on the root itself
    pub subtree: bool,
}

impl WatchOptions {
    /// Whether this watch reports any kind of change at all
    pub fn observes_anything(&self) -> bool {
        self.attributes || self.child_list
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            attributes: true,
            child_list: true,
            subtree: true,
        }
    }
}

/// Receives the targets of one batch of changes
pub type ChangeCallback = Arc<dyn Fn(Vec<SubjectRef>) + Send + Sync>;

/// Live subscription handle
pub trait Subscription: Send {
    /// Stop delivering changes; calling it twice is a no-op
    fn unsubscribe(&mut self);
}

/// Source of change notifications
pub trait ChangeSource: Send + Sync {
    /// Watch `root` and report changed targets to `callback`
    ///
    /// # Errors
    /// `Subscription` when the source cannot watch `root` (e.g. it belongs
    /// to another tree).
    fn subscribe(
        &self,
        root: &SubjectRef,
        options: WatchOptions,
        callback: ChangeCallback,
    ) -> Result<Box<dyn Subscription>>;
}
