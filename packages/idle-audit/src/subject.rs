//! Subjects - the nodes an audit runs against
//!
//! Identity is carried by a generated [`SubjectId`] rather than by pointer
//! identity or a derived string, so queue slots and bindings can be keyed
//! with plain hash maps.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SUBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable, process-unique subject identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(u64);

impl SubjectId {
    /// Allocate a fresh identifier
    pub fn next() -> Self {
        Self(NEXT_SUBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subject-{}", self.0)
    }
}

/// A node that can be audited
pub trait Subject: Send + Sync + fmt::Debug {
    /// Identity of this subject; equal ids mean the same node
    fn id(&self) -> SubjectId;

    /// Whether the subject is still attached to its tree
    fn is_connected(&self) -> bool;

    /// Human-readable locator (selector-like), used in logs
    fn locator(&self) -> String;

    /// Downcasting hook for engines that need their concrete node type
    fn as_any(&self) -> &dyn Any;
}

/// Shared subject handle
pub type SubjectRef = Arc<dyn Subject>;
