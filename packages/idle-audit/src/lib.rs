/*
 * Idle Audit - idle-time accessibility auditing for live trees
 *
 * Watches a live document tree and re-audits changed subtrees with a
 * pluggable rule engine, without competing with the host for busy time.
 *
 * Architecture:
 * - AuditQueue: single-flight FIFO, drained during idle slices
 * - ChangeAuditor: change notification -> queue -> incident dedup -> callback
 * - Ports: RuleEngine, ChangeSource, IdleScheduler (pluggable)
 * - MemoryTree: in-memory change source and subject
 * - Observability (tracing)
 */

// Public modules
pub mod change;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod idle;
pub mod incident;
pub mod observer;
pub mod queue;
pub mod report;
pub mod subject;
pub mod tree;
pub mod violation;

// Re-exports
pub use change::{ChangeCallback, ChangeSource, Subscription, WatchOptions};
pub use config::{AuditorConfig, DebounceConfig, DedupPolicy, IdleConfig};
pub use debounce::{Admission, Debouncer, Trailing};
pub use engine::RuleEngine;
pub use error::{AuditError, Result};
pub use idle::{IdleDeadline, IdleScheduler, SliceDeadline, TimerIdleScheduler};
pub use incident::{IncidentKey, IncidentLedger};
pub use observer::{
    AuditHandle, AuditOutcome, AuditorState, ChangeAuditor, ChangeAuditorBuilder,
    ViolationsCallback,
};
pub use queue::{AuditQueue, AuditTicket, QueueStats};
pub use report::{impact_level, log_violations, logging_callback};
pub use subject::{Subject, SubjectId, SubjectRef};
pub use tree::{MemoryTree, TreeNode};
pub use violation::{
    AffectedNode, AuditReport, CheckKind, CheckResult, Impact, RelatedNode, Violation,
};
