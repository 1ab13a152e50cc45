use crate::error::Result;
use crate::subject::SubjectRef;
use crate::violation::AuditReport;
use async_trait::async_trait;

/// Rule-evaluation engine (pluggable)
///
/// Implementations may assume they are never invoked again before the
/// previous call settled, as long as every call goes through one
/// `AuditQueue`.
#[async_trait]
pub trait RuleEngine: Send + Sync {
    /// Engine name, used in logs
    fn name(&self) -> &str {
        "rule-engine"
    }

    /// Audit the subtree rooted at `subject`
    async fn run_rules(&self, subject: &SubjectRef) -> Result<AuditReport>;
}
