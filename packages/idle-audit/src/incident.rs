//! Incident ledger - which findings were already reported
//!
//! An incident is one (locator, rule) pair. The ledger only grows; it is
//! emptied by an explicit `clear()`.

use crate::violation::{AffectedNode, AuditReport, Violation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity of one reportable finding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidentKey {
    pub locator: String,
    pub rule_id: String,
}

impl IncidentKey {
    pub fn new(locator: impl Into<String>, rule_id: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            rule_id: rule_id.into(),
        }
    }

    pub fn of(violation: &Violation, node: &AffectedNode) -> Self {
        Self::new(node.locator(), violation.rule_id.clone())
    }
}

impl std::fmt::Display for IncidentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.rule_id, self.locator)
    }
}

/// Set of reported incidents with their first-report time
#[derive(Debug, Default)]
pub struct IncidentLedger {
    reported: HashMap<IncidentKey, DateTime<Utc>>,
}

impl IncidentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key`; false when it was already reported
    pub fn record(&mut self, key: IncidentKey) -> bool {
        if self.reported.contains_key(&key) {
            return false;
        }
        self.reported.insert(key, Utc::now());
        true
    }

    pub fn contains(&self, key: &IncidentKey) -> bool {
        self.reported.contains_key(key)
    }

    pub fn first_reported_at(&self, key: &IncidentKey) -> Option<DateTime<Utc>> {
        self.reported.get(key).copied()
    }

    /// Keep only the findings not reported before, recording them as reported
    ///
    /// Violations lose their already-reported nodes; a violation left with
    /// no nodes is dropped. Keys are recorded before this returns, so a
    /// change triggered while the caller reports them cannot re-report.
    pub fn filter_new(&mut self, report: AuditReport) -> Vec<Violation> {
        report
            .violations
            .into_iter()
            .filter_map(|mut violation| {
                let nodes = std::mem::take(&mut violation.nodes);
                let fresh: Vec<AffectedNode> = nodes
                    .into_iter()
                    .filter(|node| self.record(IncidentKey::of(&violation, node)))
                    .collect();

                if fresh.is_empty() {
                    None
                } else {
                    violation.nodes = fresh;
                    Some(violation)
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.reported.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reported.is_empty()
    }

    pub fn clear(&mut self) {
        self.reported.clear();
    }
}
