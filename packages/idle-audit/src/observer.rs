//! ChangeAuditor - re-audits changed subtrees and reports each incident once
//!
//! Lifecycle: `Unbound -> Observing -> Disconnected` (terminal).
//!
//! Every audit goes through the shared `AuditQueue`, so the engine never
//! runs twice at once. Results are filtered against the incident ledger
//! before the violations callback sees them.

use crate::change::{ChangeCallback, ChangeSource, Subscription};
use crate::config::{AuditorConfig, DedupPolicy};
use crate::debounce::{Admission, Debouncer, Trailing};
use crate::engine::RuleEngine;
use crate::error::{AuditError, Result};
use crate::idle::TimerIdleScheduler;
use crate::incident::IncidentLedger;
use crate::queue::{AuditQueue, AuditTicket};
use crate::subject::{SubjectId, SubjectRef};
use crate::violation::{AuditReport, Violation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Receives newly reported violations; never called with an empty list
pub type ViolationsCallback = Arc<dyn Fn(Vec<Violation>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditorState {
    Unbound,
    Observing,
    Disconnected,
}

impl AuditorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditorState::Unbound => "unbound",
            AuditorState::Observing => "observing",
            AuditorState::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for AuditorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How one audit request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    /// An audit for the subject was already pending
    Coalesced,
    /// The subject left its tree before the engine reached it
    Stale,
    /// The engine found nothing
    Clean,
    /// Every finding had been reported before
    Suppressed,
    /// The callback received this many violations
    Reported(usize),
}

impl AuditOutcome {
    pub fn reported(&self) -> usize {
        match self {
            AuditOutcome::Reported(n) => *n,
            _ => 0,
        }
    }
}

/// Settlement of one `audit_subject` request
///
/// Dropping the handle does not cancel the audit.
#[derive(Debug)]
pub struct AuditHandle {
    subject: SubjectId,
    task: Option<JoinHandle<Result<AuditOutcome>>>,
}

impl AuditHandle {
    fn coalesced(subject: SubjectId) -> Self {
        Self {
            subject,
            task: None,
        }
    }

    pub fn subject(&self) -> SubjectId {
        self.subject
    }

    pub fn is_coalesced(&self) -> bool {
        self.task.is_none()
    }

    /// Wait for the audit and its report delivery
    pub async fn outcome(self) -> Result<AuditOutcome> {
        let Some(task) = self.task else {
            return Ok(AuditOutcome::Coalesced);
        };

        match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(AuditError::Abandoned),
            Err(e) => Err(AuditError::Other(anyhow::anyhow!(
                "violations callback panicked: {}",
                e
            ))),
        }
    }
}

struct Bindings {
    state: AuditorState,
    subscriptions: HashMap<SubjectId, Box<dyn Subscription>>,
}

struct AuditorInner {
    id: Uuid,
    queue: Arc<AuditQueue>,
    engine: Arc<dyn RuleEngine>,
    source: Arc<dyn ChangeSource>,
    callback: ViolationsCallback,
    config: AuditorConfig,
    ledger: Mutex<IncidentLedger>,
    bindings: Mutex<Bindings>,
    debouncer: Mutex<Debouncer<SubjectId>>,
}

impl AuditorInner {
    fn audit(self: &Arc<Self>, subject: SubjectRef) -> AuditHandle {
        let key = subject.id();
        let engine = self.engine.clone();
        let target = subject.clone();

        let ticket = self.queue.run(key, move || async move {
            if !target.is_connected() {
                return Ok(None);
            }
            engine.run_rules(&target).await.map(Some)
        });

        let Some(ticket) = ticket else {
            trace!(auditor = %self.id, subject = %key, "Audit coalesced");
            return AuditHandle::coalesced(key);
        };

        let inner = self.clone();
        let task = self
            .queue
            .handle()
            .spawn(async move { inner.deliver(&subject, ticket).await });

        AuditHandle {
            subject: key,
            task: Some(task),
        }
    }

    async fn deliver(
        &self,
        subject: &SubjectRef,
        ticket: AuditTicket<AuditReport>,
    ) -> Result<AuditOutcome> {
        let report = match ticket.await {
            Ok(Some(report)) => report,
            Ok(None) => {
                debug!(auditor = %self.id, subject = %subject.id(), "Subject disconnected, audit skipped");
                return Ok(AuditOutcome::Stale);
            }
            Err(e) => {
                warn!(
                    auditor = %self.id,
                    subject = %subject.id(),
                    locator = %subject.locator(),
                    engine = self.engine.name(),
                    kind = e.kind(),
                    error = %e,
                    "Audit failed"
                );
                return Err(e);
            }
        };

        if report.is_clean() {
            trace!(auditor = %self.id, subject = %subject.id(), "No violations");
            return Ok(AuditOutcome::Clean);
        }

        let found = report.violations.len();
        let fresh = self.ledger.lock().filter_new(report);
        if fresh.is_empty() {
            debug!(auditor = %self.id, subject = %subject.id(), found, "All violations already reported");
            return Ok(AuditOutcome::Suppressed);
        }

        let reported = fresh.len();
        info!(
            auditor = %self.id,
            subject = %subject.id(),
            found,
            reported,
            "Reporting new violations"
        );
        (self.callback)(fresh);
        Ok(AuditOutcome::Reported(reported))
    }

    fn on_changes(self: &Arc<Self>, targets: Vec<SubjectRef>) {
        if self.bindings.lock().state != AuditorState::Observing {
            trace!(auditor = %self.id, "Change after disconnect ignored");
            return;
        }

        let now = tokio::time::Instant::now().into_std();
        let mut seen = HashSet::new();
        let mut admitted = Vec::new();
        let mut deferred = Vec::new();
        {
            let mut debouncer = self.debouncer.lock();
            debouncer.prune(now);
            for target in targets {
                if !seen.insert(target.id()) {
                    continue;
                }
                match debouncer.admit(target.id(), now) {
                    Admission::Emit => admitted.push(target),
                    Admission::Arm(deadline) => deferred.push((target, deadline)),
                    Admission::Suppress => {}
                }
            }
        }

        for target in admitted {
            // Detached; the outcome is logged by `deliver`
            drop(self.audit(target));
        }
        for (target, deadline) in deferred {
            self.arm_trailing(target, deadline);
        }
    }

    /// One timer per suppressed burst; audits the subject once the burst goes quiet
    fn arm_trailing(self: &Arc<Self>, target: SubjectRef, deadline: std::time::Instant) {
        let weak = Arc::downgrade(self);
        trace!(auditor = %self.id, subject = %target.id(), "Trailing audit armed");

        self.queue.handle().spawn(async move {
            let mut deadline = deadline;
            loop {
                tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;

                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.bindings.lock().state != AuditorState::Observing {
                    return;
                }

                let now = tokio::time::Instant::now().into_std();
                let step = inner.debouncer.lock().trailing(&target.id(), now);
                match step {
                    Trailing::Wait(next) => deadline = next,
                    Trailing::Emit => {
                        trace!(auditor = %inner.id, subject = %target.id(), "Trailing audit");
                        drop(inner.audit(target));
                        return;
                    }
                    Trailing::Idle => return,
                }
            }
        });
    }

    /// Release all bindings; false if already disconnected
    fn release(&self) -> bool {
        let subscriptions = {
            let mut bindings = self.bindings.lock();
            if bindings.state == AuditorState::Disconnected {
                return false;
            }
            bindings.state = AuditorState::Disconnected;
            std::mem::take(&mut bindings.subscriptions)
        };

        for (_, mut subscription) in subscriptions {
            subscription.unsubscribe();
        }
        self.debouncer.lock().clear();

        if self.config.dedup == DedupPolicy::ClearOnDisconnect {
            self.ledger.lock().clear();
        }
        true
    }
}

fn change_callback(inner: Weak<AuditorInner>) -> ChangeCallback {
    Arc::new(move |targets: Vec<SubjectRef>| {
        if let Some(inner) = inner.upgrade() {
            inner.on_changes(targets);
        }
    })
}

/// Watches subtrees and reports accessibility incidents as they appear
pub struct ChangeAuditor {
    inner: Arc<AuditorInner>,
}

impl ChangeAuditor {
    pub fn builder() -> ChangeAuditorBuilder {
        ChangeAuditorBuilder::default()
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn state(&self) -> AuditorState {
        self.inner.bindings.lock().state
    }

    pub fn config(&self) -> &AuditorConfig {
        &self.inner.config
    }

    pub fn queue(&self) -> &Arc<AuditQueue> {
        &self.inner.queue
    }

    /// Number of distinct roots with a live subscription
    pub fn observed_count(&self) -> usize {
        self.inner.bindings.lock().subscriptions.len()
    }

    /// Number of incidents reported so far
    pub fn incident_count(&self) -> usize {
        self.inner.ledger.lock().len()
    }

    /// Start watching `root` and audit it right away
    ///
    /// Observing a root twice keeps the single subscription but still runs
    /// a fresh baseline audit.
    ///
    /// # Errors
    /// - `InvalidState` after `disconnect()`
    /// - `InvalidArgument` when `root` is not attached to its tree
    /// - `Subscription` when the change source refuses `root`
    pub fn observe(&self, root: &SubjectRef) -> Result<AuditHandle> {
        let key = root.id();
        let needs_binding = {
            let bindings = self.inner.bindings.lock();
            if bindings.state == AuditorState::Disconnected {
                return Err(AuditError::InvalidState(format!(
                    "auditor {} is disconnected",
                    self.inner.id
                )));
            }
            !bindings.subscriptions.contains_key(&key)
        };

        if !root.is_connected() {
            return Err(AuditError::invalid_argument(format!(
                "{} ({}) is not attached to its tree",
                root.locator(),
                key
            )));
        }

        if needs_binding {
            let subscription = self.inner.source.subscribe(
                root,
                self.inner.config.watch,
                change_callback(Arc::downgrade(&self.inner)),
            )?;

            let mut bindings = self.inner.bindings.lock();
            if bindings.state == AuditorState::Disconnected {
                drop(bindings);
                let mut subscription = subscription;
                subscription.unsubscribe();
                return Err(AuditError::InvalidState(format!(
                    "auditor {} disconnected during observe",
                    self.inner.id
                )));
            }
            // A concurrent observe of the same root may have won; keep one
            bindings.subscriptions.entry(key).or_insert(subscription);
            bindings.state = AuditorState::Observing;
        }

        info!(
            auditor = %self.inner.id,
            root = %key,
            locator = %root.locator(),
            "Observing subtree"
        );
        Ok(self.inner.audit(root.clone()))
    }

    /// Queue an audit of `subject` outside of change notification
    pub fn audit_subject(&self, subject: SubjectRef) -> AuditHandle {
        self.inner.audit(subject)
    }

    /// Stop observing; the auditor cannot be reused
    pub fn disconnect(&self) {
        if self.inner.release() {
            info!(
                auditor = %self.inner.id,
                dedup = %self.inner.config.dedup,
                "Auditor disconnected"
            );
        }
    }

    /// Forget every reported incident
    pub fn reset_incidents(&self) {
        let mut ledger = self.inner.ledger.lock();
        debug!(auditor = %self.inner.id, cleared = ledger.len(), "Incident ledger reset");
        ledger.clear();
    }
}

impl Drop for ChangeAuditor {
    fn drop(&mut self) {
        self.inner.release();
    }
}

impl std::fmt::Debug for ChangeAuditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeAuditor")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("observed", &self.observed_count())
            .field("incidents", &self.incident_count())
            .finish()
    }
}

#[derive(Default)]
pub struct ChangeAuditorBuilder {
    callback: Option<ViolationsCallback>,
    engine: Option<Arc<dyn RuleEngine>>,
    source: Option<Arc<dyn ChangeSource>>,
    queue: Option<Arc<AuditQueue>>,
    config: Option<AuditorConfig>,
}

impl ChangeAuditorBuilder {
    pub fn violations_callback(mut self, callback: ViolationsCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn RuleEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn change_source(mut self, source: Arc<dyn ChangeSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Share a queue with other auditors of the same engine
    pub fn queue(mut self, queue: Arc<AuditQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn config(mut self, config: AuditorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// # Errors
    /// - `InvalidArgument` when the callback, engine, or change source is missing
    /// - `Config` when the configuration does not validate
    /// - `InvalidState` when no queue was given and there is no tokio runtime
    pub fn build(self) -> Result<ChangeAuditor> {
        let callback = self
            .callback
            .ok_or_else(|| AuditError::invalid_argument("a violations callback is required"))?;
        let engine = self
            .engine
            .ok_or_else(|| AuditError::invalid_argument("a rule engine is required"))?;
        let source = self
            .source
            .ok_or_else(|| AuditError::invalid_argument("a change source is required"))?;

        let config = self.config.unwrap_or_default();
        config.validate()?;

        let queue = match self.queue {
            Some(queue) => queue,
            None => Arc::new(AuditQueue::new(Arc::new(TimerIdleScheduler::from_config(
                &config.idle,
            )))?),
        };

        let id = Uuid::new_v4();
        debug!(auditor = %id, engine = engine.name(), "Auditor created");

        Ok(ChangeAuditor {
            inner: Arc::new(AuditorInner {
                id,
                queue,
                engine,
                source,
                callback,
                debouncer: Mutex::new(Debouncer::from_config(&config.debounce)),
                config,
                ledger: Mutex::new(IncidentLedger::new()),
                bindings: Mutex::new(Bindings {
                    state: AuditorState::Unbound,
                    subscriptions: HashMap::new(),
                }),
            }),
        })
    }
}
