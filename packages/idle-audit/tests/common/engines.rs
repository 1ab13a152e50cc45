//! Instrumented collaborators

use async_trait::async_trait;
use idle_audit::{
    AuditError, AuditReport, IdleDeadline, IdleScheduler, Result, SliceDeadline, SubjectRef,
    Violation, ViolationsCallback,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Rule engine that records every call and the peak number of overlapping calls
///
/// Reports are scripted per subject locator; unknown locators are clean.
#[derive(Default)]
pub struct InstrumentedEngine {
    delay: Duration,
    reports: Mutex<HashMap<String, AuditReport>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl InstrumentedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Engine whose every call takes `delay`
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn script(&self, locator: impl Into<String>, report: AuditReport) {
        self.reports.lock().insert(locator.into(), report);
    }

    pub fn fail_on(&self, locator: impl Into<String>) {
        self.failing.lock().insert(locator.into());
    }

    /// Locators in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl idle_audit::RuleEngine for InstrumentedEngine {
    fn name(&self) -> &str {
        "instrumented"
    }

    async fn run_rules(&self, subject: &SubjectRef) -> Result<AuditReport> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let locator = subject.locator();
        self.calls.lock().push(locator.clone());

        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }

        let result = if self.failing.lock().contains(&locator) {
            Err(AuditError::engine(format!("rule engine rejected {}", locator)))
        } else {
            Ok(self
                .reports
                .lock()
                .get(&locator)
                .cloned()
                .unwrap_or_default())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Grants slices that are already exhausted
#[derive(Default)]
pub struct ZeroBudgetScheduler {
    slices: AtomicUsize,
}

impl ZeroBudgetScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slices(&self) -> usize {
        self.slices.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdleScheduler for ZeroBudgetScheduler {
    async fn next_slice(&self) -> Box<dyn IdleDeadline> {
        tokio::task::yield_now().await;
        self.slices.fetch_add(1, Ordering::SeqCst);
        Box::new(SliceDeadline::new(Duration::ZERO))
    }
}

/// Collects every batch handed to the violations callback
#[derive(Clone, Default)]
pub struct Recorder {
    batches: Arc<Mutex<Vec<Vec<Violation>>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> ViolationsCallback {
        let batches = self.batches.clone();
        Arc::new(move |violations| batches.lock().push(violations))
    }

    pub fn batches(&self) -> Vec<Vec<Violation>> {
        self.batches.lock().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }

    /// Every reported (rule, locator) pair, in delivery order
    pub fn incidents(&self) -> Vec<(String, String)> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .flat_map(|violation| {
                violation
                    .nodes
                    .iter()
                    .map(|node| (violation.rule_id.clone(), node.locator()))
            })
            .collect()
    }
}
