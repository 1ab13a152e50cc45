//! Idle-time scheduling primitive
//!
//! The queue only needs two things from its host: a way to wait for the
//! next idle slice, and a way to ask how much of that slice is left.

use crate::config::IdleConfig;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Budget of one granted idle slice
pub trait IdleDeadline: Send {
    /// Remaining budget; zero once the slice is used up
    fn time_remaining(&self) -> Duration;

    fn is_exhausted(&self) -> bool {
        self.time_remaining().is_zero()
    }
}

/// Grants idle slices
#[async_trait]
pub trait IdleScheduler: Send + Sync {
    /// Wait until the host is idle, then return the slice budget
    async fn next_slice(&self) -> Box<dyn IdleDeadline>;
}

/// Deadline measured against the monotonic clock
#[derive(Debug, Clone, Copy)]
pub struct SliceDeadline {
    started_at: Instant,
    budget: Duration,
}

impl SliceDeadline {
    pub fn new(budget: Duration) -> Self {
        Self::starting_at(Instant::now(), budget)
    }

    pub fn starting_at(started_at: Instant, budget: Duration) -> Self {
        Self { started_at, budget }
    }
}

impl IdleDeadline for SliceDeadline {
    fn time_remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started_at.elapsed())
    }
}

/// Fixed-delay fallback for hosts without a native idle signal
///
/// Sleeps for `delay`, then grants a slice of `budget`.
#[derive(Debug, Clone)]
pub struct TimerIdleScheduler {
    delay: Duration,
    budget: Duration,
}

impl TimerIdleScheduler {
    pub fn new(delay: Duration, budget: Duration) -> Self {
        Self { delay, budget }
    }

    pub fn from_config(config: &IdleConfig) -> Self {
        Self::new(config.fallback_delay(), config.slice_budget())
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

impl Default for TimerIdleScheduler {
    fn default() -> Self {
        Self::from_config(&IdleConfig::default())
    }
}

#[async_trait]
impl IdleScheduler for TimerIdleScheduler {
    async fn next_slice(&self) -> Box<dyn IdleDeadline> {
        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }
        Box::new(SliceDeadline::new(self.budget))
    }
}
