//! Per-key debouncing of change notifications
//!
//! Pure time bookkeeping: callers pass `now`, nothing here sleeps. A burst
//! is a run of events for one key with gaps shorter than `wait`.
//!
//! Suppressed events are never lost. The first suppressed event of a burst
//! asks the caller to arm a timer ([`Admission::Arm`]); when it fires, the
//! caller asks [`Debouncer::trailing`] whether the burst has gone quiet and
//! emits once for everything suppressed since the last emission.

use crate::config::DebounceConfig;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// What to do with one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Act on it now
    Emit,
    /// Suppressed; arm a trailing timer for this instant
    Arm(Instant),
    /// Suppressed; a trailing timer is already armed
    Suppress,
}

impl Admission {
    pub fn is_emit(&self) -> bool {
        matches!(self, Admission::Emit)
    }
}

/// Answer to a fired trailing timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trailing {
    /// The burst went quiet with suppressed events; act now
    Emit,
    /// More events arrived; sleep until this instant and ask again
    Wait(Instant),
    /// Nothing left to emit; drop the timer
    Idle,
}

#[derive(Debug, Clone, Copy)]
struct DebounceEntry {
    burst_started: Instant,
    last_seen: Instant,
    last_emitted: Option<Instant>,
    /// Events suppressed since the last emission
    pending: bool,
    /// A trailing timer is out for this key
    armed: bool,
}

/// Debouncer with optional leading edge, trailing edge and max wait
#[derive(Debug)]
pub struct Debouncer<K> {
    wait: Duration,
    max_wait: Option<Duration>,
    leading: bool,
    entries: HashMap<K, DebounceEntry>,
}

impl<K: Hash + Eq + Clone> Debouncer<K> {
    pub fn new(wait: Duration, max_wait: Option<Duration>, leading: bool) -> Self {
        Self {
            wait,
            max_wait,
            leading,
            entries: HashMap::new(),
        }
    }

    pub fn from_config(config: &DebounceConfig) -> Self {
        Self::new(config.wait(), config.max_wait(), config.leading)
    }

    /// Record an event for `key` at `now`
    pub fn admit(&mut self, key: K, now: Instant) -> Admission {
        if self.wait.is_zero() {
            return Admission::Emit;
        }

        let wait = self.wait;
        match self.entries.get_mut(&key) {
            Some(entry) if now.saturating_duration_since(entry.last_seen) < wait => {
                // Within the burst - only max_wait forces an emission
                entry.last_seen = now;
                let since = entry.last_emitted.unwrap_or(entry.burst_started);
                if let Some(max_wait) = self.max_wait {
                    if now.saturating_duration_since(since) >= max_wait {
                        entry.last_emitted = Some(now);
                        entry.pending = false;
                        return Admission::Emit;
                    }
                }
                entry.pending = true;
                Self::arm(entry, now + wait)
            }
            previous => {
                // New burst; an emission now covers anything still pending
                let armed = previous.map_or(false, |entry| entry.armed);
                let mut entry = DebounceEntry {
                    burst_started: now,
                    last_seen: now,
                    last_emitted: self.leading.then_some(now),
                    pending: !self.leading,
                    armed,
                };
                let admission = if self.leading {
                    Admission::Emit
                } else {
                    Self::arm(&mut entry, now + wait)
                };
                self.entries.insert(key, entry);
                admission
            }
        }
    }

    fn arm(entry: &mut DebounceEntry, deadline: Instant) -> Admission {
        if entry.armed {
            Admission::Suppress
        } else {
            entry.armed = true;
            Admission::Arm(deadline)
        }
    }

    /// Called when the trailing timer for `key` fires at `now`
    pub fn trailing(&mut self, key: &K, now: Instant) -> Trailing {
        let Some(entry) = self.entries.get_mut(key) else {
            return Trailing::Idle;
        };

        if !entry.pending {
            entry.armed = false;
            return Trailing::Idle;
        }

        let quiet_at = entry.last_seen + self.wait;
        if now < quiet_at {
            return Trailing::Wait(quiet_at);
        }

        entry.pending = false;
        entry.armed = false;
        entry.last_emitted = Some(now);
        Trailing::Emit
    }

    /// Drop keys whose burst ended long ago and that owe no trailing emission
    pub fn prune(&mut self, now: Instant) {
        let horizon = self.wait * 2;
        self.entries.retain(|_, entry| {
            entry.armed || now.saturating_duration_since(entry.last_seen) < horizon
        });
    }

    /// Forget every key; armed timers will find nothing to emit
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn tracked(&self) -> usize {
        self.entries.len()
    }
}
