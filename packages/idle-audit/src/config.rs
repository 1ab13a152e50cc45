//! Auditor configuration
//!
//! Everything has a default, so an empty YAML document is a valid config.
//!
//! ```yaml
//! idle:
//!   slice_budget_ms: 50
//!   fallback_delay_ms: 1
//! debounce:
//!   wait_ms: 200
//!   max_wait_ms: 1000
//!   leading: true
//! watch:
//!   attributes: true
//!   child_list: true
//!   subtree: true
//! dedup: preserve
//! ```

use crate::change::WatchOptions;
use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for a `ChangeAuditor`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditorConfig {
    pub idle: IdleConfig,
    pub debounce: DebounceConfig,
    pub watch: WatchOptions,
    pub dedup: DedupPolicy,
}

impl AuditorConfig {
    /// Load and validate a YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: AuditorConfig = if yaml.trim().is_empty() {
            AuditorConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.idle.slice_budget_ms == 0 {
            return Err(AuditError::config(
                "idle.slice_budget_ms must be greater than 0",
            ));
        }

        if let Some(max_wait_ms) = self.debounce.max_wait_ms {
            if max_wait_ms < self.debounce.wait_ms {
                return Err(AuditError::config(format!(
                    "debounce.max_wait_ms ({}) must be >= debounce.wait_ms ({})",
                    max_wait_ms, self.debounce.wait_ms
                )));
            }
        }

        if !self.watch.observes_anything() {
            return Err(AuditError::config(
                "watch must observe attributes, child_list, or both",
            ));
        }

        Ok(())
    }
}

/// Idle slice parameters for the fallback timer scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Nominal budget granted per slice
    pub slice_budget_ms: u64,
    /// Delay before a slice is granted
    pub fallback_delay_ms: u64,
}

impl IdleConfig {
    pub fn slice_budget(&self) -> Duration {
        Duration::from_millis(self.slice_budget_ms)
    }

    pub fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_delay_ms)
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            slice_budget_ms: 50,
            fallback_delay_ms: 1,
        }
    }
}

/// Debounce of change notifications, per subject
///
/// Changes suppressed during a burst are audited once the subject has been
/// quiet for `wait_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Quiet window; 0 disables debouncing
    pub wait_ms: u64,
    /// Force an audit at least this often during a continuous burst
    pub max_wait_ms: Option<u64>,
    /// Also audit on the first change of a burst
    pub leading: bool,
}

impl DebounceConfig {
    pub fn is_enabled(&self) -> bool {
        self.wait_ms > 0
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            wait_ms: 0,
            max_wait_ms: None,
            leading: true,
        }
    }
}

/// What happens to the incident ledger on `disconnect()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Keep suppressing incidents that were already reported
    #[default]
    Preserve,
    /// Forget reported incidents when the auditor disconnects
    ClearOnDisconnect,
}

impl DedupPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupPolicy::Preserve => "preserve",
            DedupPolicy::ClearOnDisconnect => "clear_on_disconnect",
        }
    }
}

impl std::fmt::Display for DedupPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
