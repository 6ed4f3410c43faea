//! Admission scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::serde::{PerPriority, PriorityLevel};

/// Tunables for the admission scheduler.
///
/// Deserializes leniently: any field missing from the input falls back to its
/// default, so partial overrides stay valid as fields are added.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum records dispatched concurrently. Zero is legal and pauses
    /// dispatch entirely; enqueue and eviction keep working (drain mode).
    pub max_concurrent: usize,
    /// Maximum records queued across all lanes before admission rejects or
    /// sheds.
    pub max_queue_size: usize,
    /// How long a record may sit queued before timeout eviction.
    pub request_timeout_ms: u64,
    /// Relative dispatch weight per lane under fair scheduling.
    pub priority_weights: PerPriority<u32>,
    /// Shed the tail of a strictly lower lane to admit a newcomer when the
    /// queue is full.
    pub enable_backpressure: bool,
    /// Weighted fair lane selection; strict descending priority when
    /// disabled.
    pub fair_scheduling: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 50,
            max_queue_size: 200,
            request_timeout_ms: 30_000,
            priority_weights: PerPriority {
                critical: 10,
                high: 5,
                normal: 3,
                low: 2,
                background: 1,
            },
            enable_backpressure: true,
            fair_scheduling: true,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_queue_size == 0 {
            return Err("max_queue_size must be greater than 0".into());
        }
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be greater than 0".into());
        }
        for level in PriorityLevel::ALL {
            if *self.priority_weights.get(level) == 0 {
                return Err(format!("priority_weights.{level} must be greater than 0"));
            }
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// The admission timeout as a [`Duration`].
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
