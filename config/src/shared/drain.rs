use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Settings for the background worker that flushes queued payments to durable storage.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DrainConfig {
    /// Whether the drain worker runs at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Name of the gate whose busy state triggers draining.
    #[serde(default = "default_trigger_gate")]
    pub trigger_gate: String,
    /// Delay, in milliseconds, between flush invocations while the trigger is active.
    #[serde(default = "default_iteration_delay_ms")]
    pub iteration_delay_ms: u64,
    /// Maximum number of records persisted by one flush invocation.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl DrainConfig {
    /// Default trigger: the gate held by in-flight summary readers.
    pub const DEFAULT_TRIGGER_GATE: &'static str = "api:payments-summary";

    /// Default delay between flush invocations.
    pub const DEFAULT_ITERATION_DELAY_MS: u64 = 10;

    /// Default flush batch size.
    pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

    /// Validates drain settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.trigger_gate.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "drain.trigger_gate".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        if self.iteration_delay_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "drain.iteration_delay_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.max_batch_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "drain.max_batch_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            trigger_gate: default_trigger_gate(),
            iteration_delay_ms: default_iteration_delay_ms(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_trigger_gate() -> String {
    DrainConfig::DEFAULT_TRIGGER_GATE.to_string()
}

fn default_iteration_delay_ms() -> u64 {
    DrainConfig::DEFAULT_ITERATION_DELAY_MS
}

fn default_max_batch_size() -> usize {
    DrainConfig::DEFAULT_MAX_BATCH_SIZE
}
