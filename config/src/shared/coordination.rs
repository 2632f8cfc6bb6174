use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Gate coordination settings shared by every summarizer replica.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoordinationConfig {
    /// Identity published on gate signals by this replica.
    ///
    /// When absent, a random identity is generated at startup.
    #[serde(default)]
    pub instance_name: Option<String>,
    /// Maximum time, in milliseconds, a summary request waits for busy gates to clear.
    #[serde(default = "default_admission_timeout_ms")]
    pub admission_timeout_ms: u64,
    /// Capacity of each gate's in-process broadcast channel.
    #[serde(default = "default_signal_buffer_size")]
    pub signal_buffer_size: usize,
}

impl CoordinationConfig {
    /// Default admission wait budget.
    pub const DEFAULT_ADMISSION_TIMEOUT_MS: u64 = 1_300;

    /// Default broadcast channel capacity.
    pub const DEFAULT_SIGNAL_BUFFER_SIZE: usize = 1_024;

    /// Validates coordination settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.admission_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "coordination.admission_timeout_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.signal_buffer_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "coordination.signal_buffer_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if let Some(name) = &self.instance_name
            && name.trim().is_empty()
        {
            return Err(ValidationError::InvalidFieldValue {
                field: "coordination.instance_name".to_string(),
                constraint: "must not be blank when set".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            instance_name: None,
            admission_timeout_ms: default_admission_timeout_ms(),
            signal_buffer_size: default_signal_buffer_size(),
        }
    }
}

fn default_admission_timeout_ms() -> u64 {
    CoordinationConfig::DEFAULT_ADMISSION_TIMEOUT_MS
}

fn default_signal_buffer_size() -> usize {
    CoordinationConfig::DEFAULT_SIGNAL_BUFFER_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinationConfig::default();
        assert_eq!(config.admission_timeout_ms, 1_300);
        assert_eq!(config.signal_buffer_size, 1_024);
        assert!(config.instance_name.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let config = CoordinationConfig {
            admission_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_blank_instance_name() {
        let config = CoordinationConfig {
            instance_name: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
