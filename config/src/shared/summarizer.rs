use serde::{Deserialize, Serialize};

use crate::load::Config;
use crate::shared::{CoordinationConfig, DrainConfig, ValidationError};

/// Top-level configuration of the `summarizer` service.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SummarizerConfig {
    /// Gate coordination settings.
    #[serde(default)]
    pub coordination: CoordinationConfig,
    /// Drain worker settings.
    #[serde(default)]
    pub drain: DrainConfig,
}

impl SummarizerConfig {
    /// Validates every section of the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.coordination.validate()?;
        self.drain.validate()
    }
}

impl Config for SummarizerConfig {}
