use config::load::load_config;
use config::shared::SummarizerConfig;

/// Loads and validates the summarizer configuration.
pub fn load_summarizer_config() -> anyhow::Result<SummarizerConfig> {
    let config = load_config::<SummarizerConfig>()?;
    config.validate()?;

    Ok(config)
}
