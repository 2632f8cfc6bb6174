//! Payments summary service binary.
//!
//! Loads configuration, installs tracing and runs the summary coordination core together with
//! its background drain worker until Ctrl+C is received.

use telemetry::tracing::init_tracing;

use crate::config::load_summarizer_config;
use crate::core::start_summarizer;

mod config;
mod core;

fn main() -> anyhow::Result<()> {
    let summarizer_config = load_summarizer_config()?;

    init_tracing(env!("CARGO_BIN_NAME"))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_summarizer(summarizer_config))?;

    Ok(())
}
