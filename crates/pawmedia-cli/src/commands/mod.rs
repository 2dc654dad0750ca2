//! Subcommand implementations for the pawmedia binary.

pub mod probe;
pub mod resolve;
pub mod select;

use std::path::Path;

use anyhow::{Context, Result};
use pawmedia::{EngineConfig, MediaEngine};

use crate::output::{print_json, OutputMode};

/// Load the effective config, wrapping errors with the source that failed.
pub fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    EngineConfig::load(explicit).context("failed to load configuration")
}

pub fn load_engine(explicit: Option<&Path>, offline: bool) -> Result<MediaEngine> {
    let config = load_config(explicit)?;
    let engine = if offline {
        MediaEngine::offline(config)
    } else {
        MediaEngine::from_config(config)
    };
    engine.context("failed to build media engine")
}

/// Print the configuration after file lookup and environment overrides.
pub fn show_config(explicit: Option<&Path>, mode: OutputMode) -> Result<()> {
    let config = load_config(explicit)?;
    match mode {
        OutputMode::Json => print_json(&config),
        OutputMode::Text => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}
