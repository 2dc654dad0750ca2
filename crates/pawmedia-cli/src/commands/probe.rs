//! `pawmedia probe`: one availability probe per locator.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use pawmedia::engine::{default_loader, offline_loader};
use pawmedia::{MediaReference, Prober};

use super::load_config;
use crate::output::{print_json, OutputMode};

pub async fn run(
    config: Option<&Path>,
    offline: bool,
    locators: &[String],
    mode: OutputMode,
) -> Result<()> {
    let config = load_config(config)?;
    let loader = if offline {
        offline_loader(&config)
    } else {
        default_loader(&config)
    };
    let prober = Prober::new(loader, Duration::from_millis(config.probe.timeout_ms));

    let references: Vec<MediaReference> = locators
        .iter()
        .map(|l| MediaReference::new(l.clone(), ""))
        .collect();
    let results = prober.probe_all(&references).await;

    match mode {
        OutputMode::Json => {
            for result in &results {
                print_json(result);
            }
        }
        OutputMode::Text => {
            for result in &results {
                let marker = if result.available { "✓" } else { "✗" };
                println!("  {marker} {}", result.reference.source_locator());
            }
            let ok = results.iter().filter(|r| r.available).count();
            println!("  {ok}/{} available", results.len());
        }
    }
    Ok(())
}
