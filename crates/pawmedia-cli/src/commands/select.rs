//! `pawmedia select`: run tier selection and show the reasoning.

use std::path::Path;

use anyhow::Result;

use super::load_engine;
use crate::output::{print_json, OutputMode};

pub async fn run(config: Option<&Path>, offline: bool, mode: OutputMode) -> Result<()> {
    let engine = load_engine(config, offline)?;
    let selection = engine.select_tier().await?;

    if mode == OutputMode::Json {
        print_json(&selection);
        return Ok(());
    }

    let required = engine.selector().policy();
    println!(
        "  Quorum: {} of {} sampled",
        required.min_available, required.sample_size
    );
    for report in &selection.reports {
        let verdict = if report.accepted { "accepted" } else { "rejected" };
        print!(
            "  {:<16} {}/{} available, {} items, {verdict}",
            report.tier.to_string(),
            report.available,
            report.sampled,
            report.item_count
        );
        match &report.fetch_error {
            Some(e) => println!(" ({e})"),
            None => println!(),
        }
    }
    let suffix = if selection.fallback { " (fallback)" } else { "" };
    println!("  Selected: {}{suffix}", selection.tier);
    Ok(())
}
