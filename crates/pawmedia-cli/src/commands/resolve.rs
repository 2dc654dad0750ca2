//! `pawmedia resolve`: stream a resolution run to the terminal.
//!
//! Ctrl-C cancels the run; whatever had settled is printed as the result.

use std::path::Path;

use anyhow::Result;
use pawmedia::{MediaReference, ResolutionRun, RunOutcome};

use super::load_engine;
use crate::output::{format_slot, print_json, OutputMode};

pub async fn run(
    config: Option<&Path>,
    offline: bool,
    primary: Vec<String>,
    pool: Vec<String>,
    final_only: bool,
    mode: OutputMode,
) -> Result<()> {
    let engine = load_engine(config, offline)?;

    let mut run = if primary.is_empty() {
        let (selection, run) = engine.request_sequence().await?;
        if mode == OutputMode::Text {
            println!("  Tier: {}", selection.tier);
        }
        run
    } else {
        let pool = if pool.is_empty() {
            engine.config().backup.clone()
        } else {
            to_references(pool)
        };
        engine.resolver().start(to_references(primary), pool)
    };

    stream_updates(&mut run, final_only, mode).await;

    match run.finish().await {
        RunOutcome::Completed(resolution) => {
            if mode == OutputMode::Text {
                println!(
                    "  Done: {} slots, {} substituted, {} unavailable",
                    resolution.sequence.len(),
                    resolution.substituted(),
                    resolution.unavailable()
                );
            }
        }
        RunOutcome::Cancelled(resolution) => match mode {
            OutputMode::Json => print_json(&serde_json::json!({
                "cancelled": true,
                "settled": resolution.settled(),
                "sequence": resolution.sequence,
            })),
            OutputMode::Text => println!(
                "  Cancelled after {} of {} slots",
                resolution.settled(),
                resolution.sequence.len()
            ),
        },
    }
    Ok(())
}

async fn stream_updates(run: &mut ResolutionRun, final_only: bool, mode: OutputMode) {
    loop {
        let update = tokio::select! {
            update = run.next_update() => update,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, cancelling run {}", run.run_id());
                run.cancel();
                None
            }
        };
        let Some(update) = update else { break };
        if final_only && !update.is_final {
            continue;
        }

        match mode {
            OutputMode::Json => print_json(&update),
            OutputMode::Text => {
                let heading = match update.resolved_slot {
                    Some(slot) => format!("slot {slot} settled"),
                    None => "final".to_string(),
                };
                println!("  [{}] {heading}", update.seq);
                for (i, (reference, status)) in
                    update.sequence.iter().zip(&update.slots).enumerate()
                {
                    println!("{}", format_slot(i, reference, status));
                }
            }
        }
    }
}

fn to_references(locators: Vec<String>) -> Vec<MediaReference> {
    locators
        .into_iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| MediaReference::new(l.trim(), ""))
        .collect()
}
