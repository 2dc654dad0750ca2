//! Output helpers shared by the subcommands.

use pawmedia::{MediaReference, SlotStatus};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

impl OutputMode {
    pub fn from_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Print one JSON value per line.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => eprintln!("  Error: cannot serialize output: {e}"),
    }
}

/// One line per slot: index, marker, locator and what happened.
pub fn format_slot(index: usize, reference: &MediaReference, status: &SlotStatus) -> String {
    let (marker, note) = match status {
        SlotStatus::Pending => ("…", String::new()),
        SlotStatus::Available => ("✓", String::new()),
        SlotStatus::Substituted { replaced } => ("↺", format!("  (replaces {replaced})")),
        SlotStatus::Unavailable => ("✗", "  (no backup left)".to_string()),
    };
    format!(
        "  {index:>3} {marker} {}{note}",
        reference.source_locator()
    )
}
