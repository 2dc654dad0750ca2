//! Engine event bus: typed telemetry from the selector and resolver.
//!
//! The bus is a `tokio::sync::broadcast` channel carrying [`EngineEvent`]
//! values. Any consumer (a log shipper, a debug overlay, the CLI's JSON
//! stream) can subscribe independently. When no subscriber exists, events
//! are silently dropped.

use crate::types::Tier;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Every event the engine emits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    // ── Tier selection ────────────────────
    /// A tier's sample was probed.
    TierProbed {
        tier: Tier,
        sampled: usize,
        available: usize,
        accepted: bool,
        elapsed_ms: u64,
    },
    /// A tier was chosen for this request.
    TierSelected {
        tier: Tier,
        item_count: usize,
        fallback: bool,
    },

    // ── Resolution runs ───────────────────
    /// A resolution run started.
    RunStarted {
        run_id: Uuid,
        slots: usize,
        pool: usize,
        timestamp: String,
    },
    /// One slot settled.
    SlotResolved {
        run_id: Uuid,
        slot: usize,
        locator: String,
        substituted: bool,
        available: bool,
    },
    /// All slots settled and the final sequence was emitted.
    RunCompleted {
        run_id: Uuid,
        substituted: usize,
        unavailable: usize,
        elapsed_ms: u64,
    },
    /// The consumer went away before the run finished.
    RunCancelled {
        run_id: Uuid,
        settled: usize,
        elapsed_ms: u64,
    },
}

/// Cloneable handle to the engine's broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event, ignoring the error returned when nobody listens.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
