//! Tier selector: pick which source tier serves a request.
//!
//! Tiers are tried in priority order. Each gets a small sample probed
//! concurrently; the first tier whose sample meets the quorum wins and no
//! lower tier is touched. If none qualifies, the last tier is taken
//! unconditionally, so selection always terminates with some tier.
//!
//! The sample is deliberately small: it trades accuracy for latency and
//! says nothing certain about the rest of the tier.

use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventBus};
use crate::probe::Prober;
use crate::source::TierSource;
use crate::types::{MediaReference, Tier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Default number of items sampled per tier.
pub const DEFAULT_SAMPLE_SIZE: usize = 3;
/// Default number of sampled items that must load.
pub const DEFAULT_QUORUM: usize = 3;

/// A tier plus the source that produces its items.
pub type TierCandidate = Arc<dyn TierSource>;

/// How many items to sample and how many must be available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumPolicy {
    pub sample_size: usize,
    pub min_available: usize,
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            min_available: DEFAULT_QUORUM,
        }
    }
}

impl QuorumPolicy {
    /// Successes required for a sample of `sampled` items.
    ///
    /// A tier smaller than the sample size can still pass by loading all
    /// of what it has. An empty sample never passes.
    pub fn required(&self, sampled: usize) -> usize {
        self.min_available.min(sampled).max(1)
    }

    pub fn is_met(&self, sampled: usize, available: usize) -> bool {
        sampled > 0 && available >= self.required(sampled)
    }
}

/// Draw up to `size` items spread evenly across `items`, keeping their order.
pub fn draw_sample(items: &[MediaReference], size: usize) -> Vec<MediaReference> {
    if items.len() <= size {
        return items.to_vec();
    }
    (0..size)
        .map(|i| items[i * items.len() / size].clone())
        .collect()
}

/// What happened to one tier during selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierReport {
    pub tier: Tier,
    pub item_count: usize,
    pub sampled: usize,
    pub available: usize,
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
}

/// The tier chosen for a request and the items it supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSelection {
    pub tier: Tier,
    pub items: Vec<MediaReference>,
    /// True when no tier met quorum and the last one was taken by default.
    pub fallback: bool,
    /// One report per tier that was examined, in priority order.
    pub reports: Vec<TierReport>,
}

pub struct TierSelector {
    prober: Prober,
    policy: QuorumPolicy,
    events: Option<EventBus>,
}

impl TierSelector {
    pub fn new(prober: Prober, policy: QuorumPolicy) -> Self {
        Self {
            prober,
            policy,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn policy(&self) -> QuorumPolicy {
        self.policy
    }

    /// Choose one tier from `candidates`, given highest priority first.
    ///
    /// Only an empty candidate list is an error; fetch and probe failures
    /// just count against the tier concerned.
    pub async fn select(&self, candidates: &[TierCandidate]) -> EngineResult<TierSelection> {
        let last = candidates.len().checked_sub(1).ok_or(EngineError::NoTiers)?;
        let mut reports = Vec::with_capacity(candidates.len());
        let mut last_items = Vec::new();

        for (idx, source) in candidates.iter().enumerate() {
            let tier = source.tier();
            let started = Instant::now();

            let (items, fetch_error) = match source.fetch().await {
                Ok(items) => (items, None),
                Err(e) => {
                    tracing::warn!("tier {tier} could not list items: {e}");
                    (Vec::new(), Some(e.to_string()))
                }
            };

            let sample = draw_sample(&items, self.policy.sample_size);
            let results = self.prober.probe_all(&sample).await;
            let available = results.iter().filter(|r| r.available).count();
            let accepted = self.policy.is_met(sample.len(), available);

            tracing::info!(
                "tier {tier}: {available}/{} sampled items available (need {}), {}",
                sample.len(),
                self.policy.required(sample.len()),
                if accepted { "accepted" } else { "rejected" }
            );
            self.emit(EngineEvent::TierProbed {
                tier,
                sampled: sample.len(),
                available,
                accepted,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });

            reports.push(TierReport {
                tier,
                item_count: items.len(),
                sampled: sample.len(),
                available,
                accepted,
                fetch_error,
            });

            if accepted {
                return Ok(self.finish(tier, items, false, reports));
            }
            if idx == last {
                last_items = items;
            }
        }

        let tier = candidates[last].tier();
        tracing::warn!("no tier met quorum, falling back to {tier}");
        Ok(self.finish(tier, last_items, true, reports))
    }

    fn finish(
        &self,
        tier: Tier,
        items: Vec<MediaReference>,
        fallback: bool,
        reports: Vec<TierReport>,
    ) -> TierSelection {
        self.emit(EngineEvent::TierSelected {
            tier,
            item_count: items.len(),
            fallback,
        });
        TierSelection {
            tier,
            items,
            fallback,
            reports,
        }
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}
