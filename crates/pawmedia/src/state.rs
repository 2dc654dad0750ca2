//! Per-run resolution state: working sequence, used-locator ledger, backup pool.
//!
//! Everything here is owned by exactly one run and mutated only from that
//! run's task, one slot at a time, in ascending slot order.

use crate::types::{MediaReference, SlotStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Every locator occupying a slot or reserved for a pending probe.
#[derive(Debug, Default, Clone)]
pub struct LocatorLedger {
    used: HashSet<String>,
}

impl LocatorLedger {
    /// Seed with the primary sequence so no backup can collide with a
    /// primary that has not been probed yet.
    pub fn seeded(primary: &[MediaReference]) -> Self {
        Self {
            used: primary
                .iter()
                .map(|r| r.source_locator().to_string())
                .collect(),
        }
    }

    pub fn contains(&self, locator: &str) -> bool {
        self.used.contains(locator)
    }

    /// Claim `locator`. Returns false if it was already taken.
    pub fn reserve(&mut self, locator: &str) -> bool {
        self.used.insert(locator.to_string())
    }

}

/// Backup items in their given order. Items are never removed; a cursor
/// marks how far the scan has consumed.
#[derive(Debug, Clone)]
pub struct BackupPool {
    items: Vec<MediaReference>,
    cursor: usize,
    consumed: usize,
}

impl BackupPool {
    pub fn new(items: Vec<MediaReference>) -> Self {
        Self {
            items,
            cursor: 0,
            consumed: 0,
        }
    }

    /// Take the first item, in pool order, whose locator is not yet in the
    /// ledger, and record it there.
    ///
    /// Items skipped because the ledger already holds them can never become
    /// free again within the run, so the cursor only moves forward.
    pub fn reserve(&mut self, ledger: &mut LocatorLedger) -> Option<MediaReference> {
        while let Some(candidate) = self.items.get(self.cursor) {
            self.cursor += 1;
            if ledger.reserve(candidate.source_locator()) {
                self.consumed += 1;
                return Some(candidate.clone());
            }
        }
        None
    }

    /// Items still reachable by [`BackupPool::reserve`].
    pub fn remaining(&self, ledger: &LocatorLedger) -> usize {
        self.items[self.cursor..]
            .iter()
            .map(|r| r.source_locator())
            .filter(|locator| !ledger.contains(locator))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Number of pool items placed into slots so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Total number of backups the run started with.
    pub fn size(&self) -> usize {
        self.items.len()
    }
}

/// A sequence snapshot: what the consumer sees after each settled slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionUpdate {
    pub run_id: Uuid,
    /// Emission counter within the run, starting at 0.
    pub seq: u64,
    /// The slot that just settled; `None` on the final emission.
    pub resolved_slot: Option<usize>,
    pub sequence: Vec<MediaReference>,
    pub slots: Vec<SlotStatus>,
    pub is_final: bool,
}

/// The settled (or, on cancellation, partially settled) result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub run_id: Uuid,
    pub sequence: Vec<MediaReference>,
    pub slots: Vec<SlotStatus>,
    /// Pool items placed into slots.
    pub pool_consumed: usize,
}

impl Resolution {
    pub fn locators(&self) -> Vec<&str> {
        self.sequence.iter().map(|r| r.source_locator()).collect()
    }

    pub fn settled(&self) -> usize {
        self.slots.iter().filter(|s| s.is_settled()).count()
    }

    pub fn substituted(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, SlotStatus::Substituted { .. }))
            .count()
    }

    pub fn unavailable(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, SlotStatus::Unavailable))
            .count()
    }
}

/// The mutable state of one resolution run.
#[derive(Debug, Clone)]
pub struct ResolutionState {
    run_id: Uuid,
    primary: Vec<MediaReference>,
    output: Vec<MediaReference>,
    slots: Vec<SlotStatus>,
    ledger: LocatorLedger,
    pool: BackupPool,
    emitted: u64,
}

impl ResolutionState {
    pub fn new(run_id: Uuid, primary: Vec<MediaReference>, pool: Vec<MediaReference>) -> Self {
        let ledger = LocatorLedger::seeded(&primary);
        Self {
            run_id,
            output: primary.clone(),
            slots: vec![SlotStatus::Pending; primary.len()],
            primary,
            ledger,
            pool: BackupPool::new(pool),
            emitted: 0,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn primary(&self) -> &[MediaReference] {
        &self.primary
    }

    pub fn slot_count(&self) -> usize {
        self.primary.len()
    }

    pub fn ledger(&self) -> &LocatorLedger {
        &self.ledger
    }

    pub fn pool(&self) -> &BackupPool {
        &self.pool
    }

    pub fn slot(&self, slot: usize) -> Option<(&MediaReference, &SlotStatus)> {
        Some((self.output.get(slot)?, self.slots.get(slot)?))
    }

    /// Settle `slot` given its primary's probe outcome.
    ///
    /// A slot settles once; applying it again returns the existing status
    /// untouched so a chosen substitute is never replaced.
    pub fn apply(&mut self, slot: usize, available: bool) -> SlotStatus {
        let Some(current) = self.slots.get(slot) else {
            return SlotStatus::Unavailable;
        };
        if current.is_settled() {
            return current.clone();
        }

        let status = if available {
            SlotStatus::Available
        } else {
            let primary = &self.primary[slot];
            match self.pool.reserve(&mut self.ledger) {
                Some(backup) => {
                    self.output[slot] = backup.substitute_for(primary);
                    SlotStatus::Substituted {
                        replaced: primary.source_locator().to_string(),
                    }
                }
                None => {
                    tracing::warn!(
                        "backup pool exhausted, slot {slot} keeps unavailable {}",
                        primary.source_locator()
                    );
                    SlotStatus::Unavailable
                }
            }
        };

        self.slots[slot] = status.clone();
        status
    }

    /// Snapshot for the consumer, advancing the emission counter.
    pub fn update(&mut self, resolved_slot: Option<usize>, is_final: bool) -> ResolutionUpdate {
        let seq = self.emitted;
        self.emitted += 1;
        ResolutionUpdate {
            run_id: self.run_id,
            seq,
            resolved_slot,
            sequence: self.output.clone(),
            slots: self.slots.clone(),
            is_final,
        }
    }

    /// Consume the state into its result.
    pub fn into_resolution(self) -> Resolution {
        Resolution {
            run_id: self.run_id,
            pool_consumed: self.pool.consumed(),
            sequence: self.output,
            slots: self.slots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(locators: &[&str]) -> Vec<MediaReference> {
        locators.iter().map(|l| MediaReference::from(*l)).collect()
    }

    fn run(primary: &[&str], pool: &[&str], availability: &[bool]) -> Resolution {
        let mut state = ResolutionState::new(Uuid::nil(), refs(primary), refs(pool));
        for (slot, ok) in availability.iter().enumerate() {
            state.apply(slot, *ok);
        }
        state.into_resolution()
    }

    #[test]
    fn test_substitutes_in_slot_order() {
        let r = run(&["a", "b", "c"], &["x", "y"], &[false, true, false]);
        assert_eq!(r.locators(), vec!["x", "b", "y"]);
        assert_eq!(r.pool_consumed, 2);
        assert_eq!(
            r.slots[0],
            SlotStatus::Substituted {
                replaced: "a".to_string()
            }
        );
    }

    #[test]
    fn test_exhausted_pool_keeps_original() {
        let r = run(&["a", "b", "c"], &["x"], &[false, true, false]);
        assert_eq!(r.locators(), vec!["x", "b", "c"]);
        assert_eq!(r.slots[2], SlotStatus::Unavailable);
        assert_eq!(r.unavailable(), 1);
    }

    #[test]
    fn test_all_available_consumes_nothing() {
        let r = run(&["a", "b"], &["x", "y"], &[true, true]);
        assert_eq!(r.locators(), vec!["a", "b"]);
        assert_eq!(r.pool_consumed, 0);
    }

    #[test]
    fn test_pool_item_equal_to_primary_is_skipped() {
        // "b" is a primary; handing it to slot 0 would duplicate slot 1.
        let r = run(&["a", "b"], &["b", "x"], &[false, true]);
        assert_eq!(r.locators(), vec!["x", "b"]);
    }

    #[test]
    fn test_duplicate_pool_items_placed_once() {
        let r = run(&["a", "b", "c"], &["x", "x", "y"], &[false, false, false]);
        assert_eq!(r.locators(), vec!["x", "y", "c"]);
    }

    #[test]
    fn test_settled_slot_not_replaced() {
        let mut state = ResolutionState::new(Uuid::nil(), refs(&["a"]), refs(&["x", "y"]));
        state.apply(0, false);
        let again = state.apply(0, false);
        assert!(matches!(again, SlotStatus::Substituted { .. }));
        let r = state.into_resolution();
        assert_eq!(r.locators(), vec!["x"]);
        assert_eq!(r.pool_consumed, 1);
    }

    #[test]
    fn test_tag_inherited_from_primary() {
        let primary = vec![MediaReference::new("a", "Rex").with_tag("profile")];
        let pool = vec![MediaReference::new("x", "Spare").with_tag("stock")];
        let mut state = ResolutionState::new(Uuid::nil(), primary, pool);
        state.apply(0, false);
        let r = state.into_resolution();
        assert_eq!(r.sequence[0].tag(), Some("profile"));
        assert_eq!(r.sequence[0].alt_text(), "Spare");
    }

    #[test]
    fn test_ledger_covers_every_slot() {
        let mut state = ResolutionState::new(Uuid::nil(), refs(&["a", "b"]), refs(&["x", "y"]));
        assert!(state.ledger().contains("a") && state.ledger().contains("b"));
        assert!(!state.ledger().contains("x"));
        state.apply(0, false);
        assert!(state.ledger().contains("a"));
        assert!(state.ledger().contains("x"));
        assert!(!state.ledger().contains("y"));
        assert_eq!(state.pool().remaining(state.ledger()), 1);
    }

    #[test]
    fn test_update_counts_emissions() {
        let mut state = ResolutionState::new(Uuid::nil(), refs(&["a"]), vec![]);
        assert_eq!(state.update(None, false).seq, 0);
        state.apply(0, true);
        let u = state.update(Some(0), false);
        assert_eq!(u.seq, 1);
        assert_eq!(u.slots, vec![SlotStatus::Available]);
        assert!(state.update(None, true).is_final);
    }

    #[test]
    fn test_out_of_range_slot_ignored() {
        let mut state = ResolutionState::new(Uuid::nil(), refs(&["a"]), refs(&["x"]));
        state.apply(5, false);
        assert_eq!(state.pool().consumed(), 0);
    }
}
