//! Probe memoization: remember recent load outcomes per locator.
//!
//! The probe primitive never caches. Callers that expect to probe the same
//! locator repeatedly within a short window (a tier sample followed by a
//! resolution run over the same items, say) wrap their loader in a
//! [`MemoLoader`].
//!
//! ## Eviction
//!
//! Entries expire after `ttl`. When the memo exceeds `max_entries`, the
//! oldest entry is evicted first.

use super::Loader;
use crate::error::LoadError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Default maximum number of remembered locators.
const DEFAULT_MAX_ENTRIES: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct MemoEntry {
    available: bool,
    recorded_at: Instant,
}

impl MemoEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.recorded_at.elapsed() > ttl
    }
}

/// A loader decorator that answers repeated attempts from memory.
pub struct MemoLoader<L> {
    inner: L,
    entries: DashMap<String, MemoEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl<L: Loader> MemoLoader<L> {
    pub fn new(inner: L, ttl: Duration) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            ttl,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    fn lookup(&self, locator: &str) -> Option<bool> {
        let entry = *self.entries.get(locator)?;
        if entry.is_expired(self.ttl) {
            self.entries.remove(locator);
            return None;
        }
        Some(entry.available)
    }

    fn record(&self, locator: &str, available: bool) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(locator) {
            self.evict_oldest();
        }
        self.entries.insert(
            locator.to_string(),
            MemoEntry {
                available,
                recorded_at: Instant::now(),
            },
        );
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().recorded_at)
            .map(|e| e.key().clone());
        if let Some(locator) = oldest {
            tracing::debug!("evicting memoized probe: {locator}");
            self.entries.remove(&locator);
        }
    }
}

#[async_trait]
impl<L: Loader> Loader for MemoLoader<L> {
    async fn attempt_load(&self, locator: &str) -> Result<(), LoadError> {
        if let Some(available) = self.lookup(locator) {
            return if available {
                Ok(())
            } else {
                Err(LoadError::NotFound(format!("{locator} (memoized failure)")))
            };
        }

        let result = self.inner.attempt_load(locator).await;
        self.record(locator, result.is_ok());
        result
    }
}
