//! Loaders: the injected "can this locator be loaded?" capability.
//!
//! The engine never talks to a transport directly. Every probe goes through
//! a [`Loader`], so tests and offline tools can swap the network out.

pub mod http;
pub mod local;
pub mod memo;

pub use http::HttpLoader;
pub use local::LocalAssetLoader;
pub use memo::MemoLoader;

use crate::error::LoadError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One load attempt against a locator. `Ok(())` means the resource is loadable.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn attempt_load(&self, locator: &str) -> Result<(), LoadError>;
}

#[async_trait]
impl<L: Loader + ?Sized> Loader for Arc<L> {
    async fn attempt_load(&self, locator: &str) -> Result<(), LoadError> {
        (**self).attempt_load(locator).await
    }
}

/// Dispatches by scheme: `http(s)://` goes to the remote loader, anything
/// else is treated as a bundled asset.
pub struct RoutingLoader<R = HttpLoader> {
    remote: R,
    local: LocalAssetLoader,
}

impl<R: Loader> RoutingLoader<R> {
    pub fn new(remote: R, local: LocalAssetLoader) -> Self {
        Self { remote, local }
    }
}

#[async_trait]
impl<R: Loader> Loader for RoutingLoader<R> {
    async fn attempt_load(&self, locator: &str) -> Result<(), LoadError> {
        if is_remote(locator) {
            self.remote.attempt_load(locator).await
        } else {
            self.local.attempt_load(locator).await
        }
    }
}

/// True for locators that need the network.
pub fn is_remote(locator: &str) -> bool {
    let lower = locator.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// A loader with a fixed answer per locator.
///
/// Counts every attempt and can delay individual locators, which makes it
/// the workhorse for ordering and cancellation tests and for `--offline` runs.
#[derive(Default)]
pub struct StaticLoader {
    answers: HashMap<String, bool>,
    delays: HashMap<String, Duration>,
    default_available: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    attempted: Mutex<Vec<String>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a loader where each listed locator has the given availability.
    pub fn from_answers<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let mut loader = Self::new();
        for (locator, ok) in answers {
            loader.answers.insert(locator.into(), ok);
        }
        loader
    }

    pub fn available(mut self, locator: impl Into<String>) -> Self {
        self.answers.insert(locator.into(), true);
        self
    }

    pub fn unavailable(mut self, locator: impl Into<String>) -> Self {
        self.answers.insert(locator.into(), false);
        self
    }

    /// Answer for locators not listed explicitly (default: unavailable).
    pub fn default_available(mut self, ok: bool) -> Self {
        self.default_available = ok;
        self
    }

    pub fn with_delay(mut self, locator: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(locator.into(), delay);
        self
    }

    /// Total number of attempts made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of attempts that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Locators attempted, in the order the attempts started.
    pub fn attempted(&self) -> Vec<String> {
        self.attempted
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Loader for StaticLoader {
    async fn attempt_load(&self, locator: &str) -> Result<(), LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if let Ok(mut log) = self.attempted.lock() {
            log.push(locator.to_string());
        }

        if let Some(delay) = self.delays.get(locator) {
            tokio::time::sleep(*delay).await;
        }

        let ok = self
            .answers
            .get(locator)
            .copied()
            .unwrap_or(self.default_available);
        if ok {
            Ok(())
        } else {
            Err(LoadError::NotFound(locator.to_string()))
        }
    }
}

/// Decrements the in-flight counter when an attempt ends or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
