//! Availability probe: the shared primitive under the selector and resolver.
//!
//! A probe is one attempt, bounded by a timeout, that never fails: transport
//! errors and timeouts both come back as `available = false`.

use crate::loader::Loader;
use crate::types::{MediaReference, ProbeResult};
use std::sync::Arc;
use std::time::Duration;

/// Default upper bound on a single probe.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 8000;

/// Probes references through an injected [`Loader`].
#[derive(Clone)]
pub struct Prober {
    loader: Arc<dyn Loader>,
    timeout: Duration,
}

impl Prober {
    pub fn new(loader: Arc<dyn Loader>, timeout: Duration) -> Self {
        Self { loader, timeout }
    }

    /// Attempt to load `reference` once.
    pub async fn probe(&self, reference: &MediaReference) -> ProbeResult {
        let locator = reference.source_locator();
        let available =
            match tokio::time::timeout(self.timeout, self.loader.attempt_load(locator)).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    tracing::debug!("probe failed for {locator}: {e}");
                    false
                }
                Err(_) => {
                    tracing::debug!(
                        "probe timed out for {locator} after {}ms",
                        self.timeout.as_millis()
                    );
                    false
                }
            };

        ProbeResult {
            reference: reference.clone(),
            available,
        }
    }

    /// Probe every reference concurrently. Output order matches input order.
    pub async fn probe_all(&self, references: &[MediaReference]) -> Vec<ProbeResult> {
        futures::future::join_all(references.iter().map(|r| self.probe(r))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::StaticLoader;

    #[tokio::test]
    async fn test_failure_is_data() {
        let loader = Arc::new(StaticLoader::new().available("ok.jpg"));
        let prober = Prober::new(loader, Duration::from_secs(1));

        let ok = prober.probe(&MediaReference::from("ok.jpg")).await;
        let bad = prober.probe(&MediaReference::from("bad.jpg")).await;
        assert!(ok.available);
        assert!(!bad.available);
        assert_eq!(bad.reference.source_locator(), "bad.jpg");
    }

    #[tokio::test]
    async fn test_timeout_maps_to_unavailable() {
        let loader = Arc::new(
            StaticLoader::new()
                .available("slow.jpg")
                .with_delay("slow.jpg", Duration::from_secs(5)),
        );
        let prober = Prober::new(loader, Duration::from_millis(20));

        let result = prober.probe(&MediaReference::from("slow.jpg")).await;
        assert!(!result.available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_all_is_concurrent_and_ordered() {
        let loader = Arc::new(
            StaticLoader::new()
                .available("a")
                .unavailable("b")
                .available("c")
                .with_delay("a", Duration::from_millis(100))
                .with_delay("b", Duration::from_millis(100))
                .with_delay("c", Duration::from_millis(100)),
        );
        let prober = Prober::new(loader.clone(), Duration::from_secs(2));
        let refs: Vec<MediaReference> = ["a", "b", "c"].into_iter().map(Into::into).collect();

        let results = prober.probe_all(&refs).await;
        assert_eq!(loader.peak_in_flight(), 3);

        let flags: Vec<bool> = results.iter().map(|r| r.available).collect();
        assert_eq!(flags, vec![true, false, true]);
        assert_eq!(loader.calls(), 3);
    }

    #[tokio::test]
    async fn test_no_retry_on_failure() {
        let loader = Arc::new(StaticLoader::new().unavailable("bad"));
        let prober = Prober::new(loader.clone(), Duration::from_secs(1));
        prober.probe(&MediaReference::from("bad")).await;
        assert_eq!(loader.calls(), 1);
    }
}
