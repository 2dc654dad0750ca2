//! Sequence substitution resolver.
//!
//! Given an ordered primary sequence and a backup pool, a run probes every
//! primary and replaces failures in place with unused backups. The output
//! always has the primary's length and slot order.
//!
//! ## Ordering
//!
//! Primary probes are issued concurrently (up to `probe_concurrency` at a
//! time) but their results are applied strictly in slot order, so which
//! backup lands in which slot depends only on the primary order, never on
//! network latency.
//!
//! ## Cancellation
//!
//! Each run has its own [`CancellationToken`]. It is checked before every
//! state mutation and raced against every probe and every send. Once it
//! fires, nothing more is applied or emitted and the run state is dropped
//! with the task. Dropping the [`ResolutionRun`] handle, or the stream made
//! from it, cancels the run.

use crate::events::{EngineEvent, EventBus};
use crate::probe::Prober;
use crate::state::{Resolution, ResolutionState, ResolutionUpdate};
use crate::types::{MediaReference, SlotStatus};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

/// Default number of primary probes in flight per run.
pub const DEFAULT_PROBE_CONCURRENCY: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub probe_concurrency: usize,
    /// Updates buffered for a slow consumer before the run waits on it.
    pub update_buffer: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            probe_concurrency: DEFAULT_PROBE_CONCURRENCY,
            update_buffer: 16,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// All slots settled and the final sequence was emitted.
    Completed(Resolution),
    /// The consumer went away first. Holds whatever had settled by then.
    Cancelled(Resolution),
}

impl RunOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub fn resolution(&self) -> &Resolution {
        match self {
            Self::Completed(r) | Self::Cancelled(r) => r,
        }
    }

    pub fn into_resolution(self) -> Resolution {
        match self {
            Self::Completed(r) | Self::Cancelled(r) => r,
        }
    }
}

/// Starts resolution runs. Cheap to clone; holds no per-run state.
#[derive(Clone)]
pub struct SubstitutionResolver {
    prober: Prober,
    config: ResolverConfig,
    events: Option<EventBus>,
}

impl SubstitutionResolver {
    pub fn new(prober: Prober, config: ResolverConfig) -> Self {
        Self {
            prober,
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Start a run on the current tokio runtime.
    pub fn start(&self, primary: Vec<MediaReference>, pool: Vec<MediaReference>) -> ResolutionRun {
        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.config.update_buffer.max(1));
        let state = ResolutionState::new(run_id, primary.clone(), pool);

        let driver = RunDriver {
            prober: self.prober.clone(),
            concurrency: self.config.probe_concurrency.max(1),
            events: self.events.clone(),
            cancel: cancel.clone(),
            tx,
        };
        let task = tokio::spawn(driver.drive(state));

        ResolutionRun {
            run_id,
            primary,
            updates: rx,
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
            task,
        }
    }

    /// Run to completion and return the final sequence.
    pub async fn resolve(
        &self,
        primary: Vec<MediaReference>,
        pool: Vec<MediaReference>,
    ) -> Resolution {
        self.start(primary, pool).finish().await.into_resolution()
    }
}

/// Handle to one in-flight run.
pub struct ResolutionRun {
    run_id: Uuid,
    primary: Vec<MediaReference>,
    updates: mpsc::Receiver<ResolutionUpdate>,
    cancel: CancellationToken,
    _guard: DropGuard,
    task: JoinHandle<RunOutcome>,
}

impl ResolutionRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Stop the run. Idempotent. No update is delivered after this returns.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Next update, or `None` once the run finished or was cancelled.
    pub async fn next_update(&mut self) -> Option<ResolutionUpdate> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            update = self.updates.recv() => update,
        }
    }

    /// Hand every remaining update to `consumer`, then wait for the outcome.
    pub async fn deliver<F>(mut self, mut consumer: F) -> RunOutcome
    where
        F: FnMut(ResolutionUpdate),
    {
        while let Some(update) = self.next_update().await {
            consumer(update);
        }
        self.join().await
    }

    /// Drain remaining updates and wait for the outcome.
    pub async fn finish(self) -> RunOutcome {
        self.deliver(|_| {}).await
    }

    /// Turn the run into a stream of updates. Dropping the stream cancels it.
    pub fn into_stream(self) -> RunStream {
        RunStream {
            inner: ReceiverStream::new(self.updates),
            cancel: self.cancel,
            _guard: self._guard,
        }
    }

    async fn join(self) -> RunOutcome {
        let Self {
            run_id,
            primary,
            task,
            ..
        } = self;
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("resolution run {run_id} task failed: {e}");
                let slots = vec![SlotStatus::Pending; primary.len()];
                RunOutcome::Cancelled(Resolution {
                    run_id,
                    sequence: primary,
                    slots,
                    pool_consumed: 0,
                })
            }
        }
    }
}

/// Updates of one run as a [`Stream`].
pub struct RunStream {
    inner: ReceiverStream<ResolutionUpdate>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl RunStream {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Stream for RunStream {
    type Item = ResolutionUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

struct RunDriver {
    prober: Prober,
    concurrency: usize,
    events: Option<EventBus>,
    cancel: CancellationToken,
    tx: mpsc::Sender<ResolutionUpdate>,
}

impl RunDriver {
    async fn drive(self, mut state: ResolutionState) -> RunOutcome {
        let started = Instant::now();
        let run_id = state.run_id();
        tracing::debug!(
            "run {run_id} started: {} slots, {} backups",
            state.slot_count(),
            state.pool().size()
        );
        self.emit(EngineEvent::RunStarted {
            run_id,
            slots: state.slot_count(),
            pool: state.pool().size(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        });

        let prober = self.prober.clone();
        let probes = futures::stream::iter(state.primary().to_vec())
            .map(move |reference| {
                let prober = prober.clone();
                async move { prober.probe(&reference).await }
            })
            .buffered(self.concurrency);
        tokio::pin!(probes);

        let mut slot = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.cancelled(state, started),
                next = probes.next() => next,
            };
            let Some(result) = next else { break };
            if self.cancel.is_cancelled() {
                return self.cancelled(state, started);
            }

            let status = state.apply(slot, result.available);
            if let Some((placed, _)) = state.slot(slot) {
                tracing::debug!(
                    "run {run_id} slot {slot}: {} -> {} ({status:?})",
                    result.reference.source_locator(),
                    placed.source_locator()
                );
                self.emit(EngineEvent::SlotResolved {
                    run_id,
                    slot,
                    locator: placed.source_locator().to_string(),
                    substituted: matches!(status, SlotStatus::Substituted { .. }),
                    available: !matches!(status, SlotStatus::Unavailable),
                });
            }

            let update = state.update(Some(slot), false);
            if !self.send(update).await {
                return self.cancelled(state, started);
            }
            slot += 1;
        }

        let update = state.update(None, true);
        if !self.send(update).await {
            return self.cancelled(state, started);
        }

        let resolution = state.into_resolution();
        tracing::info!(
            "run {run_id} resolved {} slots: {} substituted, {} unavailable",
            resolution.sequence.len(),
            resolution.substituted(),
            resolution.unavailable()
        );
        self.emit(EngineEvent::RunCompleted {
            run_id,
            substituted: resolution.substituted(),
            unavailable: resolution.unavailable(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        RunOutcome::Completed(resolution)
    }

    /// Deliver an update unless the run is cancelled first. A closed
    /// receiver means the consumer is gone, which also cancels the run.
    async fn send(&self, update: ResolutionUpdate) -> bool {
        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return false,
            sent = self.tx.send(update) => sent,
        };
        if sent.is_err() {
            self.cancel.cancel();
            return false;
        }
        true
    }

    fn cancelled(&self, state: ResolutionState, started: Instant) -> RunOutcome {
        let resolution = state.into_resolution();
        tracing::info!(
            "run {} cancelled after {} of {} slots",
            resolution.run_id,
            resolution.settled(),
            resolution.sequence.len()
        );
        self.emit(EngineEvent::RunCancelled {
            run_id: resolution.run_id,
            settled: resolution.settled(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        RunOutcome::Cancelled(resolution)
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::StaticLoader;
    use std::sync::Arc;
    use std::time::Duration;

    fn refs(locators: &[&str]) -> Vec<MediaReference> {
        locators.iter().map(|l| MediaReference::from(*l)).collect()
    }

    fn resolver(loader: Arc<StaticLoader>) -> SubstitutionResolver {
        SubstitutionResolver::new(
            Prober::new(loader, Duration::from_secs(2)),
            ResolverConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_example_sequence() {
        let loader = Arc::new(StaticLoader::new().available("b"));
        let r = resolver(loader)
            .resolve(refs(&["a", "b", "c"]), refs(&["x", "y"]))
            .await;
        assert_eq!(r.locators(), vec!["x", "b", "y"]);
    }

    #[tokio::test]
    async fn test_example_sequence_short_pool() {
        let loader = Arc::new(StaticLoader::new().available("b"));
        let r = resolver(loader)
            .resolve(refs(&["a", "b", "c"]), refs(&["x"]))
            .await;
        assert_eq!(r.locators(), vec!["x", "b", "c"]);
        assert_eq!(r.slots[2], SlotStatus::Unavailable);
    }

    #[tokio::test]
    async fn test_emits_per_slot_then_final() {
        let loader = Arc::new(StaticLoader::new().available("b"));
        let run = resolver(loader).start(refs(&["a", "b", "c"]), refs(&["x", "y"]));

        let mut updates = Vec::new();
        let outcome = run.deliver(|u| updates.push(u)).await;

        assert!(!outcome.is_cancelled());
        assert_eq!(updates.len(), 4);
        let slots: Vec<Option<usize>> = updates.iter().map(|u| u.resolved_slot).collect();
        assert_eq!(slots, vec![Some(0), Some(1), Some(2), None]);
        assert!(updates.iter().all(|u| u.sequence.len() == 3));
        assert!(updates[3].is_final);
        assert_eq!(updates[0].slots[1], SlotStatus::Pending);
        let seqs: Vec<u64> = updates.iter().map(|u| u.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_assignment_independent_of_latency() {
        // Slot 0 answers last, yet still gets the first backup.
        let loader = Arc::new(
            StaticLoader::new()
                .with_delay("a", Duration::from_millis(150))
                .with_delay("b", Duration::from_millis(10)),
        );
        let r = resolver(loader)
            .resolve(refs(&["a", "b"]), refs(&["x", "y"]))
            .await;
        assert_eq!(r.locators(), vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_empty_primary_emits_final_only() {
        let loader = Arc::new(StaticLoader::new());
        let mut run = resolver(loader.clone()).start(vec![], refs(&["x"]));

        let update = run.next_update().await.unwrap();
        assert!(update.is_final);
        assert!(update.sequence.is_empty());
        assert!(run.next_update().await.is_none());
        assert_eq!(loader.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_emissions_and_pool_use() {
        let loader = Arc::new(
            StaticLoader::new()
                .unavailable("a")
                .unavailable("b")
                .with_delay("b", Duration::from_millis(200)),
        );
        let mut run = resolver(loader).start(refs(&["a", "b"]), refs(&["x", "y"]));

        let first = run.next_update().await.unwrap();
        assert_eq!(first.resolved_slot, Some(0));
        run.cancel();
        assert!(run.next_update().await.is_none());

        // Let slot 1's probe complete; its result must be dropped.
        tokio::time::sleep(Duration::from_millis(300)).await;
        match run.finish().await {
            RunOutcome::Cancelled(r) => {
                assert_eq!(r.pool_consumed, 1);
                assert_eq!(r.slots[1], SlotStatus::Pending);
                assert_eq!(r.locators(), vec!["x", "b"]);
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels_run() {
        let loader = Arc::new(
            StaticLoader::new()
                .available("a")
                .with_delay("a", Duration::from_millis(200)),
        );
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let run = resolver(loader)
            .with_events(bus)
            .start(refs(&["a"]), vec![]);
        drop(run);

        let cancelled = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                match events.recv().await {
                    Ok(EngineEvent::RunCancelled { settled, .. }) => return Some(settled),
                    Ok(EngineEvent::RunCompleted { .. }) | Err(_) => return None,
                    Ok(_) => continue,
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(cancelled, Some(0));
    }

    #[tokio::test]
    async fn test_stream_yields_updates() {
        let loader = Arc::new(StaticLoader::new().default_available(true));
        let stream = resolver(loader).start(refs(&["a", "b"]), vec![]).into_stream();

        let updates: Vec<ResolutionUpdate> = stream.collect().await;
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[2].sequence, refs(&["a", "b"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_limit_respected() {
        let mut loader = StaticLoader::new().default_available(true);
        for l in ["a", "b", "c", "d"] {
            loader = loader.with_delay(l, Duration::from_millis(100));
        }
        let loader = Arc::new(loader);
        let resolver = SubstitutionResolver::new(
            Prober::new(loader.clone(), Duration::from_secs(2)),
            ResolverConfig {
                probe_concurrency: 2,
                update_buffer: 4,
            },
        );

        let resolution = resolver.resolve(refs(&["a", "b", "c", "d"]), vec![]).await;
        assert_eq!(resolution.locators(), vec!["a", "b", "c", "d"]);
        assert_eq!(loader.calls(), 4);
        assert_eq!(loader.peak_in_flight(), 2);
    }
}
