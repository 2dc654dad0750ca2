//! Engine facade: select a tier, then resolve its items against the backup pool.

use crate::config::{EngineConfig, TierConfig};
use crate::error::EngineResult;
use crate::events::EventBus;
use crate::loader::{
    HttpLoader, LocalAssetLoader, Loader, MemoLoader, RoutingLoader, StaticLoader,
};
use crate::probe::Prober;
use crate::resolver::{ResolutionRun, SubstitutionResolver};
use crate::selector::{TierCandidate, TierSelection, TierSelector};
use crate::source::{LocalDirSource, RemoteCatalogSource, StaticSource};
use crate::types::{MediaReference, Tier};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Everything needed to serve media sequences to consumers.
pub struct MediaEngine {
    config: EngineConfig,
    loader: Arc<dyn Loader>,
    candidates: Vec<TierCandidate>,
    selector: TierSelector,
    resolver: SubstitutionResolver,
    events: EventBus,
}

impl MediaEngine {
    /// Build an engine around an injected loader.
    pub fn new(config: EngineConfig, loader: Arc<dyn Loader>) -> EngineResult<Self> {
        config.validate()?;
        let candidates = build_candidates(&config);
        Ok(Self::with_candidates(config, candidates, loader))
    }

    /// Build an engine with explicit tier sources, e.g. for tests.
    pub fn with_candidates(
        config: EngineConfig,
        candidates: Vec<TierCandidate>,
        loader: Arc<dyn Loader>,
    ) -> Self {
        let events = EventBus::default();
        let (selector, resolver) = components(&config, loader.clone(), &events);

        Self {
            config,
            loader,
            candidates,
            selector,
            resolver,
            events,
        }
    }

    /// Build an engine probing over HTTP and the local asset root.
    pub fn from_config(config: EngineConfig) -> EngineResult<Self> {
        let loader = default_loader(&config);
        Self::new(config, loader)
    }

    /// Build an engine that never touches the network: remote locators are
    /// unavailable and remote catalog tiers are left out.
    pub fn offline(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let loader = offline_loader(&config);
        let candidates = build_candidates(&config)
            .into_iter()
            .filter(|c| c.tier() != Tier::RemoteCatalog)
            .collect();
        Ok(Self::with_candidates(config, candidates, loader))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn selector(&self) -> &TierSelector {
        &self.selector
    }

    pub fn resolver(&self) -> &SubstitutionResolver {
        &self.resolver
    }

    /// Choose the tier serving this request.
    pub async fn select_tier(&self) -> EngineResult<TierSelection> {
        self.selector.select(&self.candidates).await
    }

    /// Select a tier and start resolving its first `display_count` items.
    ///
    /// Selection and the run share one probe memo, so sampled items are not
    /// probed twice. The memo is dropped with the request: a later request
    /// probes everything afresh.
    pub async fn request_sequence(&self) -> EngineResult<(TierSelection, ResolutionRun)> {
        let (selector, resolver) = match self.config.probe.memo_ttl_secs {
            0 => components(&self.config, self.loader.clone(), &self.events),
            ttl => {
                let memo = MemoLoader::new(self.loader.clone(), Duration::from_secs(ttl));
                components(&self.config, Arc::new(memo), &self.events)
            }
        };

        let selection = selector.select(&self.candidates).await?;
        let primary: Vec<MediaReference> = selection
            .items
            .iter()
            .take(self.config.display_count)
            .cloned()
            .collect();
        let pool = self.backup_pool(&selection).await;
        tracing::info!(
            "serving {} items from tier {} with {} backups",
            primary.len(),
            selection.tier,
            pool.len()
        );
        let run = resolver.start(primary, pool);
        Ok((selection, run))
    }

    /// Configured backups, then (optionally) items of the tiers below the
    /// selected one. Duplicates are dropped, first occurrence wins.
    async fn backup_pool(&self, selection: &TierSelection) -> Vec<MediaReference> {
        let mut pool = self.config.backup.clone();

        if self.config.pool_from_lower_tiers {
            let below = self
                .candidates
                .iter()
                .skip_while(|c| c.tier() != selection.tier)
                .skip(1);
            for source in below {
                match source.fetch().await {
                    Ok(items) => pool.extend(items),
                    Err(e) => tracing::warn!("backup tier {} unavailable: {e}", source.tier()),
                }
            }
        }

        let mut seen = HashSet::new();
        pool.retain(|r| seen.insert(r.source_locator().to_string()));
        pool
    }
}

fn components(
    config: &EngineConfig,
    loader: Arc<dyn Loader>,
    events: &EventBus,
) -> (TierSelector, SubstitutionResolver) {
    let prober = Prober::new(loader, Duration::from_millis(config.probe.timeout_ms));
    let selector =
        TierSelector::new(prober.clone(), config.quorum_policy()).with_events(events.clone());
    let resolver =
        SubstitutionResolver::new(prober, config.resolver_config()).with_events(events.clone());
    (selector, resolver)
}

/// Routing loader: HTTP for remote locators, the asset root for the rest.
pub fn default_loader(config: &EngineConfig) -> Arc<dyn Loader> {
    let http = HttpLoader::new(config.probe.timeout_ms)
        .require_media_type(config.probe.require_media_type);
    let local = LocalAssetLoader::new(config.asset_root.clone());
    Arc::new(RoutingLoader::new(http, local))
}

/// Like [`default_loader`], but every remote locator is unavailable.
pub fn offline_loader(config: &EngineConfig) -> Arc<dyn Loader> {
    let local = LocalAssetLoader::new(config.asset_root.clone());
    Arc::new(RoutingLoader::new(StaticLoader::new(), local))
}

/// Tier sources in configured priority order.
pub fn build_candidates(config: &EngineConfig) -> Vec<TierCandidate> {
    config
        .tiers
        .iter()
        .map(|tier| -> TierCandidate {
            match tier {
                TierConfig::Local { dir } => Arc::new(
                    LocalDirSource::new(config.asset_root.clone()).with_subdir(dir),
                ),
                TierConfig::RemoteCatalog {
                    url,
                    limit,
                    alt_text,
                } => {
                    let mut source = RemoteCatalogSource::new(url.clone(), config.probe.timeout_ms)
                        .with_default_alt(alt_text.clone());
                    if let Some(limit) = limit {
                        source = source.with_limit(*limit);
                    }
                    Arc::new(source)
                }
                TierConfig::Static { items } => Arc::new(StaticSource::new(
                    tier.tier(),
                    items.clone(),
                )),
            }
        })
        .collect()
}
