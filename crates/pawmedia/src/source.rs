//! Tier sources: where each tier's candidate items come from.

use crate::error::SourceError;
use crate::loader::local::ASSET_SCHEME;
use crate::types::{MediaReference, Tier};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File extensions treated as displayable media in asset directories.
const MEDIA_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "avif", "mp4", "webm"];

/// Produces the ordered item list for one tier.
#[async_trait]
pub trait TierSource: Send + Sync {
    fn tier(&self) -> Tier;

    async fn fetch(&self) -> Result<Vec<MediaReference>, SourceError>;
}

/// A fixed, injected list of items. Never touches the network.
#[derive(Debug, Clone)]
pub struct StaticSource {
    tier: Tier,
    items: Vec<MediaReference>,
}

impl StaticSource {
    pub fn new(tier: Tier, items: Vec<MediaReference>) -> Self {
        Self { tier, items }
    }
}

#[async_trait]
impl TierSource for StaticSource {
    fn tier(&self) -> Tier {
        self.tier
    }

    async fn fetch(&self) -> Result<Vec<MediaReference>, SourceError> {
        Ok(self.items.clone())
    }
}

/// Media files bundled under the asset root, as `asset://` locators.
///
/// Locators are always relative to the asset root, even when only a
/// subdirectory is scanned, so the local asset loader resolves them as-is.
#[derive(Debug, Clone)]
pub struct LocalDirSource {
    asset_root: PathBuf,
    scan_dir: PathBuf,
}

impl LocalDirSource {
    /// Scan the whole asset root.
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        let asset_root = asset_root.into();
        Self {
            scan_dir: asset_root.clone(),
            asset_root,
        }
    }

    /// Only scan `dir`, resolved against the asset root unless absolute.
    pub fn with_subdir(mut self, dir: impl AsRef<Path>) -> Self {
        self.scan_dir = self.asset_root.join(dir);
        self
    }
}

#[async_trait]
impl TierSource for LocalDirSource {
    fn tier(&self) -> Tier {
        Tier::Local
    }

    async fn fetch(&self) -> Result<Vec<MediaReference>, SourceError> {
        let mut found: Vec<PathBuf> = Vec::new();
        let mut pending = vec![self.scan_dir.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries =
                tokio::fs::read_dir(&dir)
                    .await
                    .map_err(|source| SourceError::Directory {
                        path: dir.clone(),
                        source,
                    })?;
            while let Some(entry) =
                entries
                    .next_entry()
                    .await
                    .map_err(|source| SourceError::Directory {
                        path: dir.clone(),
                        source,
                    })?
            {
                let path = entry.path();
                let Ok(file_type) = entry.file_type().await else {
                    continue;
                };
                if file_type.is_dir() {
                    pending.push(path);
                } else if is_media_file(&path) {
                    match path.strip_prefix(&self.asset_root) {
                        Ok(rel) => found.push(rel.to_path_buf()),
                        Err(_) => tracing::warn!(
                            "skipping {} outside asset root {}",
                            path.display(),
                            self.asset_root.display()
                        ),
                    }
                }
            }
        }

        found.sort();
        Ok(found
            .iter()
            .map(|rel| {
                let locator = format!(
                    "{ASSET_SCHEME}{}",
                    rel.to_string_lossy().replace('\\', "/")
                );
                MediaReference::new(locator, alt_from_path(rel))
            })
            .collect())
    }
}

fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MEDIA_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn alt_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.replace(['-', '_'], " "))
        .unwrap_or_default()
}

/// A remote catalog service returning candidate locators as JSON.
///
/// Accepted payloads:
/// - `["https://…/a.jpg", …]`
/// - `[{"sourceLocator": "…", "altText": "…", "tag": "…"}, …]`
/// - `{"message": [...]}` or `{"items": [...]}` wrapping either form
pub struct RemoteCatalogSource {
    client: reqwest::Client,
    url: String,
    limit: Option<usize>,
    default_alt: String,
}

impl RemoteCatalogSource {
    pub fn new(url: impl Into<String>, timeout_ms: u64) -> Self {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("catalog client setup failed, using reqwest defaults: {e}");
                reqwest::Client::default()
            }
        };
        Self {
            client,
            url: url.into(),
            limit: None,
            default_alt: String::new(),
        }
    }

    /// Keep at most `limit` items from the catalog.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Alt text for catalog entries that are bare locators.
    pub fn with_default_alt(mut self, alt: impl Into<String>) -> Self {
        self.default_alt = alt.into();
        self
    }
}

#[async_trait]
impl TierSource for RemoteCatalogSource {
    fn tier(&self) -> Tier {
        Tier::RemoteCatalog
    }

    async fn fetch(&self) -> Result<Vec<MediaReference>, SourceError> {
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let payload: Value = resp.json().await?;
        let mut items = parse_catalog(&payload, &self.default_alt)?;
        if let Some(limit) = self.limit {
            items.truncate(limit);
        }
        tracing::debug!("catalog {} returned {} items", self.url, items.len());
        Ok(items)
    }
}

/// Parse a catalog payload into references, skipping empty locators.
pub fn parse_catalog(payload: &Value, default_alt: &str) -> Result<Vec<MediaReference>, SourceError> {
    let list = match payload {
        Value::Array(list) => list,
        Value::Object(map) => match map.get("message").or_else(|| map.get("items")) {
            Some(Value::Array(list)) => list,
            _ => {
                return Err(SourceError::Payload(
                    "expected an array under \"message\" or \"items\"".to_string(),
                ))
            }
        },
        _ => return Err(SourceError::Payload("expected an array or object".to_string())),
    };

    let mut items = Vec::with_capacity(list.len());
    for entry in list {
        match entry {
            Value::String(locator) if !locator.trim().is_empty() => {
                items.push(MediaReference::new(locator.trim(), default_alt));
            }
            Value::Object(_) => {
                let reference: MediaReference = serde_json::from_value(entry.clone())
                    .map_err(|e| SourceError::Payload(e.to_string()))?;
                if !reference.source_locator().trim().is_empty() {
                    items.push(reference);
                }
            }
            _ => {}
        }
    }
    Ok(items)
}
