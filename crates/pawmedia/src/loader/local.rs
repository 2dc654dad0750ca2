//! Loader for bundled assets on the local filesystem.

use super::Loader;
use crate::error::LoadError;
use async_trait::async_trait;
use std::path::{Component, PathBuf};

/// Scheme used for locators produced by [`crate::source::LocalDirSource`].
pub const ASSET_SCHEME: &str = "asset://";

/// Resolves `asset://`, `file://` and bare relative locators under a root
/// directory. A locator loads when it names a non-empty regular file that
/// stays inside the root.
#[derive(Debug, Clone)]
pub struct LocalAssetLoader {
    root: PathBuf,
}

impl LocalAssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a locator to a path under the root without touching the disk.
    pub fn resolve_path(&self, locator: &str) -> Result<PathBuf, LoadError> {
        let relative = if let Some(rest) = locator.strip_prefix(ASSET_SCHEME) {
            PathBuf::from(rest)
        } else if locator.starts_with("file://") {
            let url = url::Url::parse(locator)
                .map_err(|e| LoadError::InvalidLocator(format!("{locator}: {e}")))?;
            let path = url
                .to_file_path()
                .map_err(|_| LoadError::InvalidLocator(locator.to_string()))?;
            let root = self.absolute_root()?;
            return path
                .strip_prefix(&root)
                .map(|rel| root.join(rel))
                .map_err(|_| LoadError::OutsideRoot(locator.to_string()));
        } else {
            PathBuf::from(locator)
        };

        if relative.as_os_str().is_empty() {
            return Err(LoadError::InvalidLocator(locator.to_string()));
        }
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(LoadError::OutsideRoot(locator.to_string()));
        }

        Ok(self.root.join(relative))
    }

    /// `file://` URLs are always absolute, so compare them against an
    /// absolute root.
    fn absolute_root(&self) -> Result<PathBuf, LoadError> {
        if self.root.is_absolute() {
            Ok(self.root.clone())
        } else {
            Ok(std::env::current_dir()?.join(&self.root))
        }
    }
}

#[async_trait]
impl Loader for LocalAssetLoader {
    async fn attempt_load(&self, locator: &str) -> Result<(), LoadError> {
        let path = self.resolve_path(locator)?;

        // Symlinks may still point outside the root.
        let root = tokio::fs::canonicalize(&self.root).await?;
        let real = tokio::fs::canonicalize(&path)
            .await
            .map_err(|_| LoadError::NotFound(locator.to_string()))?;
        if !real.starts_with(&root) {
            return Err(LoadError::OutsideRoot(locator.to_string()));
        }

        let meta = tokio::fs::metadata(&real).await?;
        if !meta.is_file() || meta.len() == 0 {
            return Err(LoadError::NotFound(locator.to_string()));
        }
        Ok(())
    }
}
