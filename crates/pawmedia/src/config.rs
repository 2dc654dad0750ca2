//! Configuration loading and resolution.
//!
//! Lookup order for the config file: explicit path, `PAWMEDIA_CONFIG`,
//! `./pawmedia.toml`, `~/.pawmedia/config.toml`. With none present the
//! built-in defaults apply. Numeric knobs can then be overridden from the
//! environment.

use crate::error::ConfigError;
use crate::probe::DEFAULT_PROBE_TIMEOUT_MS;
use crate::resolver::{ResolverConfig, DEFAULT_PROBE_CONCURRENCY};
use crate::selector::{QuorumPolicy, DEFAULT_QUORUM, DEFAULT_SAMPLE_SIZE};
use crate::types::{MediaReference, Tier};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "PAWMEDIA_CONFIG";
const LOCAL_CONFIG: &str = "pawmedia.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_ms: u64,
    pub concurrency: usize,
    /// Reuse probe outcomes within one request (tier sample plus its run)
    /// for at most this long. Nothing carries over to the next request.
    /// 0 disables memoization.
    pub memo_ttl_secs: u64,
    /// Reject HTTP responses that are not `image/*` or `video/*`.
    pub require_media_type: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            concurrency: DEFAULT_PROBE_CONCURRENCY,
            memo_ttl_secs: 300,
            require_media_type: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuorumConfig {
    pub sample_size: usize,
    pub min_available: usize,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            min_available: DEFAULT_QUORUM,
        }
    }
}

/// One candidate tier, in the order it appears in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TierConfig {
    /// Media files under a directory, relative to `asset_root` when relative.
    Local { dir: PathBuf },
    /// A JSON catalog endpoint.
    RemoteCatalog {
        url: String,
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        alt_text: String,
    },
    /// A fixed set of items.
    Static {
        #[serde(default)]
        items: Vec<MediaReference>,
    },
}

impl TierConfig {
    pub fn tier(&self) -> Tier {
        match self {
            Self::Local { .. } => Tier::Local,
            Self::RemoteCatalog { .. } => Tier::RemoteCatalog,
            Self::Static { .. } => Tier::StaticFallback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory for `asset://` locators.
    pub asset_root: PathBuf,
    /// Maximum number of items taken from the selected tier.
    pub display_count: usize,
    /// Also use items of tiers ranked below the selected one as backups.
    pub pool_from_lower_tiers: bool,
    pub probe: ProbeConfig,
    pub quorum: QuorumConfig,
    pub tiers: Vec<TierConfig>,
    pub backup: Vec<MediaReference>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            display_count: 12,
            pool_from_lower_tiers: false,
            probe: ProbeConfig::default(),
            quorum: QuorumConfig::default(),
            tiers: vec![
                TierConfig::Local {
                    dir: PathBuf::from("."),
                },
                TierConfig::Static { items: Vec::new() },
            ],
            backup: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load, apply environment overrides and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match resolve_config_path(explicit) {
            Some(path) => {
                tracing::debug!("loading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                tracing::debug!("no config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply_env_overrides(&mut self) {
        self.probe.timeout_ms = read_env_u64("PAWMEDIA_PROBE_TIMEOUT_MS", self.probe.timeout_ms);
        self.probe.concurrency =
            read_env_usize("PAWMEDIA_PROBE_CONCURRENCY", self.probe.concurrency);
        self.quorum.sample_size = read_env_usize("PAWMEDIA_SAMPLE_SIZE", self.quorum.sample_size);
        self.quorum.min_available = read_env_usize("PAWMEDIA_QUORUM", self.quorum.min_available);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::Invalid("at least one tier is required".into()));
        }
        if self.quorum.sample_size == 0 {
            return Err(ConfigError::Invalid("quorum.sample_size must be >= 1".into()));
        }
        if self.quorum.min_available == 0 || self.quorum.min_available > self.quorum.sample_size {
            return Err(ConfigError::Invalid(format!(
                "quorum.min_available must be between 1 and {}",
                self.quorum.sample_size
            )));
        }
        if self.probe.timeout_ms == 0 {
            return Err(ConfigError::Invalid("probe.timeout_ms must be > 0".into()));
        }
        if self.probe.concurrency == 0 {
            return Err(ConfigError::Invalid("probe.concurrency must be >= 1".into()));
        }
        for tier in &self.tiers {
            if let TierConfig::RemoteCatalog { url, .. } = tier {
                url::Url::parse(url)
                    .map_err(|e| ConfigError::Invalid(format!("catalog url {url:?}: {e}")))?;
            }
        }
        Ok(())
    }

    pub fn quorum_policy(&self) -> QuorumPolicy {
        QuorumPolicy {
            sample_size: self.quorum.sample_size,
            min_available: self.quorum.min_available,
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            probe_concurrency: self.probe.concurrency,
            ..ResolverConfig::default()
        }
    }
}

/// Find the config file to use, if any.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        if !env_path.trim().is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let cwd_config = PathBuf::from(LOCAL_CONFIG);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    let home_config = dirs::home_dir()?.join(".pawmedia").join("config.toml");
    home_config.exists().then_some(home_config)
}

fn read_env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn read_env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
asset_root = "/srv/pawmatch/assets"
display_count = 6
pool_from_lower_tiers = true

[probe]
timeout_ms = 2500
require_media_type = true

[quorum]
sample_size = 4
min_available = 3

[[tiers]]
kind = "local"
dir = "dogs"

[[tiers]]
kind = "remote_catalog"
url = "https://dog.ceo/api/breeds/image/random/20"
limit = 20
alt_text = "Dog photo"

[[tiers]]
kind = "static"
items = [
    { sourceLocator = "asset://fallback/rex.jpg", altText = "Rex" },
]

[[backup]]
sourceLocator = "asset://fallback/spare.jpg"
altText = "Spare pup"
tag = "spare"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.display_count, 6);
        assert_eq!(config.probe.timeout_ms, 2500);
        assert_eq!(config.probe.concurrency, DEFAULT_PROBE_CONCURRENCY);
        assert_eq!(config.quorum_policy().sample_size, 4);
        let tiers: Vec<Tier> = config.tiers.iter().map(TierConfig::tier).collect();
        assert_eq!(
            tiers,
            vec![Tier::Local, Tier::RemoteCatalog, Tier::StaticFallback]
        );
        assert_eq!(config.backup[0].tag(), Some("spare"));
        assert_eq!(config.asset_root, PathBuf::from("/srv/pawmatch/assets"));
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_errors() {
        let mut config = EngineConfig::default();
        config.quorum.min_available = 5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.tiers.clear();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.tiers.push(TierConfig::RemoteCatalog {
            url: "not a url".into(),
            limit: None,
            alt_text: String::new(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            EngineConfig::from_toml_str("display_count = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_explicit_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "display_count = 3\n").unwrap();

        assert_eq!(resolve_config_path(Some(&path)), Some(path.clone()));
        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.display_count, 3);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(matches!(
            EngineConfig::load(Some(Path::new("/no/such/pawmedia.toml"))),
            Err(ConfigError::Read { .. })
        ));
    }
}
