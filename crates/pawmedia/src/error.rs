//! Error types for the resolution engine.
//!
//! Probe and resolution paths never surface these to consumers: a failed
//! load becomes `available = false`, an exhausted pool leaves the original
//! reference in its slot. Errors only escape from configuration and setup.

use std::path::PathBuf;

/// A single load attempt failed.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("HTTP status {status} for {locator}")]
    Status { locator: String, status: u16 },

    #[error("Unexpected content type {content_type:?} for {locator}")]
    ContentType {
        locator: String,
        content_type: Option<String>,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Locator escapes asset root: {0}")]
    OutsideRoot(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A tier source could not produce its item list.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("Catalog request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Catalog returned HTTP {0}")]
    Status(u16),

    #[error("Catalog payload not understood: {0}")]
    Payload(String),

    #[error("Cannot read asset directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration could not be loaded or is inconsistent.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level engine errors.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("No candidate tiers configured")]
    NoTiers,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),
}

pub type EngineResult<T> = Result<T, EngineError>;
