//! Core data types shared by the selector and the resolver.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single displayable media item.
///
/// Immutable once built. `source_locator` is the identity used for
/// de-duplication inside one resolution run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaReference {
    source_locator: String,
    #[serde(default)]
    alt_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
}

impl MediaReference {
    /// Create a reference with no tag.
    pub fn new(source_locator: impl Into<String>, alt_text: impl Into<String>) -> Self {
        Self {
            source_locator: source_locator.into(),
            alt_text: alt_text.into(),
            tag: None,
        }
    }

    /// Return a copy of this reference carrying `tag`.
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..self.clone()
        }
    }

    pub fn source_locator(&self) -> &str {
        &self.source_locator
    }

    pub fn alt_text(&self) -> &str {
        &self.alt_text
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Build the value placed into a slot whose primary failed.
    ///
    /// The primary's tag wins when it has one; otherwise the substitute
    /// keeps its own.
    pub fn substitute_for(&self, primary: &MediaReference) -> Self {
        match &primary.tag {
            Some(tag) => self.with_tag(tag.clone()),
            None => self.clone(),
        }
    }
}

impl From<&str> for MediaReference {
    fn from(locator: &str) -> Self {
        Self::new(locator, "")
    }
}

/// Candidate origins for a batch of media references, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Assets bundled with the application.
    Local,
    /// A remote catalog service returning candidate locators.
    RemoteCatalog,
    /// A small hardcoded set known not to need the network.
    StaticFallback,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::RemoteCatalog => write!(f, "remote_catalog"),
            Self::StaticFallback => write!(f, "static_fallback"),
        }
    }
}

/// Outcome of one availability probe. Failure is data, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub reference: MediaReference,
    pub available: bool,
}

/// Per-slot status carried alongside every emitted sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SlotStatus {
    /// Probe for the primary has not been applied yet.
    Pending,
    /// The primary loaded and occupies its slot.
    Available,
    /// The primary failed and a backup took its slot.
    Substituted { replaced: String },
    /// The primary failed and no unused backup remained.
    Unavailable,
}

impl SlotStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}
