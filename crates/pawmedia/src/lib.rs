//! pawmedia: media resolution engine.
//!
//! Decides which media source tier to trust for a request, then checks
//! every item of the displayed sequence and swaps unloadable ones for
//! unused backups without changing the sequence's order or length.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod loader;
pub mod probe;
pub mod resolver;
pub mod selector;
pub mod source;
pub mod state;
pub mod types;

pub use config::EngineConfig;
pub use engine::MediaEngine;
pub use error::{ConfigError, EngineError, EngineResult, LoadError, SourceError};
pub use events::{EngineEvent, EventBus};
pub use loader::{Loader, StaticLoader};
pub use probe::Prober;
pub use resolver::{ResolutionRun, ResolverConfig, RunOutcome, SubstitutionResolver};
pub use selector::{QuorumPolicy, TierCandidate, TierSelection, TierSelector};
pub use source::TierSource;
pub use state::{Resolution, ResolutionUpdate};
pub use types::*;
