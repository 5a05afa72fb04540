//! msav core library: domain types, malware-name normalization, configuration.
//!
//! Public API surface:
//! - [`types`]: verdicts, session metadata, transport candidates
//! - [`naming`]: [`MalwareNaming`] and the default ClamAV rules
//! - [`config`]: `~/.msav/config.yaml` loading and candidate resolution
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod naming;
pub mod types;

pub use config::AntivirusConfig;
pub use error::ConfigError;
pub use naming::{normalize_malware_name, ClamavNaming, MalwareNaming};
pub use types::{Candidate, EngineVersion, SessionState, Verdict};
