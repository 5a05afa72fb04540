//! Domain types shared by the ClamAV client and the `msav` command.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Classified outcome of scanning one file.
///
/// Produced fresh per scan call. `Infected` is a successful scan outcome, not
/// an error; everything except `Clean` and `Infected` is a per-file failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Clean,
    Infected { name: String },
    ReadError,
    /// Reserved for size-limit enforcement; never produced today.
    FileTooLarge,
    ConnectionLost,
    ScannerError,
}

impl Verdict {
    pub fn infected(name: impl Into<String>) -> Self {
        Verdict::Infected { name: name.into() }
    }

    /// Normalized malware name, only for `Infected`.
    pub fn name(&self) -> Option<&str> {
        match self {
            Verdict::Infected { name } => Some(name),
            _ => None,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Verdict::Clean)
    }

    pub fn is_infected(&self) -> bool {
        matches!(self, Verdict::Infected { .. })
    }

    /// Whether a directory walk should move on to the next file.
    ///
    /// Local per-file problems are skipped; daemon-side failures stop the walk.
    pub fn should_continue(&self) -> bool {
        !matches!(self, Verdict::ConnectionLost | Verdict::ScannerError)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Clean => write!(f, "clean"),
            Verdict::Infected { name } => write!(f, "detected {name}"),
            Verdict::ReadError => write!(f, "error reading file"),
            Verdict::FileTooLarge => write!(f, "file too large to scan"),
            Verdict::ConnectionLost => write!(f, "lost connection to scanning engine"),
            Verdict::ScannerError => write!(f, "error scanning the file"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session metadata
// ---------------------------------------------------------------------------

/// Engine and signature-database versions reported by the daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineVersion {
    pub engine: String,
    pub database: String,
}

impl EngineVersion {
    /// Both parts are present.
    pub fn is_complete(&self) -> bool {
        !self.engine.is_empty() && !self.database.is_empty()
    }
}

/// Negotiation state of the single daemon session.
///
/// `is_ready == true` implies both version strings came from a VERSION
/// exchange; they may still be empty if the daemon reply was unparsable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub is_ready: bool,
    pub engine_version: String,
    pub database_version: String,
}

impl SessionState {
    pub fn ready(version: EngineVersion) -> Self {
        Self {
            is_ready: true,
            engine_version: version.engine,
            database_version: version.database,
        }
    }

    pub fn version(&self) -> EngineVersion {
        EngineVersion {
            engine: self.engine_version.clone(),
            database: self.database_version.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport candidates
// ---------------------------------------------------------------------------

/// One way of reaching the daemon, tried in list order during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Candidate {
    /// Local domain socket path.
    Local(PathBuf),
    Tcp(SocketAddr),
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Candidate::Local(path) => write!(f, "unix:{}", path.display()),
            Candidate::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}
