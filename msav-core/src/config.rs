//! Antivirus configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.msav/
//!   config.yaml      clamav_socket: "/run/clamav/clamd.ctl"
//! ```
//!
//! # API pattern
//!
//! - `load_at(home: &Path)`: explicit home; used in tests with `TempDir`
//! - `load()`: derives home from `dirs::home_dir()`, delegates to `load_at`

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::Candidate;

/// Local socket path clamd listens on in most distributions.
pub const DEFAULT_LOCAL_SOCKET: &str = "/run/clamav/clamd.ctl";

/// Loopback address of clamd's `TCPSocket` default.
pub const DEFAULT_TCP_SOCKET: &str = "127.0.0.1:3310";

pub const CONFIG_DIR: &str = ".msav";
pub const CONFIG_FILE: &str = "config.yaml";

/// Settings read once at startup. Guest programs never change them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntivirusConfig {
    /// Daemon socket as configured in `clamd.conf`: a local socket path or
    /// `host:port`. Empty probes the default sockets.
    pub clamav_socket: String,
}

/// `<home>/.msav/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(CONFIG_DIR).join(CONFIG_FILE)
}

impl AntivirusConfig {
    /// Load `<home>/.msav/config.yaml`; a missing file yields the defaults.
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        let path = config_path_at(home);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    /// `load_at` convenience wrapper.
    pub fn load() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Self::load_at(&home)
    }

    /// Replace the configured socket when `socket` is given (CLI `--socket`).
    pub fn with_socket_override(mut self, socket: Option<String>) -> Self {
        if let Some(socket) = socket {
            self.clamav_socket = socket;
        }
        self
    }

    /// Transport candidates in negotiation order.
    pub fn candidates(&self) -> Result<Vec<Candidate>, ConfigError> {
        let value = self.clamav_socket.trim();
        if value.is_empty() {
            return Ok(default_candidates());
        }
        resolve_socket(value).map(|candidate| vec![candidate])
    }
}

/// Local socket first, loopback TCP second.
pub fn default_candidates() -> Vec<Candidate> {
    let tcp: SocketAddr = DEFAULT_TCP_SOCKET
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 3310)));
    vec![
        Candidate::Local(PathBuf::from(DEFAULT_LOCAL_SOCKET)),
        Candidate::Tcp(tcp),
    ]
}

fn resolve_socket(value: &str) -> Result<Candidate, ConfigError> {
    if let Ok(addr) = value.parse::<SocketAddr>() {
        return Ok(Candidate::Tcp(addr));
    }

    let looks_like_path = value.starts_with('/') || value.starts_with('.') || !value.contains(':');
    if looks_like_path {
        return Ok(Candidate::Local(PathBuf::from(value)));
    }

    let invalid = |reason| ConfigError::InvalidSocket {
        value: value.to_owned(),
        reason,
    };

    let (host, port) = value.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    if port.is_empty() {
        return Err(invalid("missing port"));
    }
    let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;

    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(Candidate::Tcp)
        .ok_or_else(|| invalid("host does not resolve"))
}
