use std::io;

use thiserror::Error;

/// Error surface for negotiation and the command protocol.
///
/// Scan outcomes are [`msav_core::Verdict`] values; this type only covers
/// what goes wrong between client and daemon.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot connect to {candidate}: {source}")]
    Connect {
        candidate: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to send {what} to daemon: {source}")]
    Send {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to receive from daemon: {0}")]
    Receive(#[source] io::Error),

    #[error("daemon closed the connection")]
    Closed,

    #[error("timed out waiting for daemon response")]
    Timeout,

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("no scanning daemon reachable (tried: {tried})")]
    DaemonUnavailable { tried: String },

    #[error("config error: {0}")]
    Config(#[from] msav_core::ConfigError),
}

impl ClientError {
    /// The transport can no longer be used and the session must be dropped.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            ClientError::Connect { .. }
                | ClientError::Send { .. }
                | ClientError::Receive(_)
                | ClientError::Closed
        )
    }
}

pub(crate) fn send_err(what: &'static str, source: io::Error) -> ClientError {
    ClientError::Send { what, source }
}
