//! The single logical connection to the daemon.
//!
//! Candidates are tried in order; the first that accepts `IDSESSION` and
//! answers `PING` with `PONG` wins. The negotiated connection and the engine
//! versions are cached until the session is invalidated by a transport
//! failure, after which the next [`Session::prepare`] negotiates again.

use msav_core::{Candidate, EngineVersion, SessionState};

use crate::error::ClientError;
use crate::protocol::{self, Command};
use crate::transport::Transport;

/// An opened transport and the candidate it was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Connection {
    candidate_index: usize,
}

pub struct Session<T: Transport> {
    transport: T,
    candidates: Vec<Candidate>,
    connection: Option<Connection>,
    state: SessionState,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, candidates: Vec<Candidate>) -> Self {
        Self {
            transport,
            candidates,
            connection: None,
            state: SessionState::default(),
        }
    }

    /// Negotiate a connection unless one is already cached.
    pub fn prepare(&mut self) -> Result<(), ClientError> {
        if self.state.is_ready {
            return Ok(());
        }

        self.state = SessionState::default();
        self.connection = None;
        let mut tried = Vec::with_capacity(self.candidates.len());

        for (index, candidate) in self.candidates.iter().enumerate() {
            tracing::debug!(candidate = %candidate, "trying scanning daemon");
            match handshake(&mut self.transport, candidate) {
                Ok(()) => {
                    self.connection = Some(Connection {
                        candidate_index: index,
                    });
                    break;
                }
                Err(err) => {
                    tracing::debug!(candidate = %candidate, error = %err, "daemon candidate rejected");
                    self.transport.close();
                    tried.push(candidate.to_string());
                }
            }
        }

        if self.connection.is_none() {
            return Err(ClientError::DaemonUnavailable {
                tried: tried.join(", "),
            });
        }

        let version = match protocol::query_version(&mut self.transport) {
            Ok(version) => version,
            Err(err) if err.is_connection_lost() => {
                tracing::warn!(error = %err, "daemon dropped the connection during VERSION");
                self.invalidate();
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(error = %err, "daemon did not report its version");
                EngineVersion::default()
            }
        };
        self.state = SessionState::ready(version);

        tracing::info!(
            candidate = %self.active_candidate().map(ToString::to_string).unwrap_or_default(),
            engine = %self.state.engine_version,
            database = %self.state.database_version,
            "scanning daemon session ready"
        );
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn engine_version(&self) -> &str {
        &self.state.engine_version
    }

    pub fn database_version(&self) -> &str {
        &self.state.database_version
    }

    /// Candidate of the live connection, if any.
    pub fn active_candidate(&self) -> Option<&Candidate> {
        self.connection
            .and_then(|conn| self.candidates.get(conn.candidate_index))
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Drop the connection after a transport failure.
    pub fn invalidate(&mut self) {
        if self.connection.is_some() {
            tracing::warn!("daemon connection lost; renegotiating on next use");
        }
        self.transport.close();
        self.connection = None;
        self.state = SessionState::default();
    }

    /// Lifecycle hook for the end of a scan run. Sends nothing today and
    /// keeps the connection cached.
    pub fn end_session(&mut self) {
        tracing::debug!(ready = self.state.is_ready, "scan session ended");
    }
}

fn handshake<T: Transport + ?Sized>(
    transport: &mut T,
    candidate: &Candidate,
) -> Result<(), ClientError> {
    transport
        .open(candidate)
        .map_err(|source| ClientError::Connect {
            candidate: candidate.to_string(),
            source,
        })?;
    protocol::send_command(transport, Command::IdSession)?;
    protocol::ping(transport)
}
