//! Caller-facing facade: one daemon session, one scan at a time.

use std::io::Read;

use msav_core::{
    AntivirusConfig, Candidate, ClamavNaming, EngineVersion, MalwareNaming, SessionState, Verdict,
};

use crate::error::ClientError;
use crate::instream;
use crate::session::Session;
use crate::transport::{SocketTransport, Transport};

pub const ENGINE_NAME: &str = "ClamAV";

pub struct Antivirus<T: Transport = SocketTransport> {
    session: Session<T>,
    naming: Box<dyn MalwareNaming>,
}

impl Antivirus<SocketTransport> {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self::with_transport(SocketTransport::new(), candidates)
    }

    /// Build from the `[antivirus]` settings.
    pub fn from_config(config: &AntivirusConfig) -> Result<Self, ClientError> {
        Ok(Self::new(config.candidates()?))
    }
}

impl<T: Transport> Antivirus<T> {
    pub fn with_transport(transport: T, candidates: Vec<Candidate>) -> Self {
        Self {
            session: Session::new(transport, candidates),
            naming: Box::new(ClamavNaming),
        }
    }

    /// Swap the malware-name normalization rules.
    pub fn with_naming(mut self, naming: impl MalwareNaming + 'static) -> Self {
        self.naming = Box::new(naming);
        self
    }

    pub fn engine_name(&self) -> &'static str {
        ENGINE_NAME
    }

    /// Engine and database versions, negotiating on first use.
    ///
    /// `None` when no daemon is reachable or it did not report both parts.
    pub fn version(&mut self) -> Option<EngineVersion> {
        if let Err(err) = self.session.prepare() {
            tracing::debug!(error = %err, "engine version unavailable");
            return None;
        }
        Some(self.session.state().version()).filter(EngineVersion::is_complete)
    }

    /// Scan everything `source` yields; `display_name` only appears in logs.
    pub fn scan<R: Read + ?Sized>(&mut self, source: &mut R, display_name: &str) -> Verdict {
        instream::scan_stream(&mut self.session, source, display_name, self.naming.as_ref())
    }

    pub fn end_session(&mut self) {
        self.session.end_session();
    }

    pub fn state(&self) -> &SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }
}
