//! ClamAV daemon client: transport negotiation, the `z`-framed command
//! protocol, and `INSTREAM` uploads.
//!
//! The entry point for callers is [`Antivirus`]; the lower layers are public
//! so hosts can plug in their own [`Transport`].

pub mod antivirus;
mod error;
pub mod instream;
pub mod protocol;
pub mod session;
pub mod signals;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use antivirus::{Antivirus, ENGINE_NAME};
pub use error::ClientError;
pub use instream::parse_verdict;
pub use protocol::{parse_version, Command};
pub use session::Session;
pub use transport::{IdleHook, Received, SocketTransport, Transport};

pub use msav_core::{Candidate, EngineVersion, SessionState, Verdict};
