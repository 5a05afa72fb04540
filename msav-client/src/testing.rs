//! In-memory transport for protocol, session, and upload tests.

use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::time::Duration;

use msav_core::Candidate;

use crate::transport::{Received, Transport};

/// Replays queued receive outcomes and records everything sent.
/// An empty queue behaves like a silent daemon.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    pub refused: Vec<Candidate>,
    pub opened: Vec<Candidate>,
    pub sent: Vec<Vec<u8>>,
    pub replies: VecDeque<Received>,
    /// Served before `replies`, but only on the connection that is open
    /// now; closing discards whatever is left.
    pub connection_replies: VecDeque<Received>,
    /// Fail the send with this index (counted over the whole lifetime).
    pub fail_send_at: Option<usize>,
    pub open: bool,
    pub closes: usize,
    sends: usize,
}

impl ScriptedTransport {
    pub fn connected() -> Self {
        Self {
            open: true,
            ..Self::default()
        }
    }

    pub fn push(&mut self, received: Received) {
        self.replies.push_back(received);
    }

    pub fn reply_raw(&mut self, bytes: &[u8]) {
        self.push(Received::Data(bytes.to_vec()));
    }

    /// Queue `text` as one NUL-terminated packet.
    pub fn reply(&mut self, text: &str) {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        self.push(Received::Data(bytes));
    }

    /// Queue `text` on the current connection only.
    pub fn reply_on_connection(&mut self, text: &str) {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        self.connection_replies.push_back(Received::Data(bytes));
    }

    /// Queue the PONG and VERSION replies of a successful negotiation.
    pub fn script_handshake(&mut self) {
        self.reply("1: PONG");
        self.reply("2: 0.103.2/26 Jun 2024/27350");
    }

    /// Keywords of every `z<COMMAND>\0` sent, in order.
    pub fn commands(&self) -> Vec<String> {
        self.sent
            .iter()
            .filter(|bytes| bytes.first() == Some(&b'z') && bytes.last() == Some(&0))
            .map(|bytes| String::from_utf8_lossy(&bytes[1..bytes.len() - 1]).into_owned())
            .collect()
    }

    /// Everything sent after the last `zINSTREAM\0`, as one byte string.
    pub fn upload_bytes(&self) -> Vec<u8> {
        let start = self
            .sent
            .iter()
            .rposition(|bytes| bytes.as_slice() == b"zINSTREAM\0")
            .map_or(self.sent.len(), |idx| idx + 1);
        self.sent[start..].concat()
    }
}

impl Transport for ScriptedTransport {
    fn open(&mut self, candidate: &Candidate) -> io::Result<()> {
        self.close();
        self.opened.push(candidate.clone());
        if self.refused.contains(candidate) {
            return Err(io::Error::new(ErrorKind::ConnectionRefused, "refused"));
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.closes += 1;
        }
        self.open = false;
        self.connection_replies.clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        if !self.open {
            return Err(io::Error::new(ErrorKind::NotConnected, "not open"));
        }
        let index = self.sends;
        self.sends += 1;
        if self.fail_send_at == Some(index) {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "broken pipe"));
        }
        self.sent.push(bytes.to_vec());
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Received {
        if !self.open {
            return Received::Failed(io::Error::new(ErrorKind::NotConnected, "not open"));
        }
        self.connection_replies
            .pop_front()
            .or_else(|| self.replies.pop_front())
            .unwrap_or(Received::Timeout)
    }
}
