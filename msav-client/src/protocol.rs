//! clamd command/response protocol.
//!
//! Commands use the null-terminated form `z<COMMAND>\0`. Inside an
//! `IDSESSION` the daemon prefixes every reply with the request number,
//! `"<n>: <payload>\0"`.

use std::time::Duration;

use msav_core::EngineVersion;

use crate::error::{send_err, ClientError};
use crate::transport::{Received, Transport};

/// Wait for the first packet of a reply.
pub const FIRST_REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// Wait for the payload when the first packet only carried the request id.
pub const RETRY_REPLY_TIMEOUT: Duration = Duration::from_millis(300);

/// Longest reply accepted without a terminator.
pub const MAX_REPLY_LEN: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    IdSession,
    Ping,
    Version,
    InStream,
}

impl Command {
    pub fn keyword(self) -> &'static str {
        match self {
            Command::IdSession => "IDSESSION",
            Command::Ping => "PING",
            Command::Version => "VERSION",
            Command::InStream => "INSTREAM",
        }
    }

    /// `z<KEYWORD>\0`
    pub fn encode(self) -> Vec<u8> {
        let keyword = self.keyword().as_bytes();
        let mut out = Vec::with_capacity(keyword.len() + 2);
        out.push(b'z');
        out.extend_from_slice(keyword);
        out.push(0);
        out
    }
}

pub fn send_command<T: Transport + ?Sized>(
    transport: &mut T,
    command: Command,
) -> Result<(), ClientError> {
    tracing::trace!(command = command.keyword(), "sending daemon command");
    transport
        .send(&command.encode())
        .map_err(|e| send_err(command.keyword(), e))
}

/// Read one reply line with the session id prefix removed.
///
/// Packets are joined until the reply is terminated by a NUL (or a line
/// break), so a line split across segments is never cut short. Follow-up
/// packets get the shorter [`RETRY_REPLY_TIMEOUT`].
pub fn read_response<T: Transport + ?Sized>(transport: &mut T) -> Result<String, ClientError> {
    let mut reply = expect_data(transport.receive(FIRST_REPLY_TIMEOUT))?;
    while !is_terminated(&reply) {
        if reply.len() > MAX_REPLY_LEN {
            return Err(ClientError::Protocol(format!(
                "unterminated reply longer than {MAX_REPLY_LEN} bytes"
            )));
        }
        let more = expect_data(transport.receive(RETRY_REPLY_TIMEOUT))?;
        reply.extend_from_slice(&more);
    }
    Ok(strip_session_id(&decode_payload(&reply)).to_owned())
}

fn is_terminated(reply: &[u8]) -> bool {
    reply.contains(&0) || reply.ends_with(b"\n")
}

fn expect_data(received: Received) -> Result<Vec<u8>, ClientError> {
    match received {
        Received::Data(bytes) => Ok(bytes),
        Received::Timeout => Err(ClientError::Timeout),
        Received::Closed => Err(ClientError::Closed),
        Received::Failed(err) => Err(ClientError::Receive(err)),
    }
}

/// Text up to the first NUL, without a trailing line break.
pub fn decode_payload(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end])
        .trim_end_matches(['\r', '\n'])
        .to_owned()
}

/// Remove a leading `"<digits>: "` request id.
pub fn strip_session_id(reply: &str) -> &str {
    let Some((id, rest)) = reply.split_once(": ") else {
        return reply;
    };
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        rest
    } else {
        reply
    }
}

/// Liveness check: the daemon must answer exactly `PONG`.
pub fn ping<T: Transport + ?Sized>(transport: &mut T) -> Result<(), ClientError> {
    send_command(transport, Command::Ping)?;
    let reply = read_response(transport)?;
    if reply == "PONG" {
        Ok(())
    } else {
        Err(ClientError::Protocol(format!(
            "unexpected PING reply '{reply}'"
        )))
    }
}

pub fn query_version<T: Transport + ?Sized>(
    transport: &mut T,
) -> Result<EngineVersion, ClientError> {
    send_command(transport, Command::Version)?;
    let reply = read_response(transport)?;
    Ok(parse_version(&reply))
}

/// Split `"<engine>/<database>"`; a database part of `"<a>/<b>"` is shown
/// as `"<a> (<b>)"`. Without any `/` the whole reply is the engine version.
pub fn parse_version(raw: &str) -> EngineVersion {
    let Some((engine, database)) = raw.split_once('/') else {
        return EngineVersion {
            engine: raw.to_owned(),
            database: String::new(),
        };
    };

    let database = match database.split_once('/') {
        Some((first, second)) => format!("{first} ({second})"),
        None => database.to_owned(),
    };

    EngineVersion {
        engine: engine.to_owned(),
        database,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use rstest::rstest;

    #[test]
    fn commands_are_z_prefixed_and_nul_terminated() {
        assert_eq!(Command::IdSession.encode(), b"zIDSESSION\0");
        assert_eq!(Command::Ping.encode(), b"zPING\0");
        assert_eq!(Command::Version.encode(), b"zVERSION\0");
        assert_eq!(Command::InStream.encode(), b"zINSTREAM\0");
    }

    #[rstest]
    #[case("1: PONG", "PONG")]
    #[case("42: stream: OK", "stream: OK")]
    #[case("PONG", "PONG")]
    #[case("stream: OK", "stream: OK")]
    #[case("x1: PONG", "x1: PONG")]
    #[case(": PONG", ": PONG")]
    #[case("7: ", "")]
    fn session_id_prefix(#[case] reply: &str, #[case] expected: &str) {
        assert_eq!(strip_session_id(reply), expected);
    }

    #[test]
    fn payload_stops_at_nul_and_drops_line_break() {
        assert_eq!(decode_payload(b"1: PONG\0garbage"), "1: PONG");
        assert_eq!(decode_payload(b"1: PONG\n"), "1: PONG");
        assert_eq!(decode_payload(b""), "");
    }

    #[rstest]
    #[case("0.103.2/26 Jun 2024/27350", "0.103.2", "26 Jun 2024 (27350)")]
    #[case(
        "ClamAV 0.103.8/26945/Mon Jun 19 07:28:48 2023",
        "ClamAV 0.103.8",
        "26945 (Mon Jun 19 07:28:48 2023)"
    )]
    #[case("ClamAV 1.0.0/26945", "ClamAV 1.0.0", "26945")]
    #[case("ClamAV 1.0.0", "ClamAV 1.0.0", "")]
    #[case("", "", "")]
    fn version_split(#[case] raw: &str, #[case] engine: &str, #[case] database: &str) {
        let version = parse_version(raw);
        assert_eq!(version.engine, engine);
        assert_eq!(version.database, database);
    }

    #[test]
    fn reply_split_across_packets_is_joined() {
        let mut transport = ScriptedTransport::connected();
        transport.reply_raw(b"3: ");
        transport.reply_raw(b"PONG\0");
        assert_eq!(read_response(&mut transport).unwrap(), "PONG");
    }

    #[test]
    fn verdict_split_mid_name_is_joined() {
        let mut transport = ScriptedTransport::connected();
        transport.reply_raw(b"4: stream: Win.Trojan");
        transport.reply_raw(b".Agent-1 FO");
        transport.reply_raw(b"UND\0");
        assert_eq!(
            read_response(&mut transport).unwrap(),
            "stream: Win.Trojan.Agent-1 FOUND"
        );
        assert!(transport.replies.is_empty());
    }

    #[test]
    fn line_break_terminates_reply() {
        let mut transport = ScriptedTransport::connected();
        transport.reply_raw(b"1: PONG\n");
        transport.reply("2: PONG");
        assert_eq!(read_response(&mut transport).unwrap(), "PONG");
        assert_eq!(transport.replies.len(), 1);
    }

    #[test]
    fn unterminated_reply_times_out() {
        let mut transport = ScriptedTransport::connected();
        transport.reply_raw(b"3: stream: O");
        let err = read_response(&mut transport).unwrap_err();
        assert!(matches!(err, ClientError::Timeout), "got: {err}");
    }

    #[test]
    fn endless_unterminated_reply_is_rejected() {
        let mut transport = ScriptedTransport::connected();
        let chunk = vec![b'x'; 4096];
        for _ in 0..8 {
            transport.reply_raw(&chunk);
        }
        let err = read_response(&mut transport).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)), "got: {err}");
    }

    #[test]
    fn silent_daemon_times_out() {
        let mut transport = ScriptedTransport::connected();
        let err = read_response(&mut transport).unwrap_err();
        assert!(matches!(err, ClientError::Timeout), "got: {err}");
        assert!(!err.is_connection_lost());
    }

    #[test]
    fn closed_daemon_is_connection_loss() {
        let mut transport = ScriptedTransport::connected();
        transport.push(Received::Closed);
        let err = read_response(&mut transport).unwrap_err();
        assert!(err.is_connection_lost(), "got: {err}");
    }

    #[test]
    fn ping_requires_exact_pong() {
        let mut transport = ScriptedTransport::connected();
        transport.reply("1: PONG");
        ping(&mut transport).expect("pong accepted");
        assert_eq!(transport.commands(), vec!["PING"]);

        transport.reply("2: PONG!");
        let err = ping(&mut transport).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)), "got: {err}");
    }

    #[test]
    fn version_query_parses_reply() {
        let mut transport = ScriptedTransport::connected();
        transport.reply("2: 0.103.2/26 Jun 2024/27350");
        let version = query_version(&mut transport).unwrap();
        assert_eq!(version.engine, "0.103.2");
        assert_eq!(version.database, "26 Jun 2024 (27350)");
    }
}
