//! `INSTREAM` upload and verdict parsing.
//!
//! File contents go to the daemon as a sequence of chunks, each framed by a
//! 4-byte big-endian length, and end with a zero-length frame:
//!
//! ```text
//! zINSTREAM\0 [len][data] [len][data] ... [0000]
//! ```
//!
//! The daemon answers with one line, `stream: OK` or
//! `stream: <name> FOUND`.

use std::io::{self, ErrorKind, Read};

use msav_core::{MalwareNaming, Verdict};

use crate::error::{send_err, ClientError};
use crate::protocol::{self, Command};
use crate::session::Session;
use crate::transport::Transport;

/// Largest chunk read from the source per frame.
pub const MAX_CHUNK_LEN: usize = u16::MAX as usize;

pub const FRAME_HEADER_LEN: usize = 4;

const STREAM_MARKER: &str = "stream: ";

/// Upload `source` and classify the daemon's answer.
///
/// Empty sources are clean without contacting the daemon. A read error after
/// the upload started still closes the stream properly, so the connection
/// stays usable for the next file.
pub fn scan_stream<T, R>(
    session: &mut Session<T>,
    source: &mut R,
    display_name: &str,
    naming: &dyn MalwareNaming,
) -> Verdict
where
    T: Transport,
    R: Read + ?Sized,
{
    let mut frame = vec![0u8; FRAME_HEADER_LEN + MAX_CHUNK_LEN];

    let amount = match read_chunk(source, &mut frame[FRAME_HEADER_LEN..]) {
        Ok(amount) => amount,
        Err(err) => {
            tracing::debug!(file = display_name, error = %err, "cannot read file");
            return Verdict::ReadError;
        }
    };
    if amount == 0 {
        return Verdict::Clean;
    }

    if let Err(err) = session.prepare() {
        tracing::warn!(file = display_name, error = %err, "no scanning daemon for file");
        return Verdict::ConnectionLost;
    }

    let upload = upload(session.transport_mut(), source, &mut frame, amount);

    if let Err(err) = upload.sent {
        tracing::warn!(file = display_name, error = %err, "upload to daemon failed");
        session.invalidate();
        return match upload.read_error {
            Some(_) => Verdict::ReadError,
            None => Verdict::ConnectionLost,
        };
    }

    let response = protocol::read_response(session.transport_mut());

    // A reply that did not arrive in full may still land later and would be
    // read as the next file's verdict, so any failure drops the connection.
    if let Some(read_err) = upload.read_error {
        tracing::debug!(file = display_name, error = %read_err, "file read failed mid-upload");
        if response.is_err() {
            session.invalidate();
        }
        return Verdict::ReadError;
    }

    match response {
        Ok(line) => classify(&line, display_name, naming),
        Err(err) if err.is_connection_lost() => {
            tracing::warn!(file = display_name, error = %err, "daemon connection lost");
            session.invalidate();
            Verdict::ConnectionLost
        }
        Err(err) => {
            tracing::warn!(file = display_name, error = %err, "no verdict from daemon");
            session.invalidate();
            Verdict::ScannerError
        }
    }
}

struct Upload {
    /// Local read failure after the first chunk.
    read_error: Option<io::Error>,
    /// Whether every frame, terminator included, reached the daemon.
    sent: Result<(), ClientError>,
}

fn upload<T, R>(transport: &mut T, source: &mut R, frame: &mut [u8], first: usize) -> Upload
where
    T: Transport + ?Sized,
    R: Read + ?Sized,
{
    let mut read_error = None;

    if let Err(err) = protocol::send_command(transport, Command::InStream) {
        return Upload {
            read_error,
            sent: Err(err),
        };
    }

    let mut amount = first;
    while amount > 0 {
        let len = write_frame_header(frame, amount);
        if let Err(err) = transport.send(&frame[..len]) {
            return Upload {
                read_error,
                sent: Err(send_err("stream chunk", err)),
            };
        }

        amount = match read_chunk(source, &mut frame[FRAME_HEADER_LEN..]) {
            Ok(amount) => amount,
            Err(err) => {
                read_error = Some(err);
                0
            }
        };
    }

    let len = write_frame_header(frame, 0);
    let sent = transport
        .send(&frame[..len])
        .map_err(|err| send_err("stream terminator", err));

    Upload { read_error, sent }
}

/// Store `len` big-endian in the first four bytes; returns the frame length.
pub fn write_frame_header(frame: &mut [u8], len: usize) -> usize {
    let header = u32::try_from(len).unwrap_or(u32::MAX).to_be_bytes();
    frame[..FRAME_HEADER_LEN].copy_from_slice(&header);
    FRAME_HEADER_LEN + len
}

fn read_chunk<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match source.read(buf) {
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

fn classify(line: &str, display_name: &str, naming: &dyn MalwareNaming) -> Verdict {
    let verdict = parse_verdict(line, naming);
    match &verdict {
        Verdict::Infected { name } => {
            tracing::warn!(file = display_name, malware = %name, "file infected");
        }
        Verdict::ScannerError => {
            tracing::warn!(file = display_name, response = line, "unsupported daemon response");
        }
        _ => {}
    }
    verdict
}

/// Classify a `... stream: <status>` line.
///
/// The status is the text after the last space; on `FOUND` the malware name
/// is everything between the last `stream: ` and that space.
pub fn parse_verdict(response: &str, naming: &dyn MalwareNaming) -> Verdict {
    let (Some(marker_pos), Some(status_pos)) = (response.rfind(STREAM_MARKER), response.rfind(' '))
    else {
        return Verdict::ScannerError;
    };

    match &response[status_pos + 1..] {
        "OK" => Verdict::Clean,
        "FOUND" => {
            let name_start = marker_pos + STREAM_MARKER.len();
            if name_start >= status_pos {
                return Verdict::ScannerError;
            }
            Verdict::infected(naming.normalize(&response[name_start..status_pos]))
        }
        _ => Verdict::ScannerError,
    }
}
