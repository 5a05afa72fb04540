//! Minimal clamd stand-in speaking the `z`-command session protocol.
//!
//! Serves connections one after another on a background thread. Uploads
//! containing [`EICAR_MARKER`] are reported as infected.

#![allow(dead_code)]

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::os::unix::net::UnixListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use msav_core::Candidate;
use tempfile::TempDir;

pub const EICAR_MARKER: &[u8] = b"EICAR-STANDARD-ANTIVIRUS-TEST-FILE";
pub const VERSION_REPLY: &str = "ClamAV 0.103.2/26 Jun 2024/27350";
pub const INFECTED_NAME: &str = "Win.Test.EICAR_HDB-1";

#[derive(Default)]
struct Shared {
    commands: Mutex<Vec<String>>,
    uploads: Mutex<Vec<usize>>,
    /// `INSTREAM` requests seen so far, including dropped ones.
    started: AtomicUsize,
    /// Index of the `INSTREAM` request to drop instead of answering.
    hang_up_at: Mutex<Option<usize>>,
}

pub struct FakeClamd {
    pub candidate: Candidate,
    shared: Arc<Shared>,
    _dir: Option<TempDir>,
}

impl FakeClamd {
    /// Listen on `clamd.sock` inside a fresh temp directory.
    pub fn local() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("clamd.sock");
        let listener = UnixListener::bind(&path).expect("bind unix socket");
        let shared = Arc::new(Shared::default());

        let state = Arc::clone(&shared);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let _ = serve(stream, &state);
            }
        });

        Self {
            candidate: Candidate::Local(path),
            shared,
            _dir: Some(dir),
        }
    }

    /// Listen on an ephemeral loopback port.
    pub fn tcp() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind tcp");
        let addr = listener.local_addr().expect("local addr");
        let shared = Arc::new(Shared::default());

        let state = Arc::clone(&shared);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let _ = serve(stream, &state);
            }
        });

        Self {
            candidate: Candidate::Tcp(addr),
            shared,
            _dir: None,
        }
    }

    /// Socket string accepted by `--socket`.
    pub fn socket_arg(&self) -> String {
        match &self.candidate {
            Candidate::Local(path) => path.display().to_string(),
            Candidate::Tcp(addr) => addr.to_string(),
        }
    }

    /// Drop the connection instead of answering the next `INSTREAM`.
    pub fn hang_up_next_upload(&self) {
        let next = self.shared.started.load(Ordering::SeqCst);
        self.hang_up_upload(next);
    }

    /// Drop the connection instead of answering the `index`-th `INSTREAM`
    /// (zero-based, counted over the daemon's lifetime).
    pub fn hang_up_upload(&self, index: usize) {
        *self.shared.hang_up_at.lock().expect("lock") = Some(index);
    }

    pub fn commands(&self) -> Vec<String> {
        self.shared.commands.lock().expect("lock").clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| c.as_str() == command).count()
    }

    /// Byte counts of completed uploads.
    pub fn uploads(&self) -> Vec<usize> {
        self.shared.uploads.lock().expect("lock").clone()
    }
}

fn serve<S: Read + Write>(stream: S, shared: &Shared) -> io::Result<()> {
    let mut reader = BufReader::new(stream);
    let mut request_id = 0usize;

    loop {
        let mut raw = Vec::new();
        if reader.read_until(0, &mut raw)? == 0 {
            return Ok(());
        }
        if raw.last() == Some(&0) {
            raw.pop();
        }
        let command = raw.strip_prefix(b"z").unwrap_or(&raw[..]);
        let command = String::from_utf8_lossy(command).into_owned();
        shared.commands.lock().expect("lock").push(command.clone());

        let reply = match command.as_str() {
            "IDSESSION" => continue,
            "END" => return Ok(()),
            "PING" => "PONG".to_string(),
            "VERSION" => VERSION_REPLY.to_string(),
            "INSTREAM" => {
                let index = shared.started.fetch_add(1, Ordering::SeqCst);
                let payload = read_upload(&mut reader)?;
                let mut hang_up_at = shared.hang_up_at.lock().expect("lock");
                if *hang_up_at == Some(index) {
                    *hang_up_at = None;
                    return Ok(());
                }
                drop(hang_up_at);
                shared.uploads.lock().expect("lock").push(payload.len());
                if contains(&payload, EICAR_MARKER) {
                    format!("stream: {INFECTED_NAME} FOUND")
                } else {
                    "stream: OK".to_string()
                }
            }
            _ => "UNKNOWN COMMAND".to_string(),
        };

        request_id += 1;
        let stream = reader.get_mut();
        stream.write_all(format!("{request_id}: {reply}\0").as_bytes())?;
        stream.flush()?;
    }
}

fn read_upload<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut payload = Vec::new();
    loop {
        let mut header = [0u8; 4];
        reader.read_exact(&mut header)?;
        let len = u32::from_be_bytes(header) as usize;
        if len == 0 {
            return Ok(payload);
        }
        let start = payload.len();
        payload.resize(start + len, 0);
        reader.read_exact(&mut payload[start..])?;
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
