//! Process-wide signal setup for daemon sockets.
//!
//! Writing to a socket the daemon has already closed raises `SIGPIPE`, whose
//! default action kills the host process. It is ignored once, globally, the
//! first time a transport is constructed.

use std::sync::Once;

static IGNORE_BROKEN_PIPE: Once = Once::new();

/// Ignore `SIGPIPE` for the whole process. Later calls do nothing.
pub fn ignore_broken_pipe() {
    IGNORE_BROKEN_PIPE.call_once(|| {
        #[cfg(unix)]
        {
            // SAFETY: installs SIG_IGN; no handler code runs in signal context.
            unsafe {
                libc::signal(libc::SIGPIPE, libc::SIG_IGN);
            }
        }
        tracing::debug!("SIGPIPE ignored for daemon connections");
    });
}

/// Whether [`ignore_broken_pipe`] has already run.
pub fn broken_pipe_ignored() -> bool {
    IGNORE_BROKEN_PIPE.is_completed()
}
