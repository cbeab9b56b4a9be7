//! Follow a growing receiver log, `tail -f` style.
//!
//! Reading starts at the end of the file as it is when opened. Bytes after
//! the last newline are held back until the line is complete. Any I/O error,
//! a missing file, or the file shrinking below the read offset closes the
//! handle and reopens it after a pause, again at the end.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Sleep between reads at end of file.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sleep before reopening after an error.
pub const REOPEN_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct FileTail {
    path: PathBuf,
    poll: Duration,
    reopen: Duration,
}

impl FileTail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileTail {
            path: path.into(),
            poll: POLL_INTERVAL,
            reopen: REOPEN_DELAY,
        }
    }

    pub fn with_intervals(mut self, poll: Duration, reopen: Duration) -> Self {
        self.poll = poll;
        self.reopen = reopen;
        self
    }

    /// Send complete lines, without their terminator, until the receiver
    /// is dropped.
    pub async fn run(self, lines: mpsc::Sender<String>) {
        loop {
            if lines.is_closed() {
                return;
            }
            match self.follow(&lines).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "input unavailable, reopening");
                    tokio::time::sleep(self.reopen).await;
                }
            }
        }
    }

    /// Ok(()) means the receiver went away.
    async fn follow(&self, lines: &mpsc::Sender<String>) -> std::io::Result<()> {
        let mut file = File::open(&self.path).await?;
        let mut offset = file.seek(SeekFrom::End(0)).await?;
        debug!(path = %self.path.display(), offset, "tailing input");

        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();

        loop {
            let n = reader.read_until(b'\n', &mut buf).await?;
            offset += n as u64;

            if !buf.ends_with(b"\n") {
                let len = tokio::fs::metadata(&self.path).await?.len();
                if len < offset {
                    return Err(std::io::Error::other(format!(
                        "file shrank from {offset} to {len} bytes"
                    )));
                }
                tokio::time::sleep(self.poll).await;
                continue;
            }

            let line = String::from_utf8_lossy(&buf)
                .trim_end_matches(['\r', '\n'])
                .to_string();
            buf.clear();

            if lines.send(line).await.is_err() {
                return Ok(());
            }
        }
    }
}
