//! Line sources.
//!
//! A [`LineSource`] yields complete lines until it ends for good. Two
//! flavours exist because the lifetimes differ:
//! - [`PipeSource`] reads a live pipe; EOF means the writer is gone.
//! - [`TailSource`] follows a log file; EOF only means "nothing new yet".

use std::future::Future;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncSeekExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info};

/// Incremental reader of newline-terminated lines.
pub trait LineSource: Send {
    /// Next complete line without its `\n`, or `None` once the source has
    /// ended. Unterminated trailing data is never returned.
    fn next_line(&mut self) -> impl Future<Output = io::Result<Option<String>>> + Send;
}

impl<L: LineSource> LineSource for &mut L {
    fn next_line(&mut self) -> impl Future<Output = io::Result<Option<String>>> + Send {
        (**self).next_line()
    }
}

/// Strip the terminator and decode. Invalid UTF-8 is replaced, not fatal.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Lines from a pipe or any other finite stream.
pub struct PipeSource<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> PipeSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
        }
    }

    /// Read and throw away everything up to EOF, buffered data included.
    /// Keeps the writer from blocking or hitting a closed pipe once lines
    /// are no longer wanted.
    pub async fn discard_rest(&mut self) -> io::Result<u64> {
        self.buf.clear();
        tokio::io::copy(&mut self.reader, &mut tokio::io::sink()).await
    }
}

impl<R: AsyncRead + Unpin + Send> LineSource for PipeSource<R> {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        if self.buf.last() != Some(&b'\n') {
            debug!(bytes = n, "Discarding unterminated line at end of stream");
            return Ok(None);
        }
        Ok(Some(decode_line(&self.buf)))
    }
}

/// Lines appended to a file after it was opened.
///
/// Starts at the current end of the file. When no new data is available it
/// sleeps for the poll interval and tries again; a partially written line is
/// held until its terminator arrives. If the file shrinks below the read
/// offset (truncated or replaced by rotation) it is reopened from the start.
/// Ends when the shutdown flag is raised.
pub struct TailSource {
    path: PathBuf,
    reader: BufReader<File>,
    offset: u64,
    pending: Vec<u8>,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl TailSource {
    /// Open `path` and seek to its end.
    pub async fn open(
        path: impl AsRef<Path>,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).await?;
        let offset = file.seek(SeekFrom::End(0)).await?;
        debug!(path = %path.display(), offset, "Tailing file");

        Ok(Self {
            path,
            reader: BufReader::new(file),
            offset,
            pending: Vec::new(),
            poll_interval,
            shutdown,
        })
    }

    async fn reopen_if_truncated(&mut self) -> io::Result<()> {
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            // Rotated away and not recreated yet.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        if len < self.offset {
            info!(
                path = %self.path.display(),
                offset = self.offset,
                len,
                "File shrank, reading again from the start"
            );
            self.reader = BufReader::new(File::open(&self.path).await?);
            self.offset = 0;
            self.pending.clear();
        }
        Ok(())
    }
}

impl LineSource for TailSource {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if *self.shutdown.borrow() {
                return Ok(None);
            }

            let n = self.reader.read_until(b'\n', &mut self.pending).await?;
            self.offset += n as u64;
            if self.pending.last() == Some(&b'\n') {
                let line = decode_line(&self.pending);
                self.pending.clear();
                return Ok(Some(line));
            }
            if n > 0 {
                continue;
            }

            self.reopen_if_truncated().await?;
            let poll = self.poll_interval;
            tokio::select! {
                () = tokio::time::sleep(poll) => {}
                _ = self.shutdown.wait_for(|stop| *stop) => return Ok(None),
            }
        }
    }
}
