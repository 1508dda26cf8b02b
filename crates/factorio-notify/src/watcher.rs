//! Stream watcher: lines in, webhook notifications out.
//!
//! Each line is echoed verbatim, trimmed, matched, and on a match delivered
//! before the next line is read. Delivery failures are logged and skipped;
//! a read error ends the watch.

use std::io;
use std::sync::Arc;

use factorio_notify_core::{EventExtractor, NotificationSink};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::source::LineSource;

/// Counters for one watch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    /// Complete lines read.
    pub lines: u64,
    /// Lines recognised as events.
    pub matched: u64,
    /// Events the sink accepted.
    pub delivered: u64,
    /// Events the sink rejected.
    pub failed: u64,
}

/// Errors that end a watch run.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to read line {line}: {source}")]
    Read {
        /// 1-based number of the line being read.
        line: u64,
        #[source]
        source: io::Error,
    },
}

/// Dispatches recognised lines to a notification sink.
pub struct StreamWatcher<S> {
    extractor: EventExtractor,
    sink: Arc<S>,
    sender: String,
}

impl<S: NotificationSink> StreamWatcher<S> {
    /// Create a watcher delivering events to `sink` under the name `sender`.
    pub fn new(extractor: EventExtractor, sink: Arc<S>, sender: impl Into<String>) -> Self {
        Self {
            extractor,
            sink,
            sender: sender.into(),
        }
    }

    /// Run until `source` ends or fails.
    ///
    /// Every raw line is first written to `echo` followed by `\n`. If the
    /// echo target fails once, echoing stops for the rest of the run but
    /// event delivery continues.
    pub async fn watch<L, W>(&self, mut source: L, echo: &mut W) -> Result<WatchStats, WatchError>
    where
        L: LineSource,
        W: AsyncWrite + Unpin + Send,
    {
        let mut stats = WatchStats::default();
        let mut echo_enabled = true;

        loop {
            let line = match source.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    return Err(WatchError::Read {
                        line: stats.lines + 1,
                        source: err,
                    });
                }
            };
            stats.lines += 1;

            if echo_enabled {
                if let Err(e) = echo_line(echo, &line).await {
                    warn!(error = %e, "Raw output passthrough failed, disabling it");
                    echo_enabled = false;
                }
            }

            let Some(event) = self.extractor.extract(&line) else {
                continue;
            };
            stats.matched += 1;
            debug!(kind = ?event.kind(), player = event.player(), "Event detected");

            match self.sink.deliver(&self.sender, event.payload()).await {
                Ok(()) => stats.delivered += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!(error = %e, line = event.payload(), "Notification delivery failed");
                }
            }
        }

        info!(
            lines = stats.lines,
            matched = stats.matched,
            delivered = stats.delivered,
            failed = stats.failed,
            "Stream ended"
        );
        Ok(stats)
    }
}

async fn echo_line<W: AsyncWrite + Unpin>(echo: &mut W, line: &str) -> io::Result<()> {
    echo.write_all(line.as_bytes()).await?;
    echo.write_all(b"\n").await?;
    echo.flush().await
}
