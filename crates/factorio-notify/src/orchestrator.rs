//! Wiring: source, watcher, supervisor, and shutdown.
//!
//! In supervise mode two units run side by side: the watcher task reading
//! the child's stdout, and the caller waiting on the child. After the child
//! exits the watcher gets the grace period to reach EOF; past that it is
//! aborted, since a leftover grandchild may hold the pipe open for good.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use factorio_notify_core::{DiscordWebhook, EventExtractor, NotificationError, NotificationSink};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{NotifyConfig, SourceConfig};
use crate::source::{PipeSource, TailSource};
use crate::supervisor::{ChildExit, ProcessSupervisor, SupervisorError};
use crate::watcher::{StreamWatcher, WatchError, WatchStats};

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Setup(#[from] factorio_notify_core::Error),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("Failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// Result of supervising one child.
#[derive(Debug)]
pub struct RunOutcome {
    pub exit: ChildExit,
    /// `None` when the watcher stopped on an error or did not reach EOF
    /// within the grace period after the child exited.
    pub stats: Option<WatchStats>,
}

/// Result of [`run`], per mode.
#[derive(Debug)]
pub enum Outcome {
    Supervised(RunOutcome),
    Tailed(WatchStats),
}

/// Build the webhook sink and watcher from `config` and run the configured
/// mode to completion.
pub async fn run<W>(
    config: &NotifyConfig,
    echo: W,
    shutdown: watch::Receiver<bool>,
) -> Result<Outcome, RunError>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let extractor = EventExtractor::new()?;
    let sink = Arc::new(DiscordWebhook::new(config.webhook_url.clone())?);
    let watcher = StreamWatcher::new(extractor, sink, config.username.clone());

    match &config.source {
        SourceConfig::Supervise { argv, grace } => {
            run_supervised(argv.clone(), *grace, watcher, echo, shutdown)
                .await
                .map(Outcome::Supervised)
        }
        SourceConfig::Tail {
            path,
            poll_interval,
        } => {
            let mut echo = echo;
            run_tail(path, *poll_interval, &watcher, &mut echo, shutdown)
                .await
                .map(Outcome::Tailed)
        }
    }
}

/// Spawn `argv`, watch its stdout, and wait for both to finish.
///
/// Stream errors are logged and do not affect the result; only spawn and
/// wait failures are errors. Returns at most `grace` after the child has
/// exited, even if something else still holds its stdout.
pub async fn run_supervised<S, W>(
    argv: Vec<String>,
    grace: Duration,
    watcher: StreamWatcher<S>,
    echo: W,
    shutdown: watch::Receiver<bool>,
) -> Result<RunOutcome, RunError>
where
    S: NotificationSink + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let supervisor = ProcessSupervisor::new(argv, grace);
    let (child, stdout) = supervisor.start(shutdown)?;

    let watch_task = tokio::spawn(watch_pipe(watcher, stdout, echo));

    let exit = child.wait().await;
    // Join the reader even when waiting failed; dropping the child has
    // killed it by then.
    let stats = join_watcher(watch_task, grace).await;

    Ok(RunOutcome { exit: exit?, stats })
}

/// Watch `pipe` to EOF. After a read error the rest of the pipe is drained
/// unread, so the writer neither blocks nor gets SIGPIPE.
async fn watch_pipe<S, R, W>(
    watcher: StreamWatcher<S>,
    pipe: R,
    mut echo: W,
) -> Result<WatchStats, WatchError>
where
    S: NotificationSink,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut source = PipeSource::new(pipe);
    let result = watcher.watch(&mut source, &mut echo).await;
    if let Err(e) = &result {
        error!(error = %e, "Stream watcher stopped on read error, discarding remaining output");
        match source.discard_rest().await {
            Ok(bytes) => debug!(bytes, "Discarded output up to end of stream"),
            Err(e) => warn!(error = %e, "Failed to drain child output"),
        }
    }
    result
}

async fn join_watcher(
    mut handle: JoinHandle<Result<WatchStats, WatchError>>,
    grace: Duration,
) -> Option<WatchStats> {
    let Ok(joined) = tokio::time::timeout(grace, &mut handle).await else {
        handle.abort();
        warn!(
            ?grace,
            "Child stdout still open after exit, abandoning stream watcher"
        );
        return None;
    };
    match joined {
        Ok(Ok(stats)) => Some(stats),
        Ok(Err(_)) => None,
        Err(e) => {
            error!(error = %e, "Stream watcher task failed");
            None
        }
    }
}

/// Follow `path` until shutdown is requested.
pub async fn run_tail<S, W>(
    path: &Path,
    poll_interval: Duration,
    watcher: &StreamWatcher<S>,
    echo: &mut W,
    shutdown: watch::Receiver<bool>,
) -> Result<WatchStats, RunError>
where
    S: NotificationSink,
    W: AsyncWrite + Unpin + Send,
{
    let source = TailSource::open(path, poll_interval, shutdown)
        .await
        .map_err(|source| RunError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    info!(path = %path.display(), ?poll_interval, "Watching log file");

    Ok(watcher.watch(source, echo).await?)
}
