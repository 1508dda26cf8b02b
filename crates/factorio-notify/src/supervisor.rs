//! Child process supervision.
//!
//! Spawns the server process, hands its stdout to the caller, and owns the
//! process handle until it has exited. When the shutdown flag is raised the
//! child gets SIGINT and a grace period to exit on its own before it is
//! killed.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Errors from supervising the child.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("No command to run")]
    EmptyCommand,

    #[error("Failed to spawn `{program}`: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to capture stdout of `{program}`")]
    MissingStdout { program: String },

    #[error("Failed waiting for child process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Child process terminated by signal {signal}")]
    Signaled { signal: i32 },

    #[error("Child process terminated without an exit code")]
    NoExitCode,
}

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    pub status: ExitStatus,
    /// The grace period ran out and the child was killed.
    pub forced: bool,
}

impl ChildExit {
    /// The child's exit code, or an error when it did not exit normally.
    pub fn code(&self) -> Result<i32, SupervisorError> {
        if let Some(code) = self.status.code() {
            return Ok(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = self.status.signal() {
                return Err(SupervisorError::Signaled { signal });
            }
        }
        Err(SupervisorError::NoExitCode)
    }
}

/// Starts one child process with the configured grace period.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    argv: Vec<String>,
    grace: Duration,
}

impl ProcessSupervisor {
    /// `argv[0]` is the program, the rest are its arguments.
    pub const fn new(argv: Vec<String>, grace: Duration) -> Self {
        Self { argv, grace }
    }

    /// Spawn the child.
    ///
    /// Stdin is `/dev/null`, stderr is inherited, stdout is returned for
    /// the caller to read. Raising `shutdown` starts graceful termination
    /// once [`SupervisedChild::wait`] is running.
    pub fn start(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(SupervisedChild, ChildStdout), SupervisorError> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or(SupervisorError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        info!(
            program = %program,
            args = ?args,
            grace = ?self.grace,
            "Spawning child process"
        );
        let mut child = cmd.spawn().map_err(|source| SupervisorError::SpawnFailed {
            program: program.clone(),
            source,
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SupervisorError::MissingStdout {
                program: program.clone(),
            })?;

        debug!(pid = ?child.id(), "Child process started");

        Ok((
            SupervisedChild {
                child,
                grace: self.grace,
                shutdown,
            },
            stdout,
        ))
    }
}

/// Handle to the running child. Only this type signals or waits on it.
#[derive(Debug)]
pub struct SupervisedChild {
    child: Child,
    grace: Duration,
    shutdown: watch::Receiver<bool>,
}

impl SupervisedChild {
    /// Wait for the child to exit, terminating it if shutdown is requested.
    ///
    /// Further shutdown requests after the first have no effect; the grace
    /// period already running is not shortened.
    pub async fn wait(mut self) -> Result<ChildExit, SupervisorError> {
        tokio::select! {
            status = self.child.wait() => {
                let status = status.map_err(SupervisorError::Wait)?;
                info!(?status, "Child process exited");
                return Ok(ChildExit { status, forced: false });
            }
            () = shutdown_requested(&mut self.shutdown) => {}
        }

        info!(grace = ?self.grace, "Shutdown requested, stopping child process");
        self.terminate().await
    }

    async fn terminate(mut self) -> Result<ChildExit, SupervisorError> {
        if self.interrupt() {
            match tokio::time::timeout(self.grace, self.child.wait()).await {
                Ok(Ok(status)) => {
                    info!(?status, "Child process exited gracefully");
                    return Ok(ChildExit {
                        status,
                        forced: false,
                    });
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Error waiting for child process, killing");
                    self.child.start_kill().ok();
                    return Err(SupervisorError::Wait(e));
                }
                Err(_) => {
                    warn!(grace = ?self.grace, "Timeout waiting for graceful shutdown, killing");
                }
            }
        }

        if let Err(e) = self.child.start_kill() {
            warn!(error = %e, "Failed to kill child process");
        }
        let status = self.child.wait().await.map_err(SupervisorError::Wait)?;
        info!(?status, "Child process killed");
        Ok(ChildExit {
            status,
            forced: true,
        })
    }

    /// Send SIGINT. Returns `false` if the signal could not be delivered.
    #[cfg(unix)]
    fn interrupt(&self) -> bool {
        let Some(pid) = self.child.id() else {
            return false;
        };
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        // SAFETY: pid is a valid process ID obtained from our own Child handle,
        // which has not been reaped yet. kill(2) with SIGINT is safe to call on
        // any owned subprocess.
        #[allow(unsafe_code)]
        let ret = unsafe { libc::kill(pid, libc::SIGINT) };
        if ret != 0 {
            let err = std::io::Error::last_os_error();
            warn!(pid, error = %err, "Failed to send SIGINT");
            return false;
        }
        debug!(pid, "Sent SIGINT to child process");
        true
    }

    #[cfg(not(unix))]
    fn interrupt(&self) -> bool {
        false
    }
}

/// Resolves once the flag is raised. Never resolves if the sender is gone
/// without having raised it.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
