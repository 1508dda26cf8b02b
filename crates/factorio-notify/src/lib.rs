//! factorio-notify Library
//!
//! Core functionality for the `factorio-notify` binary:
//! - Line sources for a child's stdout pipe and for tailed log files
//! - Stream watcher dispatching join/leave events to a notification sink
//! - Child process supervision with graceful shutdown
//! - Shutdown signal handling and run orchestration

pub mod config;
pub mod orchestrator;
pub mod signals;
pub mod source;
pub mod supervisor;
pub mod watcher;

pub use config::{NotifyConfig, SourceConfig};
pub use orchestrator::{Outcome, RunError, RunOutcome};
pub use supervisor::{ChildExit, ProcessSupervisor, SupervisedChild, SupervisorError};
pub use watcher::{StreamWatcher, WatchError, WatchStats};
