//! `factorio-notify` Core Library
//!
//! Shared functionality for `factorio-notify` components:
//! - Join/leave event recognition for server log lines
//! - Notification sink contract and the Discord webhook transport
//! - Tracing initialisation
//! - Common error types

pub mod error;
pub mod event;
pub mod notifications;
pub mod tracing_init;

pub use error::{Error, Result};
pub use event::{Event, EventExtractor, EventKind};
pub use notifications::{DiscordWebhook, NotificationError, NotificationSink};
