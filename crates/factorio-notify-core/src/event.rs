//! Join/leave event recognition for Factorio server output.
//!
//! A line is an event when it has the exact shape
//! `YYYY-MM-DD HH:MM:SS [JOIN] <player> joined the game` or
//! `YYYY-MM-DD HH:MM:SS [LEAVE] <player> left the game`. Tags and suffixes
//! only pair one way; `[JOIN] ... left the game` is not an event.

use regex::Regex;

use crate::error::Result;

/// Recognition pattern for join/leave lines.
///
/// The player name is one or more non-space runs joined by single spaces,
/// so doubled or stray whitespace never matches.
pub const EVENT_PATTERN: &str = concat!(
    r"^[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2} ",
    r"(?:\[JOIN\] (?P<joined>\S+(?: \S+)*) joined the game",
    r"|\[LEAVE\] (?P<left>\S+(?: \S+)*) left the game)$",
);

/// Which way the player moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Join,
    Leave,
}

/// A notifiable event extracted from exactly one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    kind: EventKind,
    player: String,
    line: String,
}

impl Event {
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    /// The trimmed source line, verbatim. This is what gets delivered.
    pub fn payload(&self) -> &str {
        &self.line
    }
}

/// Stateless matcher holding the compiled recognition pattern.
///
/// Compile it once at startup and share it by reference; matching never
/// mutates it.
#[derive(Debug, Clone)]
pub struct EventExtractor {
    pattern: Regex,
}

impl EventExtractor {
    /// Compile the join/leave pattern.
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(EVENT_PATTERN)?,
        })
    }

    /// Decide whether `line` is an event.
    ///
    /// Leading and trailing whitespace is trimmed before matching; the
    /// returned event carries the trimmed line.
    pub fn extract(&self, line: &str) -> Option<Event> {
        let line = line.trim();
        let caps = self.pattern.captures(line)?;

        let (kind, player) = if let Some(joined) = caps.name("joined") {
            (EventKind::Join, joined.as_str())
        } else {
            (EventKind::Leave, caps.name("left")?.as_str())
        };

        Some(Event {
            kind,
            player: player.to_string(),
            line: line.to_string(),
        })
    }
}
