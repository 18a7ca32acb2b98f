//! Connection state of the remote link.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of the single persistent connection to the media control server.
///
/// ```text
/// CLOSED ──connect──▶ CONNECTING ──open──▶ OPEN
///                         │                 │ error/close
///                         ▼                 ▼
///                     RECONNECTING ◀────────┘
///                         │ retry succeeded
///                         └──────────────▶ OPEN
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No connection has been requested yet.
    #[default]
    Closed,
    /// First connection attempt in flight.
    Connecting,
    /// Transport is open; calls and subscriptions are accepted.
    Open,
    /// Transport was lost; the fixed-interval retry timer is running.
    Reconnecting,
}

impl ConnectionState {
    /// Returns true if remote calls can be issued.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Closed => "CLOSED",
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Reconnecting => "RECONNECTING",
        };
        f.write_str(label)
    }
}
