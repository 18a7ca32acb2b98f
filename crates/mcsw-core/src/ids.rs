//! Identifier newtypes.
//!
//! Every identifier handed out by the media control server is an opaque
//! string. Wrapping each kind in its own type keeps room ids from being
//! passed where a media id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the underlying string reference.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a remote room (conference).
    RoomId
);

string_id!(
    /// Identifier of a remote user inside a room.
    UserId
);

string_id!(
    /// Identifier of a remote media stream.
    MediaId
);

string_id!(
    /// Identifier of a client connection owning one or more sessions.
    ConnectionId
);

string_id!(
    /// Composite key of a registered session.
    ///
    /// Only [`SessionDescriptor::key`](crate::SessionDescriptor::key) should
    /// build these for registered sessions; `new` exists for lookups by a
    /// key that arrived from elsewhere.
    SessionId
);
