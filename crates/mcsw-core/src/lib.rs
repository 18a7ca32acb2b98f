//! mcsw Core - Shared types for media control server mirroring
//!
//! This crate provides the domain types shared between the wire protocol
//! (`mcsw-protocol`) and the sidecar daemon (`mcswd`).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod ids;
pub mod session;
pub mod state;
pub mod topology;

// Re-exports for convenience
pub use error::{ErrorCode, OperationError, RemoteFailure, MEDIA_SERVER_OFFLINE, REQUEST_TIMEOUT};
pub use ids::{ConnectionId, MediaId, RoomId, SessionId, UserId};
pub use session::SessionDescriptor;
pub use state::ConnectionState;
pub use topology::{Floor, FloorChange, Media, MediaLifecycle, User};
