//! mcsw Protocol - Wire protocol for the remote link
//!
//! This crate provides the JSON frames exchanged with the media control
//! server, the remote event vocabulary and the statically declared table
//! of remote operations.

pub mod command;
pub mod event;
pub mod message;

pub use command::{find_command, ArgKind, ArgSpec, CommandSpec, COMMANDS};
pub use event::{LinkLevelEvent, ProtocolError, TopologyEvent};
pub use message::{ClientFrame, RemoteEvent, ServerFrame, ALL_SCOPE};
