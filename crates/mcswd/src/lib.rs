//! mcsw daemon library.
//!
//! This crate provides the sidecar that attaches to a media control server:
//! - A reconnecting RPC/event link (`link`)
//! - A mirror of the server's room topology, rebuilt on every connect (`mirror`)
//! - A registry of stoppable per-connection sessions (`registry`)
//! - The process supervisor owning signals and bounded shutdown (`supervisor`)

pub mod cli;
pub mod config;
pub mod link;
pub mod mirror;
pub mod registry;
pub mod sidecar;
pub mod supervisor;
