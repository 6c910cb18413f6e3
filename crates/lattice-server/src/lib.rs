//! # lattice-server
//!
//! The top of the stack: the build orchestrator, the debounced file
//! watcher, the docs engine, health reporting, and the `Server` handle
//! that owns every connection, index, session, and engine. There is no
//! hidden global — tests construct a fresh `Server` with stubbed clients.

pub mod docs;
pub mod health;
pub mod orchestrator;
pub mod server;
pub mod tools;
pub mod watcher;

pub use orchestrator::{BuildMode, BuildReport, BuildRequest, Orchestrator};
pub use server::{Server, ServerBackends};
pub use tools::{ToolRequest, ToolResponse};
pub use watcher::{FileWatcher, WatcherState};
