//! # lattice-session
//!
//! Everything scoped to "who is working on this project right now":
//! the session/project context, the per-subsystem sync state machine,
//! advisory multi-agent claims with conflict detection, and episodic
//! memory with recall and reflection.

pub mod context;
pub mod coordination;
pub mod memory;
pub mod sync_state;

pub use context::{
    adapt_workspace_for_runtime, resolve_project_context, AdaptOutcome, ResolveArgs,
    SessionContext,
};
pub use coordination::{ClaimOutcome, ClaimRecord, ClaimStatus, CoordinationEngine};
pub use memory::{Episode, EpisodeStore, EpisodeType, RecallQuery, ReflectReport};
pub use sync_state::{Subsystem, SyncState, SyncStateMachine};
