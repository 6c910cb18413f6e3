//! Per-subsystem sync state with explicit, logged transitions and a
//! bounded history ring.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Uninitialized,
    Synced,
    Drifted,
    Rebuilding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Subsystem {
    GraphStore,
    Index,
    VectorStore,
    Embeddings,
}

pub const ALL_SUBSYSTEMS: [Subsystem; 4] = [
    Subsystem::GraphStore,
    Subsystem::Index,
    Subsystem::VectorStore,
    Subsystem::Embeddings,
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub graph_store: SyncState,
    pub index: SyncState,
    pub vector_store: SyncState,
    pub embeddings: SyncState,
    pub at: i64,
}

#[derive(Debug)]
struct Inner {
    graph_store: SyncState,
    index: SyncState,
    vector_store: SyncState,
    embeddings: SyncState,
    history: VecDeque<StateSnapshot>,
}

#[derive(Debug)]
pub struct SyncStateMachine {
    inner: Mutex<Inner>,
    max_history: usize,
}

impl SyncStateMachine {
    pub fn new(max_history: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                graph_store: SyncState::Uninitialized,
                index: SyncState::Uninitialized,
                vector_store: SyncState::Uninitialized,
                embeddings: SyncState::Uninitialized,
                history: VecDeque::new(),
            }),
            max_history: max_history.max(1),
        }
    }

    pub fn get(&self, subsystem: Subsystem) -> SyncState {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        slot(&inner, subsystem)
    }

    pub fn set(&self, subsystem: Subsystem, state: SyncState) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let previous = slot(&inner, subsystem);
        if previous == state {
            return;
        }
        info!(?subsystem, from = ?previous, to = ?state, "sync state transition");
        *slot_mut(&mut inner, subsystem) = state;
        record(&mut inner, self.max_history);
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        snapshot_of(&inner)
    }

    pub fn history(&self) -> Vec<StateSnapshot> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.history.iter().copied().collect()
    }

    /// Healthy iff all four subsystems are synced.
    pub fn is_healthy(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        ALL_SUBSYSTEMS
            .iter()
            .all(|&s| slot(&inner, s) == SyncState::Synced)
    }

    /// First subsystem that is neither synced nor mid-rebuild.
    pub fn needs_sync(&self) -> Option<Subsystem> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        ALL_SUBSYSTEMS.iter().copied().find(|&s| {
            !matches!(slot(&inner, s), SyncState::Synced | SyncState::Rebuilding)
        })
    }

    /// Full rebuild: all four subsystems atomically.
    pub fn start_rebuild(&self) {
        self.set_all(SyncState::Rebuilding);
    }

    pub fn complete_rebuild(&self) {
        self.set_all(SyncState::Synced);
    }

    /// Incremental variants touch only index and embeddings.
    pub fn start_incremental(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.index = SyncState::Rebuilding;
        inner.embeddings = SyncState::Rebuilding;
        record(&mut inner, self.max_history);
    }

    pub fn complete_incremental(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.index = SyncState::Synced;
        inner.embeddings = SyncState::Synced;
        record(&mut inner, self.max_history);
    }

    /// A cancelled build leaves everything drifted.
    pub fn mark_all_drifted(&self) {
        self.set_all(SyncState::Drifted);
    }

    fn set_all(&self, state: SyncState) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        info!(to = ?state, "sync state transition (all subsystems)");
        inner.graph_store = state;
        inner.index = state;
        inner.vector_store = state;
        inner.embeddings = state;
        record(&mut inner, self.max_history);
    }
}

fn slot(inner: &Inner, subsystem: Subsystem) -> SyncState {
    match subsystem {
        Subsystem::GraphStore => inner.graph_store,
        Subsystem::Index => inner.index,
        Subsystem::VectorStore => inner.vector_store,
        Subsystem::Embeddings => inner.embeddings,
    }
}

fn slot_mut(inner: &mut Inner, subsystem: Subsystem) -> &mut SyncState {
    match subsystem {
        Subsystem::GraphStore => &mut inner.graph_store,
        Subsystem::Index => &mut inner.index,
        Subsystem::VectorStore => &mut inner.vector_store,
        Subsystem::Embeddings => &mut inner.embeddings,
    }
}

fn snapshot_of(inner: &Inner) -> StateSnapshot {
    StateSnapshot {
        graph_store: inner.graph_store,
        index: inner.index,
        vector_store: inner.vector_store,
        embeddings: inner.embeddings,
        at: lattice_core::now_millis(),
    }
}

fn record(inner: &mut Inner, max_history: usize) {
    let snapshot = snapshot_of(inner);
    inner.history.push_back(snapshot);
    while inner.history.len() > max_history {
        inner.history.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uninitialized_and_unhealthy() {
        let machine = SyncStateMachine::new(10);
        assert!(!machine.is_healthy());
        assert_eq!(machine.needs_sync(), Some(Subsystem::GraphStore));
    }

    #[test]
    fn rebuild_cycle_reaches_healthy() {
        let machine = SyncStateMachine::new(10);
        machine.start_rebuild();
        assert!(!machine.is_healthy());
        assert_eq!(machine.needs_sync(), None, "rebuilding is not 'needs sync'");
        machine.complete_rebuild();
        assert!(machine.is_healthy());
    }

    #[test]
    fn incremental_touches_only_index_and_embeddings() {
        let machine = SyncStateMachine::new(10);
        machine.complete_rebuild();
        machine.start_incremental();
        assert_eq!(machine.get(Subsystem::GraphStore), SyncState::Synced);
        assert_eq!(machine.get(Subsystem::Index), SyncState::Rebuilding);
        assert_eq!(machine.get(Subsystem::Embeddings), SyncState::Rebuilding);
        machine.complete_incremental();
        assert!(machine.is_healthy());
    }

    #[test]
    fn history_ring_is_bounded() {
        let machine = SyncStateMachine::new(3);
        for _ in 0..10 {
            machine.start_rebuild();
            machine.complete_rebuild();
        }
        assert!(machine.history().len() <= 3);
    }

    #[test]
    fn cancellation_marks_everything_drifted() {
        let machine = SyncStateMachine::new(10);
        machine.complete_rebuild();
        machine.mark_all_drifted();
        assert!(!machine.is_healthy());
        assert_eq!(machine.needs_sync(), Some(Subsystem::GraphStore));
    }

    #[test]
    fn redundant_set_does_not_grow_history() {
        let machine = SyncStateMachine::new(10);
        machine.set(Subsystem::Index, SyncState::Drifted);
        let len = machine.history().len();
        machine.set(Subsystem::Index, SyncState::Drifted);
        assert_eq!(machine.history().len(), len);
    }
}
