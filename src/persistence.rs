//! The storage seam between the engine and whatever keeps a session's
//! checkpoint tree alive between turns.
//!
//! The engine only ever reads and writes a [`DialogState`]; it has no
//! business with the dialog's own `T`, `C` or `S` type parameters, so the
//! trait is untyped over them. That also sidesteps a real awkwardness a
//! typed port of this trait would otherwise have: a fallback dialog's return
//! type can differ from the main dialog's, and both need to load/save through
//! the same persistence handle within one turn.

use crate::state::DialogState;

/// Loads and saves a session's dialog state tree.
///
/// Concrete backends (a database row, a cache entry, a file) implement this
/// against their own session key; this crate only ships the in-memory
/// reference implementation, [`InMemoryPersistence`].
pub trait Persistence: Send + Sync {
    /// Returns the persisted state for this session, or a fresh empty state
    /// seeded from `name`/`version` if nothing has been saved yet.
    fn load(&self, name: &str, version: &str) -> DialogState;

    /// Persists `state`, replacing whatever was stored for this session.
    fn save(&self, state: &DialogState);
}

/// A single-session, in-memory [`Persistence`] implementation.
///
/// Internally synchronized purely so a handle can be cloned and held behind
/// an `Arc` across tasks (a test harness driving several sessions
/// concurrently needs one instance per session, not one shared instance) —
/// this is not a claim that one instance may correctly serve two concurrent
/// sessions at once.
#[cfg(feature = "in-memory")]
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    slot: std::sync::Arc<std::sync::Mutex<Option<DialogState>>>,
}

#[cfg(feature = "in-memory")]
impl InMemoryPersistence {
    /// Creates an empty persistence slot.
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "in-memory")]
impl Persistence for InMemoryPersistence {
    fn load(&self, name: &str, version: &str) -> DialogState {
        let slot = self.slot.lock().expect("in-memory persistence mutex poisoned");
        slot.clone().unwrap_or_else(|| DialogState::new_empty(name, version))
    }

    fn save(&self, state: &DialogState) {
        let mut slot = self.slot.lock().expect("in-memory persistence mutex poisoned");
        *slot = Some(state.clone());
    }
}
