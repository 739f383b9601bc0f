//! In-memory change-state backend.
//!
//! Thread-safe and intended for embedding and tests. Save failures can be
//! injected to exercise the coordinator's error path.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use crate::error::StateError;

use super::change_state::ChangeState;
use super::traits::StateStore;

fn lock_err(context: &'static str) -> StateError {
    StateError::Backend(format!("poisoned lock: {context}"))
}

/// Change-state held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    state: RwLock<ChangeState>,
    fail_saves: AtomicBool,
    saves: AtomicU64,
}

impl InMemoryStateStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing state.
    #[must_use]
    pub fn with_state(state: ChangeState) -> Self {
        Self {
            state: RwLock::new(state),
            ..Self::default()
        }
    }

    /// Make every subsequent `save` fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Relaxed);
    }

    /// Number of successful saves so far.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    /// Copy of the currently stored state.
    ///
    /// # Errors
    /// Fails only if the lock was poisoned.
    pub fn snapshot(&self) -> Result<ChangeState, StateError> {
        self.load()
    }
}

impl StateStore for InMemoryStateStore {
    fn load(&self) -> Result<ChangeState, StateError> {
        let state = self.state.read().map_err(|_| lock_err("state.load"))?;
        Ok(state.clone())
    }

    fn save(&self, next: &ChangeState) -> Result<(), StateError> {
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(StateError::Backend("injected save failure".to_string()));
        }
        let mut state = self.state.write().map_err(|_| lock_err("state.save"))?;
        *state = next.clone();
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Fingerprint;

    #[test]
    fn load_defaults_to_empty() {
        let store = InMemoryStateStore::new();
        assert_eq!(store.load().unwrap(), ChangeState::default());
    }

    #[test]
    fn save_replaces_state() {
        let store = InMemoryStateStore::new();
        let mut state = ChangeState::new();
        state.seen_ids.insert("a".to_string());
        state.fingerprints.insert("a".to_string(), Fingerprint::from_raw("resolved:1"));
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), state);
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn injected_failure_keeps_previous_state() {
        let store = InMemoryStateStore::new();
        store.set_fail_saves(true);
        let mut state = ChangeState::new();
        state.seen_ids.insert("a".to_string());
        assert!(store.save(&state).is_err());
        assert!(store.load().unwrap().seen_ids.is_empty());
        assert_eq!(store.save_count(), 0);
    }
}
