//! Persistence contract for the change-state.
//!
//! The dispatch coordinator reads the state once at the start of a cycle and
//! writes it once at the end; backends never see per-event traffic.

use crate::error::StateError;

use super::change_state::ChangeState;

/// Storage backend for [`ChangeState`].
///
/// # Semantics
/// - `load` returns an empty state when nothing was persisted yet
/// - `save` replaces the persisted state as a whole
pub trait StateStore: Send + Sync {
    /// Load the last committed state.
    fn load(&self) -> Result<ChangeState, StateError>;

    /// Persist `state`, replacing whatever was stored.
    fn save(&self, state: &ChangeState) -> Result<(), StateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure the trait is object-safe
    fn _assert_state_store_object_safe(_: &dyn StateStore) {}

    #[test]
    fn test_state_error_display() {
        let err = StateError::Backend("disk full".to_string());
        assert!(err.to_string().contains("disk full"));

        let err = StateError::Locked {
            path: "/var/lib/statuscast/.lock".to_string(),
        };
        assert!(err.to_string().contains("locked"));
    }
}
