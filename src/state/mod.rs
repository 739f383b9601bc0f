//! Change-state store.
//!
//! The classification/retention core lives in [`ChangeState`]; persistence is
//! abstracted behind [`StateStore`] with in-memory and (feature `persistent`)
//! on-disk backends.

mod change_state;
mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use change_state::{ChangeState, Classification, DEFAULT_RETENTION_LIMIT};
pub use memory::InMemoryStateStore;
pub use traits::StateStore;

#[cfg(feature = "persistent")]
pub use persistent::{open_state_store, FileStateStore, StateFileConfig};
