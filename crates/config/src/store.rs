//! Persistence backend selection.
//!
//! The persistence schema proper is an external collaborator (spec.md §1);
//! this repo ships one in-process reference implementation
//! (`store::memory::MemoryStore`). `StoreConfig` exists so a future
//! SQL-backed `Store` implementation has somewhere to declare its
//! connection string without changing the shape of [`crate::Config`].

use serde::Deserialize;

/// Which [`store::Store`](../../store/trait.Store.html) implementation to construct at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process, non-durable store. The only backend this repo implements.
    #[default]
    Memory,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Which backend to construct.
    pub backend: StoreBackend,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
        }
    }
}
