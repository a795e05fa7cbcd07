//! Errors an item attempt can fail with; each is retried up to
//! `ProviderSettings.retry_count` before the item is marked `FAILED`.

use provider::ProviderError;
use store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RaceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Missing(String),
}
