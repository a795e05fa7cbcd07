//! Errors the judge pipeline can fail with. Per-item parse failures are
//! never propagated here: they become a zero-score [`store::JudgeResult`]
//! row instead (spec.md §4.F step 4).

use provider::ProviderError;
use store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("no judge car configured for this run")]
    NoJudgeConfigured,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Missing(String),
}
