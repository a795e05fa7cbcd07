use thiserror::Error;

/// Errors surfaced by any [`crate::Store`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {id} already exists")]
    Conflict { kind: &'static str, id: String },

    #[error("invalid state transition on {kind} {id}: {detail}")]
    InvalidTransition {
        kind: &'static str,
        id: String,
        detail: String,
    },

    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
