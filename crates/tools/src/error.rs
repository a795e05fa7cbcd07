use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{0}")]
pub struct ToolExecutionError(pub String);

impl ToolExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type ToolResult<T> = Result<T, ToolExecutionError>;
