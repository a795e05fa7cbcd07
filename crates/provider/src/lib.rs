//! Wire-protocol adapters, header composition, and normalized streaming
//! generation for every connection type this engine races (spec.md §4.A).

mod client;
mod error;
mod headers;
mod http_client;
mod message;
mod protocol;
mod types;

pub use client::{discover_models, generate, test_connection};
pub use error::{ApiKeySource, ProviderError};
pub use headers::{resolve_api_key, OpenRouterAttribution, PassthroughSecretSource, SecretSource};
pub use types::{GenerateEvent, NormalizedMessage, NormalizedRequest, ProviderResponse, TestConnectionOutcome, ToolCall, Usage};
