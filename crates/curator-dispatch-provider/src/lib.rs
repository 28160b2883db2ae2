//! Provider adapter: the dispatcher's only HTTP-shaped dependency.
//!
//! [`ProviderAdapter`] is the trait the dispatcher is generic over (as a
//! trait object, not a type parameter); [`OpenAiAdapter`] is the one
//! concrete implementation this workspace ships, covering both plain
//! OpenAI and Azure OpenAI deployment endpoints.

mod adapter;
mod error;
mod openai;

pub use adapter::{ParsedResponse, ProviderAdapter, ProviderRequest, RawHttpResponse};
pub use error::ProviderError;
pub use openai::{OpenAiAdapter, CALL_TIMEOUT};
