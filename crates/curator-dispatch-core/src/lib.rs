//! Shared types for `curator-dispatch`: the request/response data model, the
//! [`TokenCount`] value type, the TPM accounting strategy, and a small event
//! system used by the capacity, status and dispatcher crates for
//! observability.

mod error;
mod events;
mod request;
mod response;
mod token_count;

pub use error::AttemptError;
pub use events::{DispatchEvent, EventListener, EventListeners};
pub use request::{ChatMessage, GenericRequest};
pub use response::{GenericResponse, TokenUsage};
pub use token_count::{TokenCount, TokenLimitStrategy};
