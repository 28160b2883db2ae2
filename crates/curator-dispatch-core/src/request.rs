use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single chat message, as produced by the (out of scope) prompt formatter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
}

/// One input record: a fully-formed, provider-agnostic request.
///
/// Deserialized one-per-line from the input file. Unknown fields are
/// ignored rather than rejected, since the prompt formatter that produces
/// these records evolves independently of the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericRequest {
    /// Stable identity, unique within the input file. Used to build the
    /// resume set and to key output records back to input records.
    pub original_row_idx: i64,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub response_schema: Option<Value>,
    #[serde(default)]
    pub generation_params: Value,
}
