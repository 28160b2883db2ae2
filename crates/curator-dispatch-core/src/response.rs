use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::GenericRequest;

/// Actual token usage as reported by the provider for one completed call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// One terminal outcome record: either a success or a permanent failure.
///
/// Exactly one of these is ever written per [`GenericRequest`], keyed by
/// `generic_request.original_row_idx` for resume purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericResponse {
    pub response_message: Option<Value>,
    pub response_errors: Option<Vec<String>>,
    pub raw_request: Value,
    pub raw_response: Option<Value>,
    pub generic_request: GenericRequest,
    pub created_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub token_usage: Option<TokenUsage>,
    pub response_cost: Option<f64>,
    pub finish_reason: Option<String>,
}

impl GenericResponse {
    pub fn is_success(&self) -> bool {
        self.response_errors.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ChatMessage;

    fn sample_request() -> GenericRequest {
        GenericRequest {
            original_row_idx: 3,
            model: "gpt-4o-mini".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: "hi".into(),
                name: None,
            }],
            response_schema: None,
            generation_params: Value::Null,
        }
    }

    #[test]
    fn round_trips_through_json() {
        let now = Utc::now();
        let response = GenericResponse {
            response_message: Some(Value::String("ok".into())),
            response_errors: None,
            raw_request: Value::Null,
            raw_response: Some(Value::Null),
            generic_request: sample_request(),
            created_at: now,
            finished_at: now,
            token_usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            response_cost: Some(0.0),
            finish_reason: Some("stop".into()),
        };

        let line = serde_json::to_string(&response).unwrap();
        let parsed: GenericResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.generic_request.original_row_idx, 3);
        assert!(parsed.is_success());
    }

    #[test]
    fn permanent_failure_has_no_message() {
        let now = Utc::now();
        let response = GenericResponse {
            response_message: None,
            response_errors: Some(vec!["boom".into()]),
            raw_request: Value::Null,
            raw_response: None,
            generic_request: sample_request(),
            created_at: now,
            finished_at: now,
            token_usage: None,
            response_cost: None,
            finish_reason: None,
        };
        assert!(!response.is_success());
    }
}
