/// Validates a parsed response message against a request's
/// `response_schema`, if one was attached.
///
/// Schema validation itself (JSON Schema, a Pydantic-equivalent, or
/// anything else the prompt formatter expects) is out of scope for this
/// crate; the dispatcher only reacts to `Ok`/`Err` from an injected
/// implementation of this trait.
pub trait ResponseValidator: Send + Sync {
    fn validate(
        &self,
        message: &serde_json::Value,
        schema: &serde_json::Value,
    ) -> Result<(), String>;
}

/// The default validator: accepts every response. Used when no schema
/// validation collaborator is configured.
pub struct NoopValidator;

impl ResponseValidator for NoopValidator {
    fn validate(&self, _message: &serde_json::Value, _schema: &serde_json::Value) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn noop_validator_accepts_anything() {
        let validator = NoopValidator;
        assert!(validator
            .validate(&json!({"arbitrary": true}), &json!({"type": "object"}))
            .is_ok());
    }
}
