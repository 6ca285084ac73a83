use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::types::ModelRequest;

pub const MISSING_DATA_MESSAGE: &str = "Missing required data: model and messages are required";

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Missing required data: model and messages are required")]
    MissingRequiredData,
    #[error("Invalid request payload: {0}")]
    Malformed(String),
}

/// Check the inbound payload carries a non-empty `model` and a non-empty
/// `messages` list, then decode it into a [`ModelRequest`].
pub fn validate(payload: &Value) -> Result<ModelRequest, ValidationError> {
    let model = payload.get("model").and_then(Value::as_str).unwrap_or("");
    info!("📨 Received request for model: {}", if model.is_empty() { "<none>" } else { model });

    let has_messages = payload
        .get("messages")
        .and_then(Value::as_array)
        .map(|messages| !messages.is_empty())
        .unwrap_or(false);

    if model.is_empty() || !has_messages {
        warn!("⚠️ Rejecting request: model or messages missing");
        return Err(ValidationError::MissingRequiredData);
    }

    serde_json::from_value(payload.clone()).map_err(|e| {
        warn!("⚠️ Rejecting request: {}", e);
        ValidationError::Malformed(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use serde_json::json;

    #[test]
    fn test_accepts_minimal_payload() {
        let request = validate(&json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}]
        }))
        .unwrap();

        assert_eq!(request.model, "m");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, Role::User);
    }

    #[test]
    fn test_missing_model() {
        let err = validate(&json!({"messages": [{"role": "user", "content": "hi"}]})).unwrap_err();
        assert_eq!(err, ValidationError::MissingRequiredData);
        assert_eq!(err.to_string(), MISSING_DATA_MESSAGE);
    }

    #[test]
    fn test_empty_model_or_messages() {
        assert_eq!(
            validate(&json!({"model": "", "messages": [{"role": "user", "content": "hi"}]})),
            Err(ValidationError::MissingRequiredData)
        );
        assert_eq!(
            validate(&json!({"model": "m", "messages": []})),
            Err(ValidationError::MissingRequiredData)
        );
        assert_eq!(
            validate(&json!({"model": "m", "messages": "hi"})),
            Err(ValidationError::MissingRequiredData)
        );
    }

    #[test]
    fn test_non_object_payload() {
        assert_eq!(validate(&json!(42)), Err(ValidationError::MissingRequiredData));
    }

    #[test]
    fn test_malformed_message_role() {
        let err = validate(&json!({
            "model": "m",
            "messages": [{"role": "robot", "content": "hi"}]
        }))
        .unwrap_err();

        assert!(matches!(err, ValidationError::Malformed(_)));
        assert!(err.to_string().starts_with("Invalid request payload: "));
    }
}
