use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

use crate::codec;
use crate::config::LlmConfig;
use crate::consensus::{ConsensusExecutor, HttpRequestSpec, HttpResponse};
use crate::types::ModelRequest;

pub const OPENROUTER_CHAT_COMPLETIONS_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// One logical chat-completion call. `None` on any failure.
    async fn complete(&self, request: &ModelRequest) -> Option<String>;
}

pub struct ModelGateway {
    api_key: String,
    endpoint: String,
    executor: ConsensusExecutor,
}

impl ModelGateway {
    pub fn new(config: &LlmConfig, executor: ConsensusExecutor) -> Self {
        Self {
            api_key: config.api_key.clone(),
            endpoint: config.endpoint.clone(),
            executor,
        }
    }

    pub fn build_request(&self, request: &ModelRequest) -> Result<HttpRequestSpec, serde_json::Error> {
        let body = serde_json::to_vec(request)?;

        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", self.api_key));
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        Ok(HttpRequestSpec {
            method: Method::POST,
            url: self.endpoint.clone(),
            headers,
            body: codec::encode(&body),
        })
    }

    /// Returns the completion text, or a JSON error envelope describing what went wrong.
    pub async fn fetch_completion(&self, request: &ModelRequest) -> String {
        let spec = match self.build_request(request) {
            Ok(spec) => spec,
            Err(e) => return error_envelope(format!("Failed to build request: {}", e)),
        };

        debug!(
            "Dispatching {} message(s) to {} across {} replica(s)",
            request.messages.len(),
            self.endpoint,
            self.executor.replicas()
        );

        match self.executor.execute(&spec).await {
            Ok(response) => extract_completion(&response),
            Err(e) => error_envelope(e.to_string()),
        }
    }
}

#[async_trait]
impl CompletionProvider for ModelGateway {
    async fn complete(&self, request: &ModelRequest) -> Option<String> {
        let text = self.fetch_completion(request).await;

        if let Some(err) = embedded_error(&text) {
            error!("❌ LLM request failed: {}", err);
            return None;
        }

        info!("✅ Received completion ({} chars)", text.len());
        Some(text)
    }
}

/// Pull `choices[0].message.content` out of a provider response.
pub fn extract_completion(response: &HttpResponse) -> String {
    let body = response.body_text();

    if response.status_code != 200 {
        return error_envelope(format!("HTTP {}: {}", response.status_code, body));
    }

    let parsed: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => return error_envelope(format!("Failed to parse response: {}", e)),
    };

    match parsed
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        Some(content) => content.to_string(),
        None => json!({ "error": "No content in response", "raw": body }).to_string(),
    }
}

/// If `text` is a JSON object with an `error` key, return that value.
///
/// Known sharp edge: a genuine completion that happens to be a JSON object
/// with a top-level `error` field is treated as a failed request.
pub fn embedded_error(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(mut map)) => map.remove("error"),
        _ => None,
    }
}

fn error_envelope(message: String) -> String {
    json!({ "error": message }).to_string()
}
