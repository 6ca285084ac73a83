use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::codec;
use crate::consensus::{ConsensusExecutor, HttpRequestSpec};
use crate::types::{ForwardResult, InterpretedResponse};

const JSON_CONTENT_TYPE: &str = "application/json";

#[async_trait]
pub trait CallbackSink: Send + Sync {
    /// Deliver the interpreted response downstream. Never fails; outcome is in-band.
    async fn forward(&self, response: &InterpretedResponse) -> ForwardResult;
}

#[derive(Debug, Serialize)]
struct CallbackPayload<'a> {
    llm_response: &'a InterpretedResponse,
    timestamp: String,
}

pub struct CallbackForwarder {
    url: String,
    headers: BTreeMap<String, String>,
    executor: ConsensusExecutor,
}

impl CallbackForwarder {
    pub fn new(url: impl Into<String>, executor: ConsensusExecutor) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            executor,
        }
    }

    /// Extra headers sent with every delivery.
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn build_request(
        &self,
        response: &InterpretedResponse,
        timestamp: DateTime<Utc>,
        extra_headers: &BTreeMap<String, String>,
    ) -> Result<HttpRequestSpec, serde_json::Error> {
        let payload = CallbackPayload {
            llm_response: response,
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let body = serde_json::to_vec(&payload)?;

        Ok(HttpRequestSpec {
            method: Method::POST,
            url: self.url.clone(),
            headers: merge_headers(extra_headers),
            body: codec::encode(&body),
        })
    }

    /// Deliver with headers supplied for this call only, on top of the configured ones.
    pub async fn deliver(
        &self,
        response: &InterpretedResponse,
        extra_headers: &BTreeMap<String, String>,
    ) -> ForwardResult {
        let mut headers = self.headers.clone();
        headers.extend(extra_headers.iter().map(|(k, v)| (k.clone(), v.clone())));

        let spec = match self.build_request(response, Utc::now(), &headers) {
            Ok(spec) => spec,
            Err(e) => return ForwardResult::failed(format!("Failed to build callback: {}", e)),
        };

        let result = match self.executor.execute(&spec).await {
            Ok(reply) if reply.is_success() => ForwardResult::delivered(reply.body_text()),
            Ok(reply) => {
                ForwardResult::failed(format!("HTTP {}: {}", reply.status_code, reply.body_text()))
            }
            Err(e) => ForwardResult::failed(e.to_string()),
        };

        if result.success {
            info!("📤 Callback delivered to {}", self.url);
        } else {
            warn!(
                "⚠️ Callback to {} failed: {}",
                self.url,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
        result
    }
}

#[async_trait]
impl CallbackSink for CallbackForwarder {
    async fn forward(&self, response: &InterpretedResponse) -> ForwardResult {
        self.deliver(response, &BTreeMap::new()).await
    }
}

/// Caller headers on top of `Content-Type: application/json`. A caller may
/// replace the content type but cannot drop or blank it.
pub fn merge_headers(extra: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    let mut content_type = JSON_CONTENT_TYPE.to_string();

    for (name, value) in extra {
        if name.eq_ignore_ascii_case("content-type") {
            if !value.trim().is_empty() {
                content_type = value.clone();
            }
        } else {
            headers.insert(name.clone(), value.clone());
        }
    }

    headers.insert("Content-Type".to_string(), content_type);
    headers
}
