//! Redundant-execution consensus for outbound HTTP calls.
//!
//! Every outbound call may be executed by several independent replicas. The
//! executor waits for all of them and only accepts a result if the aggregation
//! policy agrees. There is no retry: a failed or divergent round is a failed call.

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::codec::{self, CodecError};

/// Logical description of one outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Request body in the base64 transport envelope.
    pub body: String,
}

/// What a replica observed. Compared byte-for-byte across replicas, so only
/// the status and body are kept (headers like `Date` differ per call).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Envelope(#[from] CodecError),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("no replicas configured")]
    NoReplicas,
    #[error("replica {replica} failed: {source}")]
    Replica {
        replica: usize,
        #[source]
        source: TransportError,
    },
    #[error("consensus failure: replica {replica} disagreed with replica 0")]
    Divergence { replica: usize },
}

/// Executes a single request once.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequestSpec) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport. Unwraps the base64 envelope before putting the body on the wire.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &HttpRequestSpec) -> Result<HttpResponse, TransportError> {
        let body = codec::decode(&request.body)?;

        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.body(body).send().await?;
        let status_code = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        debug!("{} {} -> {}", request.method, request.url, status_code);
        Ok(HttpResponse { status_code, body })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsensusPolicy {
    /// All replicas must succeed with byte-identical results.
    #[default]
    RequireIdentical,
}

impl ConsensusPolicy {
    pub fn aggregate(
        &self,
        results: Vec<Result<HttpResponse, TransportError>>,
    ) -> Result<HttpResponse, ConsensusError> {
        match self {
            ConsensusPolicy::RequireIdentical => {
                let mut canonical: Option<HttpResponse> = None;

                for (replica, result) in results.into_iter().enumerate() {
                    let response =
                        result.map_err(|source| ConsensusError::Replica { replica, source })?;

                    match &canonical {
                        None => canonical = Some(response),
                        Some(agreed) if *agreed == response => {}
                        Some(_) => return Err(ConsensusError::Divergence { replica }),
                    }
                }

                canonical.ok_or(ConsensusError::NoReplicas)
            }
        }
    }
}

pub struct ConsensusExecutor {
    transport: Arc<dyn Transport>,
    replicas: usize,
    policy: ConsensusPolicy,
}

impl ConsensusExecutor {
    pub fn new(transport: Arc<dyn Transport>, replicas: usize) -> Self {
        Self {
            transport,
            replicas,
            policy: ConsensusPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ConsensusPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Run `request` on every replica concurrently and aggregate once all have returned.
    pub async fn execute(&self, request: &HttpRequestSpec) -> Result<HttpResponse, ConsensusError> {
        if self.replicas == 0 {
            return Err(ConsensusError::NoReplicas);
        }

        let rounds = (0..self.replicas).map(|_| self.transport.send(request));
        let results = join_all(rounds).await;

        self.policy.aggregate(results).map_err(|e| {
            warn!("⚠️ {} {}: {}", request.method, request.url, e);
            e
        })
    }
}
