//! Trigger handling.
//!
//! Request path: `Idle → Validating → Dispatching → Interpreting → Forwarding → Done`,
//! with early exits to `Done` on validation failure or a failed model call.
//! Every path returns a value; nothing raises past this boundary.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::consensus::{ConsensusExecutor, Transport};
use crate::forwarder::{CallbackForwarder, CallbackSink};
use crate::gateway::{CompletionProvider, ModelGateway};
use crate::interpreter::interpret;
use crate::types::{ForwardResult, InterpretedResponse};
use crate::validator::{validate, ValidationError};

pub const HEARTBEAT_ACK: &str = "Hello world!";
pub const LLM_FAILURE_MESSAGE: &str = "Failed to get response from LLM";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Validating,
    Dispatching,
    Interpreting,
    Forwarding,
    Done,
}

#[derive(Debug, Serialize)]
struct RequestSummary<'a> {
    llm_response: &'a InterpretedResponse,
    server_callback: &'a ForwardResult,
}

pub struct Orchestrator {
    completions: Box<dyn CompletionProvider>,
    callback: Option<Box<dyn CallbackSink>>,
}

impl Orchestrator {
    pub fn new(
        completions: Box<dyn CompletionProvider>,
        callback: Option<Box<dyn CallbackSink>>,
    ) -> Self {
        Self {
            completions,
            callback,
        }
    }

    /// Wire the real gateway and, if a callback URL is set, the forwarder.
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let executor = || ConsensusExecutor::new(transport.clone(), config.consensus.replicas);

        let gateway = ModelGateway::new(&config.llm, executor());
        let callback = if config.callback.is_configured() {
            info!("🔗 Callback forwarding enabled: {}", config.callback.url.trim());
            Some(Box::new(CallbackForwarder::new(config.callback.url.trim(), executor()))
                as Box<dyn CallbackSink>)
        } else {
            info!("📭 No callback URL configured, completions are returned as-is");
            None
        };

        Self::new(Box::new(gateway), callback)
    }

    /// Scheduled tick.
    pub fn on_schedule(&self) -> String {
        info!("💓 Heartbeat");
        HEARTBEAT_ACK.to_string()
    }

    /// Inbound request trigger. `payload` is the JSON body as delivered.
    pub async fn handle_request(&self, payload: &[u8]) -> String {
        let invocation = Uuid::new_v4();
        self.run_pipeline(payload)
            .instrument(info_span!("request", %invocation))
            .await
    }

    async fn run_pipeline(&self, payload: &[u8]) -> String {
        let mut stage = PipelineStage::Idle;

        transition(&mut stage, PipelineStage::Validating);
        let request = match serde_json::from_slice::<Value>(payload)
            .map_err(|e| ValidationError::Malformed(e.to_string()))
            .and_then(|value| validate(&value))
        {
            Ok(request) => request,
            Err(e) => {
                transition(&mut stage, PipelineStage::Done);
                return error_json(&e.to_string());
            }
        };

        transition(&mut stage, PipelineStage::Dispatching);
        let Some(completion) = self.completions.complete(&request).await else {
            transition(&mut stage, PipelineStage::Done);
            return error_json(LLM_FAILURE_MESSAGE);
        };

        transition(&mut stage, PipelineStage::Interpreting);
        let interpreted = interpret(&completion);

        let Some(callback) = &self.callback else {
            transition(&mut stage, PipelineStage::Done);
            return completion;
        };

        transition(&mut stage, PipelineStage::Forwarding);
        let forwarded = callback.forward(&interpreted).await;
        transition(&mut stage, PipelineStage::Done);

        let summary = RequestSummary {
            llm_response: &interpreted,
            server_callback: &forwarded,
        };
        serde_json::to_string(&summary).unwrap_or_else(|e| error_json(&e.to_string()))
    }
}

fn transition(stage: &mut PipelineStage, next: PipelineStage) {
    debug!("{:?} -> {:?}", stage, next);
    *stage = next;
}

fn error_json(message: &str) -> String {
    json!({ "error": message }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModelRequest;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const DECISION: &str = r#"{"reasoning":"ok","trade_decisions":[{"asset":"BTC","action":"buy","allocation_usd":100,"tp_price":null,"sl_price":null,"exit_plan":"x","rationale":"y"}]}"#;
    const PAYLOAD: &[u8] = br#"{"model":"m","messages":[{"role":"user","content":"hi"}]}"#;

    struct StubProvider {
        reply: Option<String>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CompletionProvider for StubProvider {
        async fn complete(&self, _request: &ModelRequest) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    struct StubSink {
        reply: ForwardResult,
        seen: Arc<Mutex<Vec<InterpretedResponse>>>,
    }

    #[async_trait]
    impl CallbackSink for StubSink {
        async fn forward(&self, response: &InterpretedResponse) -> ForwardResult {
            self.seen.lock().unwrap().push(response.clone());
            self.reply.clone()
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        provider_calls: Arc<AtomicUsize>,
        forwarded: Arc<Mutex<Vec<InterpretedResponse>>>,
    }

    fn harness(reply: Option<&str>, sink_reply: Option<ForwardResult>) -> Harness {
        let provider_calls = Arc::new(AtomicUsize::new(0));
        let forwarded = Arc::new(Mutex::new(Vec::new()));

        let provider = StubProvider {
            reply: reply.map(str::to_string),
            calls: provider_calls.clone(),
        };
        let sink = sink_reply.map(|reply| {
            Box::new(StubSink {
                reply,
                seen: forwarded.clone(),
            }) as Box<dyn CallbackSink>
        });

        Harness {
            orchestrator: Orchestrator::new(Box::new(provider), sink),
            provider_calls,
            forwarded,
        }
    }

    fn parse(output: &str) -> Value {
        serde_json::from_str(output).unwrap()
    }

    #[test]
    fn test_heartbeat() {
        let h = harness(None, None);
        assert_eq!(h.orchestrator.on_schedule(), "Hello world!");
        assert_eq!(h.provider_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_fields_short_circuit() {
        let h = harness(Some(DECISION), Some(ForwardResult::delivered("ack")));

        for payload in [
            br#"{"messages":[{"role":"user","content":"hi"}]}"#.as_slice(),
            br#"{"model":"m","messages":[]}"#.as_slice(),
        ] {
            let output = h.orchestrator.handle_request(payload).await;
            assert_eq!(
                parse(&output),
                json!({"error": "Missing required data: model and messages are required"})
            );
        }

        assert_eq!(h.provider_calls.load(Ordering::SeqCst), 0);
        assert!(h.forwarded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_payload() {
        let h = harness(Some(DECISION), None);

        let output = parse(&h.orchestrator.handle_request(b"\xff not json").await);

        assert!(output["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request payload: "));
        assert_eq!(h.provider_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_llm_failure() {
        let h = harness(None, Some(ForwardResult::delivered("ack")));

        let output = h.orchestrator.handle_request(PAYLOAD).await;

        assert_eq!(parse(&output), json!({"error": "Failed to get response from LLM"}));
        assert_eq!(h.provider_calls.load(Ordering::SeqCst), 1);
        assert!(h.forwarded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decision_forwarded() {
        let h = harness(Some(DECISION), Some(ForwardResult::delivered("ack")));

        let output = parse(&h.orchestrator.handle_request(PAYLOAD).await);

        assert_eq!(
            output,
            json!({
                "llm_response": {
                    "reasoning": "ok",
                    "trade_decisions": [{
                        "asset": "BTC",
                        "action": "buy",
                        "allocation_usd": 100.0,
                        "tp_price": null,
                        "sl_price": null,
                        "exit_plan": "x",
                        "rationale": "y"
                    }]
                },
                "server_callback": {"success": true, "response": "ack"}
            })
        );
        assert_eq!(h.forwarded.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_raw_text_forwarded_and_failure_reported_inline() {
        let h = harness(
            Some("I would buy BTC"),
            Some(ForwardResult::failed("HTTP 500: boom")),
        );

        let output = parse(&h.orchestrator.handle_request(PAYLOAD).await);

        assert_eq!(
            output,
            json!({
                "llm_response": {"raw_response": "I would buy BTC"},
                "server_callback": {"success": false, "error": "HTTP 500: boom"}
            })
        );
    }

    #[tokio::test]
    async fn test_no_callback_returns_completion_verbatim() {
        let h = harness(Some(DECISION), None);

        let output = h.orchestrator.handle_request(PAYLOAD).await;

        assert_eq!(output, DECISION);
        assert_eq!(h.provider_calls.load(Ordering::SeqCst), 1);
    }

    fn vars(callback: &'static str) -> impl Fn(&str) -> Option<String> {
        move |key| match key {
            "OPENROUTER_API_KEY" => Some("k".to_string()),
            "CALLBACK_URL" => Some(callback.to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_from_config_wires_callback_only_when_set() {
        use crate::consensus::test_support::ScriptedTransport;

        let transport = Arc::new(ScriptedTransport::new(vec![]));

        let with = Config::from_lookup(vars("https://example.com/hook")).unwrap();
        assert!(Orchestrator::from_config(&with, transport.clone()).callback.is_some());

        let without = Config::from_lookup(vars("")).unwrap();
        assert!(Orchestrator::from_config(&without, transport).callback.is_none());
    }
}
