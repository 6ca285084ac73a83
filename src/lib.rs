//! Trigger-driven relay between an inbound decision request, an OpenRouter
//! chat-completion call and a downstream callback.

pub mod codec;
pub mod config;
pub mod consensus;
pub mod forwarder;
pub mod gateway;
pub mod interpreter;
pub mod orchestrator;
pub mod types;
pub mod validator;

pub use config::Config;
pub use consensus::{ConsensusExecutor, ConsensusPolicy, HttpTransport, Transport};
pub use forwarder::{CallbackForwarder, CallbackSink};
pub use gateway::{CompletionProvider, ModelGateway};
pub use orchestrator::{Orchestrator, PipelineStage};
pub use types::{
    ForwardResult, InterpretedResponse, Message, ModelRequest, Role, Tool, TradeAction,
    TradeDecision, TradingDecisionResponse,
};
