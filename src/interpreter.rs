use tracing::{debug, warn};

use crate::types::{InterpretedResponse, TradingDecisionResponse};

/// Best-effort parse of a completion into a [`TradingDecisionResponse`].
///
/// Never fails: anything that does not parse strictly is kept verbatim as
/// `{"raw_response": text}`. Callers must accept either shape.
pub fn interpret(completion: &str) -> InterpretedResponse {
    match serde_json::from_str::<TradingDecisionResponse>(completion) {
        Ok(decision) => {
            debug!(
                "🧠 Parsed {} trade decision(s)",
                decision.trade_decisions.len()
            );
            InterpretedResponse::Decision(decision)
        }
        Err(e) => {
            warn!("⚠️ Completion is not a trading decision ({}), keeping raw text", e);
            InterpretedResponse::Raw {
                raw_response: completion.to_string(),
            }
        }
    }
}
