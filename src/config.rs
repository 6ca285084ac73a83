use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::gateway::OPENROUTER_CHAT_COMPLETIONS_URL;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub callback: CallbackConfig,
    pub trigger: TriggerConfig,
    pub consensus: ConsensusConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    pub api_key: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CallbackConfig {
    /// Empty means no downstream callback.
    pub url: String,
}

impl CallbackConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TriggerConfig {
    /// Cron expression handed to the external scheduler.
    pub schedule: String,
    /// Tick period used by the local driver in `main`.
    pub tick_interval_secs: u64,
    /// Public key the external trigger delivery authorizes inbound requests against.
    pub authorized_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsensusConfig {
    pub replicas: usize,
    pub http_timeout_secs: u64,
}

impl ConsensusConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source. `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENROUTER_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            anyhow::bail!("OPENROUTER_API_KEY environment variable required");
        }

        let llm = LlmConfig {
            api_key,
            endpoint: lookup("OPENROUTER_URL")
                .unwrap_or_else(|| OPENROUTER_CHAT_COMPLETIONS_URL.to_string()),
        };

        let callback = CallbackConfig {
            url: lookup("CALLBACK_URL").unwrap_or_default(),
        };
        if callback.is_configured() {
            url::Url::parse(callback.url.trim())
                .with_context(|| format!("Invalid CALLBACK_URL: {}", callback.url))?;
        }

        let trigger = TriggerConfig {
            schedule: lookup("SCHEDULE").unwrap_or_else(|| "0 */10 * * * *".to_string()),
            tick_interval_secs: lookup("TICK_INTERVAL_SECS")
                .unwrap_or_else(|| "600".to_string())
                .parse()
                .unwrap_or(600),
            authorized_key: lookup("AUTHORIZED_KEY").filter(|k| !k.trim().is_empty()),
        };

        let consensus = ConsensusConfig {
            replicas: lookup("CONSENSUS_REPLICAS")
                .unwrap_or_else(|| "1".to_string())
                .parse::<usize>()
                .unwrap_or(1)
                .max(1),
            http_timeout_secs: lookup("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|| "60".to_string())
                .parse()
                .unwrap_or(60),
        };

        Ok(Config {
            llm,
            callback,
            trigger,
            consensus,
        })
    }
}
