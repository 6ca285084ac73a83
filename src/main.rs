use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trade_signal_relay::config::Config;
use trade_signal_relay::consensus::HttpTransport;
use trade_signal_relay::orchestrator::Orchestrator;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trade_signal_relay=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    print_banner(&config);

    let transport = Arc::new(HttpTransport::new(config.consensus.http_timeout()));
    let orchestrator = Orchestrator::from_config(&config, transport);

    // One-shot request trigger: payload file on the command line
    if let Some(path) = std::env::args().nth(1) {
        let payload = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read payload file {}", path))?;

        let output = orchestrator.handle_request(&payload).await;
        println!("{}", output);
        return Ok(());
    }

    // Otherwise act as the scheduled trigger until Ctrl+C
    let mut ticker = interval(Duration::from_secs(config.trigger.tick_interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let ack = orchestrator.on_schedule();
                info!("⏰ Scheduled tick: {}", ack);
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("🛑 Shutdown requested");
                break;
            }
        }
    }

    Ok(())
}

fn print_banner(config: &Config) {
    println!("\n╔═══════════════════════════════════════════════════════════╗");
    println!("║           Trade Signal Relay (OpenRouter)                 ║");
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!();
    println!("🧠 LLM endpoint: {}", config.llm.endpoint);
    if config.callback.is_configured() {
        println!("📤 Callback: {}", config.callback.url);
    } else {
        println!("📤 Callback: disabled");
    }
    println!("🔁 Consensus replicas: {}", config.consensus.replicas);
    println!("⏱️  Schedule: {} (local tick every {}s)", config.trigger.schedule, config.trigger.tick_interval_secs);
    println!(
        "🔑 Authorized caller key: {}",
        if config.trigger.authorized_key.is_some() { "set" } else { "not set" }
    );
    println!();
}
