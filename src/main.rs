// =============================================================================
// Pulsar Curve Sniper — Main Entry Point
// =============================================================================
//
// Wires the stream source, oracle, safety gate, token registry and position
// engine together, then hands control to the coordinator. The engine trades
// simulated positions only; there is no signing and no order submission.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod config;
mod coordinator;
mod events;
mod exit;
mod missed;
mod oracle;
mod position;
mod safety;
mod stream;
mod token;
mod types;
mod wallet;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::SniperConfig;
use crate::coordinator::{Coordinator, INGRESS_CAPACITY};
use crate::events::EventBus;
use crate::missed::MissedOpportunityTracker;
use crate::oracle::PriceOracle;
use crate::position::PositionEngine;
use crate::safety::SafetyGate;
use crate::types::{ControlCommand, IngressEvent};
use crate::wallet::SimWallet;

/// Default ingress stream endpoint; override with PULSAR_STREAM_URL.
const DEFAULT_STREAM_URL: &str = "wss://pumpportal.fun/api/data";
/// On-disk location of the missed-opportunity log.
const MISSED_OPPORTUNITY_DIR: &str = "logs/missed_opportunities";
/// Configuration file, loaded at startup and saved on shutdown.
const CONFIG_PATH: &str = "sniper_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Pulsar Curve Sniper — Starting Up                ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config = SniperConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        SniperConfig::default()
    });
    let config = Arc::new(config);

    let stream_url =
        std::env::var("PULSAR_STREAM_URL").unwrap_or_else(|_| DEFAULT_STREAM_URL.into());
    let oracle_url = std::env::var("PULSAR_ORACLE_URL").ok();

    info!(
        stream_url = %stream_url,
        pump_pct = config.thresholds.pump_pct,
        drawdown_pct = config.thresholds.drawdown_pct,
        balance_sol = config.starting_balance_sol,
        "engine configured (simulated trading)"
    );

    // ── 2. Build shared components ───────────────────────────────────────
    let bus = EventBus::new();
    let oracle = Arc::new(PriceOracle::new(&config.oracle, oracle_url));
    let wallet = Arc::new(SimWallet::new(config.starting_balance_sol));
    let positions = Arc::new(PositionEngine::new(config.clone(), wallet, bus.clone()));
    let missed = MissedOpportunityTracker::new(MISSED_OPPORTUNITY_DIR);
    let gate = SafetyGate::default();

    let (ingress_tx, ingress_rx) = mpsc::channel::<IngressEvent>(INGRESS_CAPACITY);
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    // ── 3. Stream client (with reconnect loop) ───────────────────────────
    let stream_events = ingress_tx.clone();
    tokio::spawn(async move {
        let mut commands = command_rx;
        let mut subscribed = HashSet::new();
        loop {
            if let Err(e) =
                stream::run_stream(&stream_url, stream_events.clone(), &mut commands, &mut subscribed)
                    .await
            {
                error!(error = %e, "stream error — reconnecting in 5s");
            } else {
                // Clean return: the channel closed or the stream ended.
                if stream_events.is_closed() {
                    break;
                }
                warn!("stream ended — reconnecting in 5s");
            }
            tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
        }
    });

    // ── 4. Oracle refresh loop ───────────────────────────────────────────
    tokio::spawn(oracle::run_oracle_loop(oracle.clone(), ingress_tx.clone()));

    // ── 5. Dashboard command reader (stdin) ──────────────────────────────
    let command_events = ingress_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match ControlCommand::parse(&line) {
                Some(command) => {
                    let quit = command == ControlCommand::Quit;
                    if command_events
                        .send(IngressEvent::Command(command))
                        .await
                        .is_err()
                        || quit
                    {
                        break;
                    }
                }
                None => {
                    if !line.trim().is_empty() {
                        warn!(input = %line, "unrecognised command (stop | resume | quit)");
                    }
                }
            }
        }
    });

    // ── 6. Coordinator ───────────────────────────────────────────────────
    let coordinator = Coordinator::new(
        config.clone(),
        oracle,
        gate,
        positions,
        bus,
        command_tx,
        missed,
    );
    let mut coordinator_task = tokio::spawn(coordinator.run(ingress_rx));

    info!("all subsystems running — commands: stop | resume | quit (or Ctrl+C)");

    // ── 7. Graceful shutdown ─────────────────────────────────────────────
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown signal received — stopping gracefully");
            let _ = ingress_tx.send(IngressEvent::Command(ControlCommand::Quit)).await;
            let _ = (&mut coordinator_task).await;
        }
        result = &mut coordinator_task => {
            if let Err(e) = result {
                error!(error = %e, "coordinator task failed");
            }
        }
    }

    if let Err(e) = config.save(CONFIG_PATH) {
        error!(error = %e, "failed to save config on shutdown");
    }

    info!("Pulsar Curve Sniper shut down complete.");
    Ok(())
}
