// =============================================================================
// Price Oracle — cached SOL/USD rate with periodic refresh
// =============================================================================
//
// The cached rate is always available to the synchronous core; the refresh
// loop runs on its own task and pushes `PriceUpdate` events into the
// coordinator channel via `try_send` (a full channel drops the update; the
// next refresh carries the correction). Fetch failures fall back to the
// cached value, so the engine never blocks on the oracle.
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::OracleSettings;
use crate::types::IngressEvent;

/// Default HTTP endpoint (Coingecko simple-price shape).
const DEFAULT_ORACLE_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=solana&vs_currencies=usd";

pub struct PriceOracle {
    rate: RwLock<f64>,
    url: String,
    refresh_interval_ms: u64,
    client: reqwest::Client,
}

impl PriceOracle {
    pub fn new(settings: &OracleSettings, url_override: Option<String>) -> Self {
        let url = url_override.unwrap_or_else(|| DEFAULT_ORACLE_URL.to_string());
        info!(
            url = %url,
            default_rate = settings.default_sol_usd,
            "price oracle initialised"
        );
        Self {
            rate: RwLock::new(settings.default_sol_usd),
            url,
            refresh_interval_ms: settings.refresh_interval_ms,
            client: reqwest::Client::new(),
        }
    }

    /// Current SOL/USD rate (cached; never blocks).
    pub fn rate(&self) -> f64 {
        *self.rate.read()
    }

    pub fn sol_to_usd(&self, sol: f64) -> f64 {
        sol * self.rate()
    }

    pub fn usd_to_sol(&self, usd: f64) -> f64 {
        let rate = self.rate();
        if rate > 0.0 {
            usd / rate
        } else {
            0.0
        }
    }

    /// Install a new rate; returns `(old, percent_change)`.
    pub fn set_rate(&self, new_rate: f64) -> (f64, f64) {
        let mut rate = self.rate.write();
        let old = *rate;
        *rate = new_rate;
        let pct = if old > 0.0 {
            (new_rate - old) / old * 100.0
        } else {
            0.0
        };
        (old, pct)
    }

    /// One HTTP fetch of the rate.
    async fn fetch_rate(&self) -> Result<f64> {
        let body: serde_json::Value = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("oracle request failed")?
            .json()
            .await
            .context("oracle response was not JSON")?;

        let rate = body["solana"]["usd"]
            .as_f64()
            .context("oracle response missing solana.usd")?;
        if rate <= 0.0 {
            anyhow::bail!("oracle returned non-positive rate {rate}");
        }
        Ok(rate)
    }
}

/// Periodic refresh loop. Spawned once at engine startup; runs until the
/// ingress channel closes.
pub async fn run_oracle_loop(oracle: Arc<PriceOracle>, tx: mpsc::Sender<IngressEvent>) {
    let mut ticker =
        tokio::time::interval(tokio::time::Duration::from_millis(oracle.refresh_interval_ms));
    // First tick fires immediately; skip it so startup uses the default rate.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        match oracle.fetch_rate().await {
            Ok(new_rate) => {
                let (old_rate, percent_change) = oracle.set_rate(new_rate);
                if (new_rate - old_rate).abs() < f64::EPSILON {
                    continue;
                }
                debug!(new_rate, old_rate, percent_change, "oracle rate refreshed");

                // Droppable analytics: a full channel keeps its trades.
                let event = IngressEvent::PriceUpdate { new_rate, old_rate, percent_change };
                if let Err(e) = tx.try_send(event) {
                    match e {
                        mpsc::error::TrySendError::Full(_) => {
                            debug!("ingress channel full — price update dropped")
                        }
                        mpsc::error::TrySendError::Closed(_) => {
                            info!("ingress channel closed — oracle loop exiting");
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                // Keep serving the cached rate.
                warn!(error = %e, rate = oracle.rate(), "oracle fetch failed — using cached rate");
            }
        }
    }
}
