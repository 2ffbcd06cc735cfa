// =============================================================================
// Holder Book — per-wallet balances, trade logs, and distribution metrics
// =============================================================================
//
// Each trader key maps to a record carrying its balance, the balance it first
// appeared with, and a rolling 30-minute trade log. The log is the source of
// truth for every windowed volume metric: `recent_volume(W)` is exactly the
// sum of in-window trade volumes across all holders.
//
// Eviction rule: a holder whose balance drops to zero or below is removed
// unless it traded within the last 30 minutes. A periodic sweep prunes trade
// records past the retention horizon.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::Side;

/// How long individual trade records are retained.
pub const TRADE_RETENTION_MS: i64 = 30 * 60 * 1000;

/// One trade attributed to a holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderTrade {
    /// Signed token amount: positive for buys, negative for sells.
    pub amount: f64,
    pub volume_sol: f64,
    pub volume_usd: f64,
    /// Price change vs the token's previous trade, percent.
    pub price_change: f64,
    pub timestamp: i64,
    pub side: Side,
}

/// Per-wallet record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holder {
    pub balance: f64,
    pub initial_balance: f64,
    pub first_seen: i64,
    pub last_active: i64,
    pub is_creator: bool,
    pub trades: Vec<HolderTrade>,
}

/// All holders of one token.
#[derive(Debug, Default)]
pub struct HolderBook {
    holders: HashMap<String, Holder>,
    creator: Option<String>,
}

impl HolderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the creator wallet, typically from the create event's
    /// initial buy.
    pub fn set_creator(&mut self, key: impl Into<String>, initial_balance: f64, now: i64) {
        let key = key.into();
        self.holders.insert(
            key.clone(),
            Holder {
                balance: initial_balance,
                initial_balance,
                first_seen: now,
                last_active: now,
                is_creator: true,
                trades: Vec::new(),
            },
        );
        self.creator = Some(key);
    }

    /// Record a trade: create the holder on first sight (initial balance =
    /// post-trade balance), append the trade record, update the balance.
    #[allow(clippy::too_many_arguments)]
    pub fn record_trade(
        &mut self,
        key: &str,
        side: Side,
        token_amount: f64,
        new_token_balance: f64,
        volume_sol: f64,
        volume_usd: f64,
        price_change: f64,
        now: i64,
    ) {
        let is_creator = self.creator.as_deref() == Some(key);
        let holder = self.holders.entry(key.to_string()).or_insert_with(|| Holder {
            balance: new_token_balance,
            initial_balance: new_token_balance,
            first_seen: now,
            last_active: now,
            is_creator,
            trades: Vec::new(),
        });

        let signed = match side {
            Side::Buy => token_amount,
            Side::Sell => -token_amount,
        };
        holder.trades.push(HolderTrade {
            amount: signed,
            volume_sol,
            volume_usd,
            price_change,
            timestamp: now,
            side,
        });
        holder.balance = new_token_balance;
        holder.last_active = now;
    }

    /// Non-trade balance update: positive balances upsert; a zero balance
    /// evicts unless the holder traded within the retention window.
    pub fn update_balance(&mut self, key: &str, new_balance: f64, now: i64) {
        if new_balance > 0.0 {
            let holder = self.holders.entry(key.to_string()).or_insert_with(|| Holder {
                balance: new_balance,
                initial_balance: new_balance,
                first_seen: now,
                last_active: now,
                is_creator: false,
                trades: Vec::new(),
            });
            holder.balance = new_balance;
            holder.last_active = now;
            return;
        }

        let evict = match self.holders.get_mut(key) {
            Some(holder) => {
                holder.balance = new_balance;
                !holder
                    .trades
                    .iter()
                    .any(|t| now - t.timestamp <= TRADE_RETENTION_MS)
            }
            None => false,
        };
        if evict {
            self.holders.remove(key);
            debug!(holder = %key, "evicted zero-balance holder");
        }
    }

    /// Periodic sweep: prune expired trade records from every holder, then
    /// apply the eviction rule to drained zero-balance holders.
    pub fn sweep(&mut self, now: i64) {
        for holder in self.holders.values_mut() {
            holder
                .trades
                .retain(|t| now - t.timestamp <= TRADE_RETENTION_MS);
        }
        self.holders
            .retain(|_, h| h.balance > 0.0 || !h.trades.is_empty());
    }

    // -------------------------------------------------------------------------
    // Metrics
    // -------------------------------------------------------------------------

    pub fn holder_count(&self) -> usize {
        self.holders.len()
    }

    pub fn get(&self, key: &str) -> Option<&Holder> {
        self.holders.get(key)
    }

    /// Sum of all holder balances.
    pub fn total_balance(&self) -> f64 {
        self.holders.values().map(|h| h.balance).sum()
    }

    /// Sum of |fiat volume| across all trades newer than `now - window_ms`.
    pub fn recent_volume(&self, window_ms: i64, now: i64) -> f64 {
        self.trades_in_window(window_ms, now)
            .map(|t| t.volume_usd.abs())
            .sum()
    }

    /// Share of fiat volume classified as buying over the window, percent.
    /// A trade counts as a buy when its recorded price change is >= 0.
    pub fn buy_pressure(&self, window_ms: i64, now: i64) -> f64 {
        let mut buy = 0.0;
        let mut total = 0.0;
        for t in self.trades_in_window(window_ms, now) {
            let v = t.volume_usd.abs();
            total += v;
            if t.price_change >= 0.0 {
                buy += v;
            }
        }
        if total > 0.0 {
            buy / total * 100.0
        } else {
            0.0
        }
    }

    /// Fraction of in-window trades that accumulated (bought), in [0, 1].
    pub fn accumulating_trade_fraction(&self, window_ms: i64, now: i64) -> f64 {
        let mut buys = 0usize;
        let mut total = 0usize;
        for t in self.trades_in_window(window_ms, now) {
            total += 1;
            if t.amount > 0.0 {
                buys += 1;
            }
        }
        if total > 0 {
            buys as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Largest single-wallet share of in-window fiat volume, percent.
    pub fn max_wallet_volume_share(&self, window_ms: i64, now: i64) -> f64 {
        let total = self.recent_volume(window_ms, now);
        if total <= 0.0 {
            return 0.0;
        }
        let max_wallet = self
            .holders
            .values()
            .map(|h| {
                h.trades
                    .iter()
                    .filter(|t| now - t.timestamp <= window_ms)
                    .map(|t| t.volume_usd.abs())
                    .sum::<f64>()
            })
            .fold(0.0_f64, f64::max);
        max_wallet / total * 100.0
    }

    /// Combined share of the `n` largest balances, as a percentage of total
    /// supply (holder balances plus the curve reserve). 0 when supply is 0.
    pub fn top_holder_concentration(&self, n: usize, token_reserve: f64) -> f64 {
        let supply = self.total_balance() + token_reserve;
        if supply <= 0.0 {
            return 0.0;
        }
        let mut balances: Vec<f64> = self.holders.values().map(|h| h.balance).collect();
        balances.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let top: f64 = balances.iter().take(n).sum();
        top / supply * 100.0
    }

    /// How much of the creator's initial allocation has been sold, percent.
    pub fn creator_sell_percentage(&self) -> f64 {
        let Some(creator) = self.creator.as_deref().and_then(|k| self.holders.get(k)) else {
            return 0.0;
        };
        if creator.initial_balance <= 0.0 {
            return 0.0;
        }
        ((creator.initial_balance - creator.balance) / creator.initial_balance * 100.0).max(0.0)
    }

    fn trades_in_window(&self, window_ms: i64, now: i64) -> impl Iterator<Item = &HolderTrade> {
        self.holders
            .values()
            .flat_map(|h| h.trades.iter())
            .filter(move |t| now - t.timestamp <= window_ms)
    }
}
