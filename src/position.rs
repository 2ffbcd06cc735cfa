// =============================================================================
// Position Engine — lifecycle for simulated bonding-curve positions
// =============================================================================
//
// Life-cycle:
//   Pending -> Open -> Closed
//
// Positions reference their token by mint only (no ownership of the token's
// lifetime). On every update the engine refreshes price extremes and P&L,
// feeds the exit evaluators, applies partial exits in place, and settles
// every exit with the wallet. A global trading gate pauses new entries;
// emergency close flattens everything and pauses.
//
// Thread-safety: all mutable state is behind `parking_lot::RwLock`.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SniperConfig;
use crate::events::{EngineEvent, EventBus, PositionEventPayload};
use crate::exit::{self, ExitReason, PositionView};
use crate::token::ohlcv::Candle;
use crate::wallet::{SimWallet, WalletError};

/// Capacity of the per-position price history.
const PRICE_HISTORY_CAP: usize = 60;
/// Capacity of the per-position volume and candle histories.
const SAMPLE_HISTORY_CAP: usize = 30;
/// Remaining fraction below which a position counts as fully exited.
const REMAINING_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Position model
// ---------------------------------------------------------------------------

/// Current status of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Pending,
    Open,
    Closed,
}

/// One entry in a position's trade log.
#[derive(Debug, Clone, Serialize)]
pub struct PositionTrade {
    pub kind: PositionTradeKind,
    pub price: f64,
    /// Token quantity moved by this trade.
    pub quantity: f64,
    pub fee: f64,
    /// Gross P&L realized by this trade (exits only).
    pub pnl: f64,
    pub timestamp: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionTradeKind {
    Entry,
    Exit,
}

/// A single tracked position.
#[derive(Debug, Clone)]
pub struct Position {
    /// Unique identifier (UUID v4).
    pub id: String,
    /// Weak reference to the token: identity only, no lifetime coupling.
    pub mint: String,
    pub status: PositionStatus,
    /// Original size, token quantity.
    pub size: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub highest_price: f64,
    pub lowest_price: f64,
    pub highest_unrealized_pnl: f64,
    pub unrealized_pnl_sol: f64,
    pub unrealized_pnl_usd: f64,
    pub unrealized_roi_pct: f64,
    pub realized_pnl_sol: f64,
    pub realized_pnl_usd: f64,
    pub trades: Vec<PositionTrade>,
    pub open_time: i64,
    pub close_time: Option<i64>,
    pub close_reason: Option<String>,
    /// Fraction of the original size still open, in [0, 1], non-increasing.
    pub remaining_fraction: f64,
    price_history: Vec<f64>,
    volume_history: Vec<(i64, f64)>,
    candle_history: Vec<Candle>,
    tiers_taken: Vec<bool>,
    profit_extension_armed: bool,
}

impl Position {
    fn payload(&self) -> PositionEventPayload {
        PositionEventPayload {
            position_id: self.id.clone(),
            mint: self.mint.clone(),
            size: self.size,
            entry_price: self.entry_price,
            current_price: self.current_price,
            remaining_fraction: self.remaining_fraction,
            unrealized_pnl_sol: self.unrealized_pnl_sol,
            realized_pnl_sol: self.realized_pnl_sol,
        }
    }

    fn view(&self, now: i64) -> PositionView<'_> {
        PositionView {
            entry_price: self.entry_price,
            current_price: self.current_price,
            highest_price: self.highest_price,
            open_time: self.open_time,
            now,
            price_history: &self.price_history,
            volume_history: &self.volume_history,
            candle_history: &self.candle_history,
            tiers_taken: &self.tiers_taken,
            profit_extension_armed: self.profit_extension_armed,
        }
    }
}

/// Why `open` was refused.
#[derive(Debug, Clone, PartialEq)]
pub enum OpenError {
    AlreadyOpen { mint: String },
    TradingPaused,
    SizeOutOfRange { cost: f64, min: f64, max: f64 },
    InsufficientFunds(WalletError),
}

impl std::fmt::Display for OpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyOpen { mint } => write!(f, "position already open for {mint}"),
            Self::TradingPaused => write!(f, "trading is paused"),
            Self::SizeOutOfRange { cost, min, max } => {
                write!(f, "position cost {cost:.4} outside [{min:.4}, {max:.4}]")
            }
            Self::InsufficientFunds(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for OpenError {}

/// Aggregate statistics over closed positions.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub total_closed: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub total_realized_pnl_sol: f64,
}

// ---------------------------------------------------------------------------
// Position Engine
// ---------------------------------------------------------------------------

/// Owns every live and closed position; settles with the wallet.
pub struct PositionEngine {
    config: Arc<SniperConfig>,
    wallet: Arc<SimWallet>,
    bus: EventBus,
    open: RwLock<HashMap<String, Position>>,
    closed: RwLock<Vec<Position>>,
    trading_enabled: RwLock<bool>,
}

impl PositionEngine {
    pub fn new(config: Arc<SniperConfig>, wallet: Arc<SimWallet>, bus: EventBus) -> Self {
        Self {
            config,
            wallet,
            bus,
            open: RwLock::new(HashMap::new()),
            closed: RwLock::new(Vec::new()),
            trading_enabled: RwLock::new(true),
        }
    }

    // -------------------------------------------------------------------------
    // Trading gate
    // -------------------------------------------------------------------------

    pub fn pause(&self) {
        *self.trading_enabled.write() = false;
        info!("trading paused");
    }

    pub fn resume(&self) {
        *self.trading_enabled.write() = true;
        info!("trading resumed");
    }

    pub fn is_paused(&self) -> bool {
        !*self.trading_enabled.read()
    }

    // -------------------------------------------------------------------------
    // Open
    // -------------------------------------------------------------------------

    /// Open a position of `size` tokens at `price`. The wallet is debited
    /// `size * price + buy_fee` up front; failure leaves everything
    /// untouched.
    pub fn open(&self, mint: &str, price: f64, size: f64, now: i64) -> Result<String, OpenError> {
        if self.is_paused() {
            return Err(OpenError::TradingPaused);
        }
        {
            let open = self.open.read();
            if open.contains_key(mint) {
                return Err(OpenError::AlreadyOpen { mint: mint.to_string() });
            }
        }

        let sizing = &self.config.position;
        let cost = size * price;
        if cost < sizing.min_position_size || cost > sizing.max_position_size {
            return Err(OpenError::SizeOutOfRange {
                cost,
                min: sizing.min_position_size,
                max: sizing.max_position_size,
            });
        }

        let fee = self.config.transaction_fees.buy;
        self.wallet
            .debit_open(size, price, fee)
            .map_err(OpenError::InsufficientFunds)?;

        let id = Uuid::new_v4().to_string();
        let tier_count = self.config.exit_strategies.tiered_take_profit.tiers.len();
        let mut position = Position {
            id: id.clone(),
            mint: mint.to_string(),
            status: PositionStatus::Pending,
            size,
            entry_price: price,
            current_price: price,
            highest_price: price,
            lowest_price: price,
            highest_unrealized_pnl: 0.0,
            unrealized_pnl_sol: 0.0,
            unrealized_pnl_usd: 0.0,
            unrealized_roi_pct: 0.0,
            realized_pnl_sol: 0.0,
            realized_pnl_usd: 0.0,
            trades: vec![PositionTrade {
                kind: PositionTradeKind::Entry,
                price,
                quantity: size,
                fee,
                pnl: 0.0,
                timestamp: now,
                reason: None,
            }],
            open_time: now,
            close_time: None,
            close_reason: None,
            remaining_fraction: 1.0,
            price_history: vec![price],
            volume_history: Vec::new(),
            candle_history: Vec::new(),
            tiers_taken: vec![false; tier_count],
            profit_extension_armed: false,
        };
        // Pending -> Open at the entry fill.
        position.status = PositionStatus::Open;

        info!(
            id = %id,
            mint,
            price,
            size,
            cost,
            fee,
            "position opened"
        );

        self.bus.publish(EngineEvent::PositionOpened { position: position.payload() });
        self.open.write().insert(mint.to_string(), position);
        Ok(id)
    }

    // -------------------------------------------------------------------------
    // Update
    // -------------------------------------------------------------------------

    /// Refresh market data for the position on `mint` and run the exit
    /// evaluators. Returns the close reason when this update fully exited
    /// the position.
    pub fn update(
        &self,
        mint: &str,
        price: f64,
        volume_usd: f64,
        latest_candle: Option<&Candle>,
        sol_usd: f64,
        now: i64,
    ) -> Option<String> {
        let signal = {
            let mut open = self.open.write();
            let position = open.get_mut(mint)?;

            position.current_price = price;
            position.highest_price = position.highest_price.max(price);
            position.lowest_price = position.lowest_price.min(price);

            let live_size = position.size * position.remaining_fraction;
            position.unrealized_pnl_sol = (price - position.entry_price) * live_size;
            position.unrealized_pnl_usd = position.unrealized_pnl_sol * sol_usd;
            position.unrealized_roi_pct = if position.entry_price > 0.0 {
                (price - position.entry_price) / position.entry_price * 100.0
            } else {
                0.0
            };
            position.highest_unrealized_pnl =
                position.highest_unrealized_pnl.max(position.unrealized_pnl_sol);

            push_capped(&mut position.price_history, price, PRICE_HISTORY_CAP);
            push_capped(&mut position.volume_history, (now, volume_usd), SAMPLE_HISTORY_CAP);
            if let Some(candle) = latest_candle {
                match position.candle_history.last_mut() {
                    Some(last) if last.timestamp == candle.timestamp => {
                        *last = candle.clone();
                    }
                    _ => push_capped(
                        &mut position.candle_history,
                        candle.clone(),
                        SAMPLE_HISTORY_CAP,
                    ),
                }
            }

            // Latch the time-extension once profit crosses its threshold.
            let ext = &self.config.exit_strategies.time_based_exit.profit_extension;
            if ext.enabled && position.unrealized_roi_pct >= ext.profit_threshold_pct {
                position.profit_extension_armed = true;
            }

            self.bus.publish(EngineEvent::PositionUpdated { position: position.payload() });

            exit::evaluate(&position.view(now), &self.config.exit_strategies)
        };

        let signal = signal?;
        if signal.is_full() {
            let reason = signal.reason.to_string();
            self.close(mint, &reason, now);
            Some(reason)
        } else {
            self.partial_exit(mint, signal.fraction, &signal.reason, sol_usd, now)
        }
    }

    /// Record a partial exit of `fraction` (of the original size) at the
    /// current price. Returns the close reason when the exit drained the
    /// position.
    fn partial_exit(
        &self,
        mint: &str,
        fraction: f64,
        reason: &ExitReason,
        sol_usd: f64,
        now: i64,
    ) -> Option<String> {
        let (payload, fraction, drained) = {
            let mut open = self.open.write();
            let position = open.get_mut(mint)?;

            let fraction = fraction.min(position.remaining_fraction);
            if fraction <= 0.0 {
                return None;
            }
            let quantity = position.size * fraction;
            let price = position.current_price;
            let fee = self.config.transaction_fees.sell;
            let gross = (price - position.entry_price) * quantity;

            self.wallet.credit_close(quantity, price, fee, gross);

            position.remaining_fraction -= fraction;
            position.realized_pnl_sol += gross;
            position.realized_pnl_usd += gross * sol_usd;
            if let ExitReason::TieredTakeProfit { tier } = reason {
                if let Some(taken) = position.tiers_taken.get_mut(*tier) {
                    *taken = true;
                }
            }
            position.trades.push(PositionTrade {
                kind: PositionTradeKind::Exit,
                price,
                quantity,
                fee,
                pnl: gross,
                timestamp: now,
                reason: Some(reason.to_string()),
            });

            info!(
                id = %position.id,
                mint,
                fraction,
                remaining = position.remaining_fraction,
                pnl = gross,
                reason = %reason,
                "partial exit"
            );

            (
                position.payload(),
                fraction,
                position.remaining_fraction <= REMAINING_EPSILON,
            )
        };

        self.bus.publish(EngineEvent::PartialExit {
            position: payload,
            fraction,
            reason: reason.to_string(),
        });

        if drained {
            let reason = base_reason(reason);
            self.finalize_close(mint, &reason, now, false);
            Some(reason)
        } else {
            None
        }
    }

    // -------------------------------------------------------------------------
    // Close
    // -------------------------------------------------------------------------

    /// Fully close the position on `mint` at its current price.
    pub fn close(&self, mint: &str, reason: &str, now: i64) -> Option<f64> {
        self.finalize_close(mint, reason, now, true)
    }

    fn finalize_close(&self, mint: &str, reason: &str, now: i64, settle_rest: bool) -> Option<f64> {
        let position = {
            let mut open = self.open.write();
            let mut position = open.remove(mint)?;

            if settle_rest && position.remaining_fraction > REMAINING_EPSILON {
                let quantity = position.size * position.remaining_fraction;
                let price = position.current_price;
                let fee = self.config.transaction_fees.sell;
                let gross = (price - position.entry_price) * quantity;
                self.wallet.credit_close(quantity, price, fee, gross);
                position.realized_pnl_sol += gross;
                position.trades.push(PositionTrade {
                    kind: PositionTradeKind::Exit,
                    price,
                    quantity,
                    fee,
                    pnl: gross,
                    timestamp: now,
                    reason: Some(reason.to_string()),
                });
            }

            position.remaining_fraction = 0.0;
            position.status = PositionStatus::Closed;
            position.close_time = Some(now);
            position.close_reason = Some(reason.to_string());
            position.unrealized_pnl_sol = 0.0;
            position.unrealized_pnl_usd = 0.0;
            position.unrealized_roi_pct = 0.0;
            position
        };

        info!(
            id = %position.id,
            mint,
            reason,
            realized_pnl = position.realized_pnl_sol,
            "position closed"
        );

        self.bus.publish(EngineEvent::PositionClosed {
            position: position.payload(),
            reason: reason.to_string(),
        });

        let pnl = position.realized_pnl_sol;
        self.closed.write().push(position);
        Some(pnl)
    }

    /// Close every open position with reason "emergency" and pause trading.
    pub fn emergency_close_all(&self, now: i64) -> usize {
        self.pause();
        let mints: Vec<String> = self.open.read().keys().cloned().collect();
        let count = mints.len();
        for mint in mints {
            warn!(mint = %mint, "emergency close");
            self.close(&mint, "emergency", now);
        }
        count
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn wallet_balance(&self) -> f64 {
        self.wallet.balance()
    }

    pub fn position_for(&self, mint: &str) -> Option<Position> {
        self.open.read().get(mint).cloned()
    }

    pub fn has_position(&self, mint: &str) -> bool {
        self.open.read().contains_key(mint)
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.open.read().values().cloned().collect()
    }

    pub fn open_mints(&self) -> Vec<String> {
        self.open.read().keys().cloned().collect()
    }

    pub fn closed_positions(&self, count: usize) -> Vec<Position> {
        let closed = self.closed.read();
        closed.iter().rev().take(count).cloned().collect()
    }

    pub fn stats(&self) -> EngineStats {
        let closed = self.closed.read();
        let total_closed = closed.len();
        let wins = closed.iter().filter(|p| p.realized_pnl_sol > 0.0).count();
        let win_rate = if total_closed > 0 {
            wins as f64 / total_closed as f64
        } else {
            0.0
        };
        EngineStats {
            total_closed,
            wins,
            win_rate,
            total_realized_pnl_sol: closed.iter().map(|p| p.realized_pnl_sol).sum(),
        }
    }
}

/// Close reason label without the tier index decoration.
fn base_reason(reason: &ExitReason) -> String {
    match reason {
        ExitReason::TieredTakeProfit { .. } => "tiered_take_profit".to_string(),
        other => other.to_string(),
    }
}

fn push_capped<T>(buf: &mut Vec<T>, value: T, cap: usize) {
    buf.push(value);
    if buf.len() > cap {
        buf.remove(0);
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfitTier;

    fn engine_with(mut config: SniperConfig) -> PositionEngine {
        // Wide sizing bounds so tests control entry costs freely.
        config.position.min_position_size = 0.0;
        config.position.max_position_size = 1_000.0;
        let config = Arc::new(config);
        let wallet = Arc::new(SimWallet::new(config.starting_balance_sol));
        PositionEngine::new(config, wallet, EventBus::new())
    }

    fn quiet_exits(config: &mut SniperConfig) {
        config.exit_strategies.trailing_stop_loss.enabled = false;
        config.exit_strategies.trailing_take_profit.enabled = false;
        config.exit_strategies.tiered_take_profit.enabled = false;
        config.exit_strategies.time_based_exit.enabled = false;
        config.exit_strategies.volume_based_exit.enabled = false;
        config.exit_strategies.price_action.enabled = false;
    }

    #[test]
    fn open_update_close_lifecycle() {
        let mut config = SniperConfig::default();
        quiet_exits(&mut config);
        let engine = engine_with(config);

        engine.open("mint1", 1.0, 0.1, 1_000).unwrap();
        assert!(engine.has_position("mint1"));

        engine.update("mint1", 1.2, 0.0, None, 225.0, 2_000);
        let pos = engine.position_for("mint1").unwrap();
        assert!((pos.unrealized_pnl_sol - 0.02).abs() < 1e-12);
        assert!((pos.unrealized_roi_pct - 20.0).abs() < 1e-9);
        assert!((pos.highest_price - 1.2).abs() < 1e-12);

        let pnl = engine.close("mint1", "manual", 3_000).unwrap();
        assert!((pnl - 0.02).abs() < 1e-12);
        assert!(!engine.has_position("mint1"));

        let closed = engine.closed_positions(10);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].status, PositionStatus::Closed);
        assert_eq!(closed[0].close_reason.as_deref(), Some("manual"));
        assert_eq!(closed[0].remaining_fraction, 0.0);
    }

    #[test]
    fn duplicate_open_refused() {
        let mut config = SniperConfig::default();
        quiet_exits(&mut config);
        let engine = engine_with(config);

        engine.open("mint1", 1.0, 0.1, 1_000).unwrap();
        let err = engine.open("mint1", 1.0, 0.1, 2_000).unwrap_err();
        assert!(matches!(err, OpenError::AlreadyOpen { .. }));
    }

    #[test]
    fn paused_engine_refuses_opens() {
        let mut config = SniperConfig::default();
        quiet_exits(&mut config);
        let engine = engine_with(config);

        engine.pause();
        assert_eq!(engine.open("mint1", 1.0, 0.1, 1_000).unwrap_err(), OpenError::TradingPaused);

        engine.resume();
        assert!(engine.open("mint1", 1.0, 0.1, 1_000).is_ok());
    }

    #[test]
    fn size_bounds_enforced() {
        let mut config = SniperConfig::default();
        quiet_exits(&mut config);
        config.position.min_position_size = 0.05;
        config.position.max_position_size = 0.5;
        let config = Arc::new(config);
        let wallet = Arc::new(SimWallet::new(10.0));
        let engine = PositionEngine::new(config, wallet, EventBus::new());

        assert!(matches!(
            engine.open("mint1", 1.0, 0.01, 0).unwrap_err(),
            OpenError::SizeOutOfRange { .. }
        ));
        assert!(matches!(
            engine.open("mint1", 1.0, 0.9, 0).unwrap_err(),
            OpenError::SizeOutOfRange { .. }
        ));
        assert!(engine.open("mint1", 1.0, 0.2, 0).is_ok());
    }

    #[test]
    fn insufficient_funds_leaves_no_position() {
        let mut config = SniperConfig::default();
        quiet_exits(&mut config);
        config.starting_balance_sol = 0.05;
        let engine = engine_with(config);

        let err = engine.open("mint1", 1.0, 0.1, 0).unwrap_err();
        assert!(matches!(err, OpenError::InsufficientFunds(_)));
        assert!(!engine.has_position("mint1"));
    }

    #[test]
    fn tiered_ladder_partial_exits_then_close() {
        // Entry 100, size 1, tiers [{60,0.2},{40,0.4},{20,0.4}].
        // 119: nothing; 120: exit 0.4; 140: exit 0.4; 160: exit 0.2 + close.
        let mut config = SniperConfig::default();
        quiet_exits(&mut config);
        config.exit_strategies.tiered_take_profit.enabled = true;
        config.exit_strategies.tiered_take_profit.tiers = vec![
            ProfitTier { profit_pct: 60.0, fraction: 0.2 },
            ProfitTier { profit_pct: 40.0, fraction: 0.4 },
            ProfitTier { profit_pct: 20.0, fraction: 0.4 },
        ];
        config.starting_balance_sol = 200.0;
        let engine = engine_with(config);
        let bus = engine.bus.clone();
        let mut rx = bus.subscribe();

        engine.open("mint1", 100.0, 1.0, 0).unwrap();

        assert!(engine.update("mint1", 119.0, 0.0, None, 225.0, 1_000).is_none());
        let pos = engine.position_for("mint1").unwrap();
        assert!((pos.remaining_fraction - 1.0).abs() < 1e-12);

        assert!(engine.update("mint1", 120.0, 0.0, None, 225.0, 2_000).is_none());
        let pos = engine.position_for("mint1").unwrap();
        assert!((pos.remaining_fraction - 0.6).abs() < 1e-12);

        assert!(engine.update("mint1", 140.0, 0.0, None, 225.0, 3_000).is_none());
        let pos = engine.position_for("mint1").unwrap();
        assert!((pos.remaining_fraction - 0.2).abs() < 1e-12);

        let reason = engine.update("mint1", 160.0, 0.0, None, 225.0, 4_000);
        assert_eq!(reason.as_deref(), Some("tiered_take_profit"));
        assert!(!engine.has_position("mint1"));

        let closed = engine.closed_positions(1);
        assert_eq!(closed[0].close_reason.as_deref(), Some("tiered_take_profit"));
        // Realized: 20*0.4 + 40*0.4 + 60*0.2 = 8 + 16 + 12 = 36.
        assert!((closed[0].realized_pnl_sol - 36.0).abs() < 1e-9);

        // Event stream: opened, then three partial exits, then closed.
        let mut partials = 0;
        let mut saw_close = false;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                EngineEvent::PartialExit { fraction, .. } => {
                    partials += 1;
                    assert!(fraction > 0.0 && fraction < 1.0);
                }
                EngineEvent::PositionClosed { reason, .. } => {
                    saw_close = true;
                    assert_eq!(reason, "tiered_take_profit");
                }
                _ => {}
            }
        }
        assert_eq!(partials, 3);
        assert!(saw_close);
    }

    #[test]
    fn remaining_fraction_is_monotone_and_bounded() {
        let mut config = SniperConfig::default();
        quiet_exits(&mut config);
        config.exit_strategies.tiered_take_profit.enabled = true;
        config.starting_balance_sol = 200.0;
        let engine = engine_with(config);

        engine.open("mint1", 100.0, 1.0, 0).unwrap();
        let mut last = 1.0;
        for (i, price) in [105.0, 125.0, 118.0, 145.0, 150.0, 170.0].iter().enumerate() {
            engine.update("mint1", *price, 0.0, None, 225.0, (i as i64 + 1) * 1_000);
            if let Some(pos) = engine.position_for("mint1") {
                assert!(pos.remaining_fraction <= last + 1e-12);
                assert!((0.0..=1.0).contains(&pos.remaining_fraction));
                last = pos.remaining_fraction;
            }
        }
    }

    #[test]
    fn stop_loss_closes_full_position() {
        let mut config = SniperConfig::default();
        quiet_exits(&mut config);
        config.exit_strategies.trailing_stop_loss.enabled = true;
        config.exit_strategies.trailing_stop_loss.stop_loss_pct = 30.0;
        config.exit_strategies.trailing_stop_loss.dynamic.enabled = false;
        config.starting_balance_sol = 200.0;
        let engine = engine_with(config);

        engine.open("mint1", 100.0, 1.0, 0).unwrap();
        engine.update("mint1", 150.0, 0.0, None, 225.0, 1_000);
        let reason = engine.update("mint1", 105.0, 0.0, None, 225.0, 2_000);
        assert_eq!(reason.as_deref(), Some("stop_loss"));
        assert!(!engine.has_position("mint1"));
    }

    #[test]
    fn emergency_close_flattens_and_pauses() {
        let mut config = SniperConfig::default();
        quiet_exits(&mut config);
        config.starting_balance_sol = 200.0;
        let engine = engine_with(config);

        engine.open("mint1", 1.0, 0.1, 0).unwrap();
        engine.open("mint2", 2.0, 0.1, 0).unwrap();

        let closed = engine.emergency_close_all(5_000);
        assert_eq!(closed, 2);
        assert!(engine.open_positions().is_empty());
        assert!(engine.is_paused());

        for p in engine.closed_positions(10) {
            assert_eq!(p.close_reason.as_deref(), Some("emergency"));
        }
    }

    #[test]
    fn stats_aggregate_closed_positions() {
        let mut config = SniperConfig::default();
        quiet_exits(&mut config);
        config.starting_balance_sol = 200.0;
        let engine = engine_with(config);

        engine.open("winner", 1.0, 1.0, 0).unwrap();
        engine.update("winner", 1.5, 0.0, None, 225.0, 1_000);
        engine.close("winner", "manual", 2_000);

        engine.open("loser", 1.0, 1.0, 0).unwrap();
        engine.update("loser", 0.5, 0.0, None, 225.0, 1_000);
        engine.close("loser", "manual", 2_000);

        let stats = engine.stats();
        assert_eq!(stats.total_closed, 2);
        assert_eq!(stats.wins, 1);
        assert!((stats.win_rate - 0.5).abs() < 1e-12);
        assert!((stats.total_realized_pnl_sol - 0.0).abs() < 1e-12);
    }
}
