// =============================================================================
// Fleet Coordinator — wires the stream, oracle, tokens and positions together
// =============================================================================
//
// The coordinator exclusively owns the token registry. Every mutation happens
// in its task: the run loop drains the bounded ingress channel and applies
// one event at a time, with the recovery monitor, exit sweep, and cleanup
// sweep folded in as timer arms of the same `select!`. Nothing suspends while
// a token is mid-update.
//
// Ordering: events for a single token apply in delivery order; cross-token
// order is unspecified. Trades and creates are never dropped (the stream
// client awaits channel capacity); oracle updates are droppable analytics.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SniperConfig;
use crate::events::{EngineEvent, EventBus};
use crate::missed::MissedOpportunityTracker;
use crate::oracle::PriceOracle;
use crate::position::{OpenError, PositionEngine};
use crate::safety::SafetyGate;
use crate::stream::StreamCommand;
use crate::token::lifecycle::{SizeHint, TokenState, Transition};
use crate::token::ohlcv::Timeframe;
use crate::token::{Token, TokenUpdate};
use crate::types::{ControlCommand, IngressEvent, Side, StreamEvent, TradeEvent};

/// Capacity of the ingress channel (high-water mark for backpressure).
pub const INGRESS_CAPACITY: usize = 1024;
/// Exit sweep cadence.
const EXIT_SWEEP_INTERVAL_MS: u64 = 5_000;
/// Size multiplier for a medium position hint.
const MEDIUM_SIZE_RATIO: f64 = 0.6;
/// Recovery-monitor emission thresholds.
const MIN_RECOVERY_STRENGTH: f64 = 0.2;
const MIN_ACCUMULATION_SCORE: f64 = 0.7;
const MIN_BUY_PRESSURE: f64 = 0.6;
/// Strength delta that counts as weakening / acceleration between ticks.
const STRENGTH_DELTA: f64 = 0.1;

pub struct Coordinator {
    config: Arc<SniperConfig>,
    oracle: Arc<PriceOracle>,
    gate: SafetyGate,
    positions: Arc<PositionEngine>,
    bus: EventBus,
    stream_commands: mpsc::UnboundedSender<StreamCommand>,
    /// Exclusively owned: only this task mutates tokens.
    tokens: HashMap<String, Token>,
    missed: MissedOpportunityTracker,
    /// Last recovery strength per mint, for warning/acceleration events.
    last_recovery_strength: HashMap<String, f64>,
    shutting_down: bool,
}

impl Coordinator {
    pub fn new(
        config: Arc<SniperConfig>,
        oracle: Arc<PriceOracle>,
        gate: SafetyGate,
        positions: Arc<PositionEngine>,
        bus: EventBus,
        stream_commands: mpsc::UnboundedSender<StreamCommand>,
        missed: MissedOpportunityTracker,
    ) -> Self {
        Self {
            config,
            oracle,
            gate,
            positions,
            bus,
            stream_commands,
            tokens: HashMap::new(),
            missed,
            last_recovery_strength: HashMap::new(),
            shutting_down: false,
        }
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn token_state(&self, mint: &str) -> Option<TokenState> {
        self.tokens.get(mint).map(Token::state)
    }

    // -------------------------------------------------------------------------
    // Run loop
    // -------------------------------------------------------------------------

    /// Drain the ingress channel until it closes or `quit` arrives.
    pub async fn run(mut self, mut ingress: mpsc::Receiver<IngressEvent>) {
        let mut recovery = tokio::time::interval(tokio::time::Duration::from_millis(
            self.config.timers.recovery_monitor_interval_ms,
        ));
        let mut cleanup = tokio::time::interval(tokio::time::Duration::from_millis(
            self.config.timers.cleanup_interval_ms,
        ));
        let mut exit_sweep = tokio::time::interval(tokio::time::Duration::from_millis(
            EXIT_SWEEP_INTERVAL_MS,
        ));
        // Skip the immediate first ticks.
        recovery.tick().await;
        cleanup.tick().await;
        exit_sweep.tick().await;

        info!("coordinator running");
        loop {
            tokio::select! {
                event = ingress.recv() => {
                    match event {
                        Some(event) => self.handle_ingress(event, Utc::now().timestamp_millis()),
                        None => {
                            info!("ingress channel closed");
                            break;
                        }
                    }
                }
                _ = recovery.tick() => {
                    self.recovery_monitor_tick(Utc::now().timestamp_millis());
                }
                _ = cleanup.tick() => {
                    self.cleanup_tick(Utc::now().timestamp_millis());
                }
                _ = exit_sweep.tick() => {
                    self.exit_sweep_tick(Utc::now().timestamp_millis());
                }
            }
            if self.shutting_down {
                break;
            }
        }
        self.shutdown();
    }

    // -------------------------------------------------------------------------
    // Event handling
    // -------------------------------------------------------------------------

    pub fn handle_ingress(&mut self, event: IngressEvent, now: i64) {
        match event {
            IngressEvent::Stream(StreamEvent::Create(create)) => {
                if self.shutting_down || self.tokens.contains_key(&create.mint) {
                    return;
                }
                let token = Token::new(&create);
                info!(mint = %create.mint, symbol = %create.symbol, "token added");
                self.bus.publish(EngineEvent::NewToken {
                    mint: create.mint.clone(),
                    symbol: create.symbol.clone(),
                    name: create.name.clone(),
                });
                self.bus.publish(EngineEvent::TokenAdded { mint: create.mint.clone() });
                self.tokens.insert(create.mint.clone(), token);
                self.send_stream_command(StreamCommand::SubscribeTokenTrades(vec![create.mint]));
            }
            IngressEvent::Stream(StreamEvent::Buy(t)) => {
                self.handle_trade(TradeEvent::from_wire(Side::Buy, t));
            }
            IngressEvent::Stream(StreamEvent::Sell(t)) => {
                self.handle_trade(TradeEvent::from_wire(Side::Sell, t));
            }
            IngressEvent::PriceUpdate { new_rate, old_rate, percent_change } => {
                self.handle_price_update(new_rate, old_rate, percent_change, now);
            }
            IngressEvent::Command(command) => self.handle_command(command),
        }
    }

    fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Stop => self.positions.pause(),
            ControlCommand::Resume => self.positions.resume(),
            ControlCommand::Quit => {
                info!("quit command received");
                self.shutting_down = true;
            }
        }
    }

    fn handle_trade(&mut self, trade: TradeEvent) {
        let rate = self.oracle.rate();
        let now = trade.timestamp;
        let mint = trade.mint.clone();

        if !self.tokens.contains_key(&mint) {
            // Shadow-tracked rejects keep reporting; anything else is stale
            // noise after an eviction and is ignored without error.
            if self.missed.is_tracking(&mint) {
                self.missed.observe_trade(
                    &mint,
                    trade.price_sol() * rate,
                    trade.market_cap_sol * rate,
                    now,
                );
            } else {
                debug!(mint = %mint, "trade for unknown mint ignored");
            }
            return;
        }

        let update = {
            let config = Arc::clone(&self.config);
            let Some(token) = self.tokens.get_mut(&mint) else { return };
            token.on_trade(&trade, rate, &config)
        };
        self.process_token_update(&mint, update, now);

        // Keep any open position in lock-step with the tape.
        self.update_position(&mint, now);

        if let Some(token) = self.tokens.get(&mint) {
            self.bus.publish(EngineEvent::TokenUpdated {
                mint: mint.clone(),
                price_sol: token.current_price_sol(),
                market_cap_usd: token.market_cap_sol() * rate,
            });
        }
    }

    fn handle_price_update(&mut self, new_rate: f64, old_rate: f64, pct: f64, now: i64) {
        debug!(new_rate, old_rate, pct, "oracle update");
        let config = Arc::clone(&self.config);
        let mints: Vec<String> = self.tokens.keys().cloned().collect();
        for mint in mints {
            let update = {
                let Some(token) = self.tokens.get_mut(&mint) else { continue };
                token.on_oracle_update(new_rate, old_rate, pct, &config, now)
            };
            self.process_token_update(&mint, update, now);
        }
        // USD-denominated exit thresholds see the new rate on the next sweep;
        // a large move warrants an immediate pass.
        if pct.abs() >= self.config.safety.price_impact_threshold {
            self.exit_sweep_tick(now);
        }
    }

    /// Apply the outcome of a token update: publish crosses and transitions,
    /// resolve rebounds through the safety gate, react to terminal states,
    /// and evaluate entries.
    fn process_token_update(&mut self, mint: &str, update: TokenUpdate, now: i64) {
        for cross in update.crosses {
            self.bus.publish(EngineEvent::Cross(cross));
        }
        if let Some(change) = update.first_dip {
            debug!(mint, price_change = change, "first dip of pump cycle");
        }

        for transition in &update.transitions {
            self.react_to_transition(mint, transition, now);
        }

        // Rebounds need the safety predicate, which the token cannot run.
        if let Some(candidate) = update.rebound {
            let verdict = {
                let Some(token) = self.tokens.get(mint) else { return };
                self.gate.check(&token.snapshot(self.oracle.rate(), now), &self.config)
            };
            let transition = {
                let config = Arc::clone(&self.config);
                let Some(token) = self.tokens.get_mut(mint) else { return };
                token.resolve_rebound(candidate, verdict.safe, &config, now)
            };
            if let Some(t) = transition {
                self.react_to_transition(mint, &t, now);
            }
        }

        // A pumping token may qualify for a first-pump entry as gain builds.
        if self.token_state(mint) == Some(TokenState::Pumping) {
            let transition = {
                let config = Arc::clone(&self.config);
                let Some(token) = self.tokens.get_mut(mint) else { return };
                token.qualify_first_pump_entry(&config, now)
            };
            if let Some(t) = transition {
                self.react_to_transition(mint, &t, now);
            }
        }
    }

    fn react_to_transition(&mut self, mint: &str, transition: &Transition, now: i64) {
        self.bus.publish(EngineEvent::StateChanged {
            mint: mint.to_string(),
            from: transition.from,
            to: transition.to,
            reason: transition.reason.clone(),
        });

        match transition.to {
            TokenState::Ready => self.attempt_entry(mint, now),
            TokenState::Drawdown => {
                // Evaluate (not force) the exit: the evaluators see the drop.
                self.update_position(mint, now);
            }
            TokenState::Dead => {
                let reason = transition.reason.clone().unwrap_or_else(|| "dead".into());
                self.bus.publish(EngineEvent::TokenDead {
                    mint: mint.to_string(),
                    reason: reason.clone(),
                });
                if self.positions.has_position(mint) {
                    self.positions.close(mint, "token_dead", now);
                }
                self.remove_token(mint, &reason);
            }
            TokenState::Unsafe => {
                if self.positions.has_position(mint) {
                    self.positions.close(mint, "token_unsafe", now);
                }
                self.remove_token(mint, "unsafe");
            }
            _ => {}
        }
    }

    // -------------------------------------------------------------------------
    // Entries
    // -------------------------------------------------------------------------

    fn attempt_entry(&mut self, mint: &str, now: i64) {
        let rate = self.oracle.rate();
        let (snapshot, hint, volume_drop, gain_from_bottom) = {
            let Some(token) = self.tokens.get(mint) else { return };
            (
                token.snapshot(rate, now),
                token.size_hint().unwrap_or(SizeHint::Full),
                token.volume_drop_pct(now),
                token.gain_from_bottom(),
            )
        };

        // Entry re-validation: volume has not collapsed, and price has not
        // run away from the bottom since the rebound was detected.
        if volume_drop > self.config.thresholds.max_volume_drop_pct {
            info!(mint, volume_drop, "entry skipped — volume collapsed");
            return;
        }
        let entry_ceiling = self.config.recovery.gain.max_entry
            + self.config.thresholds.position_entry_window_pct;
        if hint != SizeHint::Small && gain_from_bottom > entry_ceiling {
            info!(mint, gain_from_bottom, entry_ceiling, "entry skipped — outside entry window");
            return;
        }

        let verdict = self.gate.check(&snapshot, &self.config);
        if !verdict.safe {
            info!(mint, reasons = ?verdict.reasons, "entry rejected by safety gate");
            self.bus.publish(EngineEvent::TokenUnsafe {
                mint: mint.to_string(),
                reasons: verdict.reasons.clone(),
            });
            self.missed.record_rejection(&snapshot, "entry_check", &verdict.reasons, now);
            let transition = {
                let Some(token) = self.tokens.get_mut(mint) else { return };
                token.mark_unsafe(now, &verdict.reasons)
            };
            if let Some(t) = transition {
                self.bus.publish(EngineEvent::StateChanged {
                    mint: mint.to_string(),
                    from: t.from,
                    to: t.to,
                    reason: t.reason,
                });
                // remove_token keeps the trade subscription alive while the
                // missed tracker shadows this mint.
                self.remove_token(mint, "unsafe");
            }
            return;
        }

        let size = self.position_size(&snapshot, hint);
        let price = snapshot.price_sol;
        if price <= 0.0 || size <= 0.0 {
            return;
        }
        let quantity = size / price;

        match self.positions.open(mint, price, quantity, now) {
            Ok(id) => {
                info!(mint, position_id = %id, size_sol = size, hint = ?hint, "entered position");
                let transition = {
                    let Some(token) = self.tokens.get_mut(mint) else { return };
                    token.mark_open(now)
                };
                if let Some(t) = transition {
                    self.bus.publish(EngineEvent::StateChanged {
                        mint: mint.to_string(),
                        from: t.from,
                        to: t.to,
                        reason: t.reason,
                    });
                }
            }
            Err(OpenError::TradingPaused) => {
                debug!(mint, "entry skipped — trading paused");
            }
            Err(e) => {
                warn!(mint, error = %e, "entry failed");
            }
        }
    }

    /// Position size in SOL: wallet-risk based, clamped to the configured
    /// bounds and capped by the token's market cap.
    fn position_size(&self, snapshot: &crate::token::TokenSnapshot, hint: SizeHint) -> f64 {
        let sizing = &self.config.position;
        let balance = self.positions_wallet_balance();

        let mut size = balance * sizing.risk_per_trade;
        size = size.clamp(sizing.min_position_size, sizing.max_position_size);

        let mcap_cap = snapshot.market_cap_sol * sizing.position_size_market_cap_ratio;
        if mcap_cap > 0.0 {
            size = size.min(mcap_cap);
        }
        size = size.min(snapshot.market_cap_sol * sizing.max_mcap_position);

        match hint {
            SizeHint::Full => size,
            SizeHint::Medium => size * MEDIUM_SIZE_RATIO,
            SizeHint::Small => size * sizing.first_pump_size_ratio,
        }
    }

    fn positions_wallet_balance(&self) -> f64 {
        self.positions.wallet_balance()
    }

    // -------------------------------------------------------------------------
    // Position upkeep
    // -------------------------------------------------------------------------

    /// Push the token's latest market data into its position and run the exit
    /// evaluators; reconcile token state if the position fully closed.
    fn update_position(&mut self, mint: &str, now: i64) {
        if !self.positions.has_position(mint) {
            return;
        }
        let rate = self.oracle.rate();
        let (price, volume, candle) = {
            let Some(token) = self.tokens.get(mint) else { return };
            (
                token.current_price_sol(),
                token.holders.recent_volume(5_000, now),
                token.candles().latest(Timeframe::S1).cloned(),
            )
        };

        let closed = self
            .positions
            .update(mint, price, volume, candle.as_ref(), rate, now);

        if let Some(reason) = closed {
            let transition = {
                let Some(token) = self.tokens.get_mut(mint) else { return };
                token.mark_closed(now, &reason)
            };
            if let Some(t) = transition {
                self.react_to_transition(mint, &t, now);
                // Closed is terminal: the token leaves the registry.
                self.remove_token(mint, "position closed");
            }
        }
    }

    fn exit_sweep_tick(&mut self, now: i64) {
        for mint in self.positions.open_mints() {
            self.update_position(&mint, now);
        }
    }

    // -------------------------------------------------------------------------
    // Recovery monitor
    // -------------------------------------------------------------------------

    fn recovery_monitor_tick(&mut self, now: i64) {
        if self.shutting_down {
            return;
        }
        let candidates: Vec<String> = self
            .tokens
            .iter()
            .filter(|(_, t)| {
                matches!(t.state(), TokenState::Drawdown | TokenState::Recovery)
            })
            .map(|(mint, _)| mint.clone())
            .collect();

        for mint in candidates {
            let Some(token) = self.tokens.get(&mint) else { continue };
            let metrics = token.recovery_metrics(now);
            let previous = self.last_recovery_strength.insert(mint.clone(), metrics.recovery_strength);

            if metrics.drawdown_depth_pct > self.config.recovery.drawdown.min
                && metrics.drawdown_depth_pct <= self.config.recovery.drawdown.max
                && metrics.recovery_strength > MIN_RECOVERY_STRENGTH
                && metrics.accumulation_score > MIN_ACCUMULATION_SCORE
                && metrics.buy_pressure > MIN_BUY_PRESSURE
                && metrics.structure_bullish
            {
                self.bus.publish(EngineEvent::RecoveryOpportunity {
                    mint: mint.clone(),
                    drawdown_depth_pct: metrics.drawdown_depth_pct,
                    recovery_strength: metrics.recovery_strength,
                    accumulation_score: metrics.accumulation_score,
                    buy_pressure: metrics.buy_pressure,
                });
            } else if let Some(previous) = previous {
                if metrics.recovery_strength < previous - STRENGTH_DELTA {
                    self.bus.publish(EngineEvent::RecoveryWarning {
                        mint: mint.clone(),
                        recovery_strength: metrics.recovery_strength,
                    });
                } else if metrics.recovery_strength > previous + STRENGTH_DELTA {
                    self.bus.publish(EngineEvent::RecoveryStrength {
                        mint: mint.clone(),
                        recovery_strength: metrics.recovery_strength,
                    });
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Cleanup
    // -------------------------------------------------------------------------

    pub fn cleanup_tick(&mut self, now: i64) {
        if self.shutting_down {
            return;
        }
        let threshold = self.config.timers.inactivity_threshold_ms;

        let inactive: Vec<String> = self
            .tokens
            .iter()
            .filter(|(_, t)| t.is_inactive(now, threshold))
            .map(|(mint, _)| mint.clone())
            .collect();
        for mint in inactive {
            info!(mint = %mint, "evicting inactive token");
            if self.positions.has_position(&mint) {
                self.positions.close(&mint, "token_evicted", now);
            }
            self.remove_token(&mint, "inactivity");
        }

        // Rolling holder-book maintenance on the survivors.
        for token in self.tokens.values_mut() {
            token.sweep_holders(now);
        }

        // Shadowed rejects that stopped trading get their story written out.
        for mint in self.missed.stale_mints(now, threshold) {
            self.finalize_shadow(&mint, now);
        }
    }

    fn finalize_shadow(&mut self, mint: &str, now: i64) {
        match self.missed.finalize(mint, now) {
            Ok(Some(profit)) => {
                self.bus.publish(EngineEvent::MissedOpportunityRecorded {
                    mint: mint.to_string(),
                    potential_profit_pct: if profit > 0.0 { Some(profit) } else { None },
                });
                self.send_stream_command(StreamCommand::UnsubscribeTokenTrades(vec![
                    mint.to_string(),
                ]));
            }
            Ok(None) => {}
            Err(e) => warn!(mint, error = %e, "failed to persist missed opportunity"),
        }
    }

    fn remove_token(&mut self, mint: &str, reason: &str) {
        if self.tokens.remove(mint).is_none() {
            return;
        }
        self.last_recovery_strength.remove(mint);
        self.bus.publish(EngineEvent::TokenRemoved {
            mint: mint.to_string(),
            reason: reason.to_string(),
        });
        // Shadow-tracked mints keep their subscription until finalized.
        if !self.missed.is_tracking(mint) {
            self.send_stream_command(StreamCommand::UnsubscribeTokenTrades(vec![
                mint.to_string(),
            ]));
        }
    }

    fn send_stream_command(&self, command: StreamCommand) {
        if self.stream_commands.send(command).is_err() {
            debug!("stream command channel closed");
        }
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    fn shutdown(&mut self) {
        info!(tokens = self.tokens.len(), "coordinator shutting down");
        let mints: Vec<String> = self.tokens.keys().cloned().collect();
        if !mints.is_empty() {
            self.send_stream_command(StreamCommand::UnsubscribeTokenTrades(mints.clone()));
        }
        for mint in mints {
            self.tokens.remove(&mint);
            self.bus.publish(EngineEvent::TokenRemoved {
                mint,
                reason: "shutdown".into(),
            });
        }
        self.missed.clear();
        info!("coordinator stopped");
    }
}
