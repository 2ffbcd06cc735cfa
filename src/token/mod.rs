// =============================================================================
// Token Entity — owns candles, holders, metrics, and the lifecycle machine
// =============================================================================
//
// A token is created on its `create` event and destroyed by the coordinator
// when it reaches a terminal state or goes inactive. Every trade flows
// through `on_trade`, which updates the curve reserves, holder book, price
// buffer, candle store and pump metrics, then runs the lifecycle detectors.
//
// Transitions that depend on the external safety predicate (Drawdown →
// Recovery/Ready) are surfaced as a `rebound` candidate for the coordinator
// to resolve; everything else transitions in place.
// =============================================================================

pub mod holders;
pub mod lifecycle;
pub mod ohlcv;

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SniperConfig;
use crate::events::CrossEvent;
use crate::types::{TokenCreate, TradeEvent};
use holders::HolderBook;
use lifecycle::{LifecycleMachine, SizeHint, TokenState, Transition};
use ohlcv::{ema, CandleStore, Timeframe, TradeObservation};

/// Capacity of the timestamped price buffer.
const PRICE_BUFFER_CAP: usize = 30;
/// Retention of the volume-spike history.
const VOLUME_SPIKE_RETENTION_MS: i64 = 5 * 60 * 1000;
/// Price change (percent) that counts as the first dip of a pump.
const FIRST_DIP_PCT: f64 = -5.0;
/// Fiat volume windows exposed in the snapshot, milliseconds.
const VOLUME_WINDOWS_MS: [i64; 5] = [5_000, 10_000, 30_000, 60_000, 300_000];

/// Result of folding one trade into a token.
#[derive(Debug, Default)]
pub struct TokenUpdate {
    /// Indicator crosses produced by closed candles.
    pub crosses: Vec<CrossEvent>,
    /// Lifecycle transitions committed during this update.
    pub transitions: Vec<Transition>,
    /// First dip of the current pump cycle: price change as a fraction.
    pub first_dip: Option<f64>,
    /// Set while in Drawdown/Recovery with rebound gain at or above the
    /// configured minimum; the coordinator resolves it against the safety
    /// gate into Ready or Recovery.
    pub rebound: Option<ReboundCandidate>,
}

/// A rebound awaiting safety resolution.
#[derive(Debug, Clone, Copy)]
pub struct ReboundCandidate {
    pub gain_pct: f64,
    pub from: TokenState,
}

/// Inputs for the recovery monitor.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RecoveryMetrics {
    pub drawdown_depth_pct: f64,
    /// Fraction of the drawdown recovered, in [0, 1].
    pub recovery_strength: f64,
    /// Blend of accumulation trades and buy pressure, in [0, 1].
    pub accumulation_score: f64,
    /// Buy pressure as a fraction, in [0, 1].
    pub buy_pressure: f64,
    pub structure_bullish: bool,
}

/// Read-only aggregate for dashboards, loggers and the safety gate.
#[derive(Debug, Clone, Serialize)]
pub struct TokenSnapshot {
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub creator: String,
    pub created_at: i64,
    pub state: TokenState,
    pub price_sol: f64,
    pub price_usd: f64,
    pub market_cap_sol: f64,
    pub market_cap_usd: f64,
    pub highest_market_cap_sol: f64,
    pub holder_count: usize,
    pub top_holder_concentration_pct: f64,
    pub creator_sell_pct: f64,
    pub max_wallet_volume_pct: f64,
    pub buy_pressure_pct: f64,
    /// Fiat volume over 5s/10s/30s/1m/5m.
    pub volume_windows_usd: [f64; 5],
    pub pump_count: u32,
    pub reached_first_pump: bool,
    pub heating_up: bool,
    pub last_trade_time: i64,
}

/// One tracked bonding-curve token.
pub struct Token {
    // ── Identity ────────────────────────────────────────────────────────
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub creator: String,
    pub created_at: i64,

    // ── Curve reserves ──────────────────────────────────────────────────
    v_tokens_in_bonding_curve: f64,
    v_sol_in_bonding_curve: f64,
    market_cap_sol: f64,
    current_price_sol: f64,
    /// Total supply implied at creation: curve reserve plus the initial buy.
    total_supply: f64,

    // ── Lifecycle ───────────────────────────────────────────────────────
    machine: LifecycleMachine,
    first_dip_fired: bool,

    // ── Aggregates ──────────────────────────────────────────────────────
    candles: CandleStore,
    pub holders: HolderBook,
    /// Timestamped price samples, newest at the back.
    price_buffer: VecDeque<(i64, f64)>,

    // ── Pump metrics ────────────────────────────────────────────────────
    pump_count: u32,
    last_pump_time: Option<i64>,
    highest_gain_rate: f64,
    volume_spikes: VecDeque<(i64, f64)>,
    /// Largest one-minute fiat volume seen so far.
    peak_volume_1m_usd: f64,

    // ── Peaks / milestones ──────────────────────────────────────────────
    highest_market_cap_sol: f64,
    reached_first_pump: bool,
    heating_up: bool,

    // ── Bookkeeping ─────────────────────────────────────────────────────
    seen_signatures: HashSet<String>,
    pub last_trade_time: i64,
}

impl Token {
    /// Build a token from its creation event.
    pub fn new(create: &TokenCreate) -> Self {
        let price = if create.v_tokens_in_bonding_curve > 0.0 {
            create.v_sol_in_bonding_curve / create.v_tokens_in_bonding_curve
        } else {
            0.0
        };

        let mut holders = HolderBook::new();
        holders.set_creator(&create.trader_public_key, create.initial_buy, create.timestamp);

        let mut price_buffer = VecDeque::with_capacity(PRICE_BUFFER_CAP);
        price_buffer.push_back((create.timestamp, price));

        let mut seen_signatures = HashSet::new();
        seen_signatures.insert(create.signature.clone());

        Self {
            mint: create.mint.clone(),
            symbol: create.symbol.clone(),
            name: create.name.clone(),
            creator: create.trader_public_key.clone(),
            created_at: create.timestamp,
            v_tokens_in_bonding_curve: create.v_tokens_in_bonding_curve,
            v_sol_in_bonding_curve: create.v_sol_in_bonding_curve,
            market_cap_sol: create.market_cap_sol,
            current_price_sol: price,
            total_supply: create.v_tokens_in_bonding_curve + create.initial_buy,
            machine: LifecycleMachine::new(create.timestamp),
            first_dip_fired: false,
            candles: CandleStore::new(&create.mint),
            holders,
            price_buffer,
            pump_count: 0,
            last_pump_time: None,
            highest_gain_rate: 0.0,
            volume_spikes: VecDeque::new(),
            peak_volume_1m_usd: 0.0,
            highest_market_cap_sol: create.market_cap_sol,
            reached_first_pump: false,
            heating_up: false,
            seen_signatures,
            last_trade_time: create.timestamp,
        }
    }

    // -------------------------------------------------------------------------
    // Ingest
    // -------------------------------------------------------------------------

    /// Fold a trade into the token, then run the lifecycle detectors.
    /// Re-applying a signature already seen is a no-op.
    pub fn on_trade(
        &mut self,
        trade: &TradeEvent,
        sol_usd: f64,
        config: &SniperConfig,
    ) -> TokenUpdate {
        let mut update = TokenUpdate::default();

        if !self.seen_signatures.insert(trade.signature.clone()) {
            debug!(mint = %self.mint, signature = %trade.signature, "duplicate trade ignored");
            return update;
        }
        if self.machine.state().is_terminal() {
            return update;
        }

        let now = trade.timestamp;
        let price = trade.price_sol();

        // Per-trade price change against the previous trade.
        let price_change_pct = if self.current_price_sol > 0.0 {
            (price - self.current_price_sol) / self.current_price_sol * 100.0
        } else {
            0.0
        };

        // ── Reserves & price ────────────────────────────────────────────
        self.v_tokens_in_bonding_curve = trade.v_tokens_in_bonding_curve;
        self.v_sol_in_bonding_curve = trade.v_sol_in_bonding_curve;
        self.market_cap_sol = trade.market_cap_sol;
        self.current_price_sol = price;
        self.last_trade_time = now;
        if trade.market_cap_sol > self.highest_market_cap_sol {
            self.highest_market_cap_sol = trade.market_cap_sol;
        }

        // ── Holder book ─────────────────────────────────────────────────
        let volume_sol = trade.volume_sol();
        self.holders.record_trade(
            &trade.trader,
            trade.side,
            trade.token_amount,
            trade.new_token_balance,
            volume_sol,
            volume_sol * sol_usd,
            price_change_pct,
            now,
        );

        // ── Price buffer ────────────────────────────────────────────────
        if self.price_buffer.len() == PRICE_BUFFER_CAP {
            self.price_buffer.pop_front();
        }
        self.price_buffer.push_back((now, price));

        // ── Candles ─────────────────────────────────────────────────────
        update.crosses = self.candles.record_trade(TradeObservation {
            price_sol: price,
            token_volume: trade.token_amount,
            market_cap_sol: trade.market_cap_sol,
            timestamp: now,
            sol_usd,
        });

        // ── Pump metrics ────────────────────────────────────────────────
        let spike = self.volume_spike(now);
        while self
            .volume_spikes
            .front()
            .is_some_and(|&(t, _)| now - t > VOLUME_SPIKE_RETENTION_MS)
        {
            self.volume_spikes.pop_front();
        }
        self.volume_spikes.push_back((now, spike));

        let gain_rate = self.price_increase_ms(60_000, now);
        if gain_rate > self.highest_gain_rate {
            self.highest_gain_rate = gain_rate;
        }
        let volume_1m = self.holders.recent_volume(60_000, now);
        if volume_1m > self.peak_volume_1m_usd {
            self.peak_volume_1m_usd = volume_1m;
        }

        self.update_milestones(sol_usd, &config.thresholds);
        self.machine.observe_price(price);

        // ── First dip ───────────────────────────────────────────────────
        if self.machine.state() == TokenState::Pumping
            && !self.first_dip_fired
            && price_change_pct < FIRST_DIP_PCT
        {
            self.first_dip_fired = true;
            update.first_dip = Some(price_change_pct / 100.0);
        }

        // ── Detectors ───────────────────────────────────────────────────
        self.run_detectors(now, sol_usd, config, &mut update);

        update
    }

    /// Oracle refresh: recompute fiat milestones; a move past the configured
    /// price-impact threshold also re-runs the detectors (fiat thresholds may
    /// have been crossed without a trade).
    pub fn on_oracle_update(
        &mut self,
        new_rate: f64,
        _old_rate: f64,
        change_pct: f64,
        config: &SniperConfig,
        now: i64,
    ) -> TokenUpdate {
        let mut update = TokenUpdate::default();
        if self.machine.state().is_terminal() {
            return update;
        }

        self.update_milestones(new_rate, &config.thresholds);
        if change_pct.abs() >= config.safety.price_impact_threshold {
            self.run_detectors(now, new_rate, config, &mut update);
        }
        update
    }

    fn run_detectors(
        &mut self,
        now: i64,
        sol_usd: f64,
        config: &SniperConfig,
        update: &mut TokenUpdate,
    ) {
        let price = self.current_price_sol;
        let th = &config.thresholds;

        // Dead: fiat market cap at the floor, but only after the token has
        // proven itself (prevents marking stillborn tokens dead).
        let mcap_usd = self.market_cap_sol * sol_usd;
        if self.reached_first_pump && mcap_usd <= th.dead_usd {
            match self.machine.mark_dead(now, format!("market cap ${mcap_usd:.0} at dead floor")) {
                Ok(t) => {
                    update.transitions.push(t);
                    return;
                }
                Err(e) => warn!(mint = %self.mint, error = %e, "dead transition refused"),
            }
        }

        match self.machine.state() {
            TokenState::New | TokenState::Recovery | TokenState::Ready => {
                let gain = self.price_increase_ms(300_000, now);
                let pumped_before = self.machine.completed_drawdowns() > 0;
                let eligible = self.machine.state() == TokenState::New || pumped_before;
                if eligible
                    && gain >= th.pump_pct
                    && self.volume_spike(now) > 0.0
                    && self.holders.buy_pressure(300_000, now) > 0.0
                {
                    match self.machine.mark_pumping(
                        price,
                        now,
                        format!("price +{gain:.1}% in 5m"),
                    ) {
                        Ok(t) => {
                            self.pump_count += 1;
                            self.last_pump_time = Some(now);
                            self.first_dip_fired = false;
                            update.transitions.push(t);
                        }
                        Err(e) => warn!(mint = %self.mint, error = %e, "pump transition refused"),
                    }
                }
            }
            TokenState::Pumping => {
                let dd = self.machine.drawdown_from_peak(price);
                if dd >= th.drawdown_pct {
                    match self.machine.mark_drawdown(
                        price,
                        now,
                        format!("-{dd:.1}% from peak"),
                    ) {
                        Ok(t) => update.transitions.push(t),
                        Err(e) => {
                            warn!(mint = %self.mint, error = %e, "drawdown transition refused")
                        }
                    }
                }
            }
            TokenState::Drawdown => {
                let gain = self.machine.gain_from_bottom(price);
                if gain >= th.recovery_min_gain_pct {
                    update.rebound = Some(ReboundCandidate {
                        gain_pct: gain,
                        from: TokenState::Drawdown,
                    });
                }
            }
            _ => {}
        }

        // A recovering token that slides back below its previous bottom
        // starts a fresh drawdown cycle.
        if self.machine.state() == TokenState::Recovery
            && self.machine.bottom_price() > 0.0
            && price < self.machine.bottom_price()
        {
            match self.machine.mark_drawdown(price, now, "new drawdown leg") {
                Ok(t) => update.transitions.push(t),
                Err(e) => warn!(mint = %self.mint, error = %e, "drawdown transition refused"),
            }
        } else if self.machine.state() == TokenState::Recovery {
            let gain = self.machine.gain_from_bottom(price);
            if gain >= config.thresholds.recovery_min_gain_pct {
                update.rebound = Some(ReboundCandidate {
                    gain_pct: gain,
                    from: TokenState::Recovery,
                });
            }
        }
    }

    fn update_milestones(&mut self, sol_usd: f64, th: &crate::config::Thresholds) {
        let mcap_usd = self.market_cap_sol * sol_usd;
        if mcap_usd >= th.first_pump_usd {
            self.reached_first_pump = true;
        }
        if mcap_usd >= th.heating_up_usd {
            self.heating_up = true;
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle resolution (driven by the coordinator)
    // -------------------------------------------------------------------------

    /// Resolve a rebound candidate after the safety gate ran.
    pub fn resolve_rebound(
        &mut self,
        candidate: ReboundCandidate,
        safe: bool,
        config: &SniperConfig,
        now: i64,
    ) -> Option<Transition> {
        let within_window = candidate.gain_pct >= config.recovery.gain.min
            && candidate.gain_pct <= config.recovery.gain.max_entry;
        let result = if safe && within_window {
            let hint = match candidate.from {
                TokenState::Drawdown => SizeHint::Full,
                _ => SizeHint::Medium,
            };
            self.machine.mark_ready(
                hint,
                now,
                format!("rebound +{:.1}% from bottom", candidate.gain_pct),
            )
        } else if candidate.from == TokenState::Drawdown {
            self.machine
                .mark_recovery(now, format!("rebound +{:.1}%, holding", candidate.gain_pct))
        } else {
            // Already in Recovery and still not entry-qualified.
            return None;
        };

        match result {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(mint = %self.mint, error = %e, "rebound resolution refused");
                None
            }
        }
    }

    /// Qualify a first-pump entry: still Pumping, gain since pump start at or
    /// above the configured minimum. Transitions to Ready with a small hint.
    pub fn qualify_first_pump_entry(
        &mut self,
        config: &SniperConfig,
        now: i64,
    ) -> Option<Transition> {
        if self.machine.state() != TokenState::Pumping
            || self.machine.completed_drawdowns() > 0
        {
            return None;
        }
        let gain = self.price_increase_ms(300_000, now);
        if gain < config.thresholds.min_first_pump_gain_pct {
            return None;
        }
        match self
            .machine
            .mark_ready(SizeHint::Small, now, format!("first pump +{gain:.1}%"))
        {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(mint = %self.mint, error = %e, "first-pump entry refused");
                None
            }
        }
    }

    pub fn mark_open(&mut self, now: i64) -> Option<Transition> {
        self.machine.mark_open(now).ok()
    }

    pub fn mark_closed(&mut self, now: i64, reason: &str) -> Option<Transition> {
        self.machine.mark_closed(now, reason).ok()
    }

    pub fn mark_unsafe(&mut self, now: i64, reasons: &[String]) -> Option<Transition> {
        match self.machine.mark_unsafe(now, reasons) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(mint = %self.mint, error = %e, "unsafe transition refused");
                None
            }
        }
    }

    // -------------------------------------------------------------------------
    // Metrics
    // -------------------------------------------------------------------------

    pub fn state(&self) -> TokenState {
        self.machine.state()
    }

    pub fn size_hint(&self) -> Option<SizeHint> {
        self.machine.size_hint()
    }

    pub fn current_price_sol(&self) -> f64 {
        self.current_price_sol
    }

    pub fn market_cap_sol(&self) -> f64 {
        self.market_cap_sol
    }

    pub fn token_reserve(&self) -> f64 {
        self.v_tokens_in_bonding_curve
    }

    pub fn total_supply(&self) -> f64 {
        self.total_supply
    }

    pub fn candles(&self) -> &CandleStore {
        &self.candles
    }

    pub fn pump_count(&self) -> u32 {
        self.pump_count
    }

    pub fn last_pump_time(&self) -> Option<i64> {
        self.last_pump_time
    }

    pub fn highest_gain_rate(&self) -> f64 {
        self.highest_gain_rate
    }

    /// Volume-spike observations from the last five minutes, oldest first.
    pub fn volume_spike_history(&self) -> &VecDeque<(i64, f64)> {
        &self.volume_spikes
    }

    /// Collapse of the one-minute fiat volume from its all-time peak,
    /// percent. 0 before any volume was seen.
    pub fn volume_drop_pct(&self, now: i64) -> f64 {
        if self.peak_volume_1m_usd <= 0.0 {
            return 0.0;
        }
        let current = self.holders.recent_volume(60_000, now);
        ((self.peak_volume_1m_usd - current) / self.peak_volume_1m_usd * 100.0).max(0.0)
    }

    /// Rebound of the current price from the recorded drawdown bottom,
    /// percent. 0 outside a drawdown cycle.
    pub fn gain_from_bottom(&self) -> f64 {
        self.machine.gain_from_bottom(self.current_price_sol)
    }

    /// Percentage price change over the trailing window, from the oldest
    /// buffered sample inside the window to the current price. 0 when the
    /// buffer has no sample in the window.
    pub fn price_increase_ms(&self, window_ms: i64, now: i64) -> f64 {
        let oldest = self
            .price_buffer
            .iter()
            .find(|&&(t, _)| now - t <= window_ms)
            .map(|&(_, p)| p);
        match oldest {
            Some(p) if p > 0.0 => (self.current_price_sol - p) / p * 100.0,
            _ => 0.0,
        }
    }

    /// Short-rate vs long-rate volume expansion, percent:
    /// `((vol_5s/5) / (vol_30s/30) - 1) * 100`; 0 when the 30s rate is 0.
    pub fn volume_spike(&self, now: i64) -> f64 {
        let rate_5s = self.holders.recent_volume(5_000, now) / 5.0;
        let rate_30s = self.holders.recent_volume(30_000, now) / 30.0;
        if rate_30s > 0.0 {
            (rate_5s / rate_30s - 1.0) * 100.0
        } else {
            0.0
        }
    }

    /// Second finite difference of the last three buffered samples,
    /// normalised by the interval span (per second squared).
    pub fn price_acceleration(&self) -> f64 {
        let n = self.price_buffer.len();
        if n < 3 {
            return 0.0;
        }
        let (t0, p0) = self.price_buffer[n - 3];
        let (t1, p1) = self.price_buffer[n - 2];
        let (t2, p2) = self.price_buffer[n - 1];
        let dt1 = (t1 - t0) as f64 / 1000.0;
        let dt2 = (t2 - t1) as f64 / 1000.0;
        let span = (t2 - t0) as f64 / 2000.0;
        if dt1 <= 0.0 || dt2 <= 0.0 || span <= 0.0 {
            return 0.0;
        }
        let v1 = (p1 - p0) / dt1;
        let v2 = (p2 - p1) / dt2;
        (v2 - v1) / span
    }

    /// Inputs for the recovery monitor. Only meaningful in Drawdown/Recovery.
    pub fn recovery_metrics(&self, now: i64) -> RecoveryMetrics {
        let peak = self.machine.peak_price();
        let bottom = self.machine.bottom_price();
        let price = self.current_price_sol;

        let drawdown_depth_pct = if peak > 0.0 {
            (peak - bottom) / peak * 100.0
        } else {
            0.0
        };
        let recovery_strength = if peak > bottom && bottom > 0.0 {
            ((price - bottom) / (peak - bottom)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let buy_pressure = self.holders.buy_pressure(300_000, now) / 100.0;
        let accumulation_score =
            0.5 * self.holders.accumulating_trade_fraction(300_000, now) + 0.5 * buy_pressure;

        let closes = self.candles.closes_usd(Timeframe::M1, 60);
        let structure_bullish = match (ema(&closes, 9), ema(&closes, 21)) {
            (Some(fast), Some(slow)) => fast > slow,
            _ => false,
        };

        RecoveryMetrics {
            drawdown_depth_pct,
            recovery_strength,
            accumulation_score,
            buy_pressure,
            structure_bullish,
        }
    }

    pub fn is_inactive(&self, now: i64, threshold_ms: i64) -> bool {
        now - self.last_trade_time > threshold_ms
    }

    /// Periodic holder-book sweep, driven by the coordinator's cleanup timer.
    pub fn sweep_holders(&mut self, now: i64) {
        self.holders.sweep(now);
    }

    /// Build the read-only aggregate for dashboards, loggers, and the safety
    /// gate.
    pub fn snapshot(&self, sol_usd: f64, now: i64) -> TokenSnapshot {
        let mut volume_windows_usd = [0.0; 5];
        for (slot, window) in volume_windows_usd.iter_mut().zip(VOLUME_WINDOWS_MS) {
            *slot = self.holders.recent_volume(window, now);
        }

        TokenSnapshot {
            mint: self.mint.clone(),
            symbol: self.symbol.clone(),
            name: self.name.clone(),
            creator: self.creator.clone(),
            created_at: self.created_at,
            state: self.machine.state(),
            price_sol: self.current_price_sol,
            price_usd: self.current_price_sol * sol_usd,
            market_cap_sol: self.market_cap_sol,
            market_cap_usd: self.market_cap_sol * sol_usd,
            highest_market_cap_sol: self.highest_market_cap_sol,
            holder_count: self.holders.holder_count(),
            top_holder_concentration_pct: self
                .holders
                .top_holder_concentration(10, self.v_tokens_in_bonding_curve),
            creator_sell_pct: self.holders.creator_sell_percentage(),
            max_wallet_volume_pct: self.holders.max_wallet_volume_share(300_000, now),
            buy_pressure_pct: self.holders.buy_pressure(300_000, now),
            volume_windows_usd,
            pump_count: self.pump_count,
            reached_first_pump: self.reached_first_pump,
            heating_up: self.heating_up,
            last_trade_time: self.last_trade_time,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    const SOL_USD: f64 = 225.0;

    fn create_event() -> TokenCreate {
        TokenCreate {
            mint: "mint1".into(),
            name: "Test Token".into(),
            symbol: "TST".into(),
            uri: String::new(),
            trader_public_key: "creator".into(),
            initial_buy: 1_000_000.0,
            v_tokens_in_bonding_curve: 1_000_000_000.0,
            v_sol_in_bonding_curve: 30.0,
            market_cap_sol: 10.0,
            bonding_curve_key: "curve".into(),
            signature: "sig-create".into(),
            timestamp: 0,
        }
    }

    fn trade(
        n: u64,
        side: Side,
        v_tokens: f64,
        v_sol: f64,
        amount: f64,
        balance: f64,
        ts: i64,
    ) -> TradeEvent {
        TradeEvent {
            mint: "mint1".into(),
            trader: format!("trader-{n}"),
            side,
            token_amount: amount,
            new_token_balance: balance,
            v_tokens_in_bonding_curve: v_tokens,
            v_sol_in_bonding_curve: v_sol,
            market_cap_sol: v_sol, // simple proxy for the tests
            signature: format!("sig-{n}"),
            timestamp: ts,
        }
    }

    /// Ten escalating buys over ten seconds, enough to satisfy the pump
    /// detector with default thresholds.
    fn pump(token: &mut Token, config: &SniperConfig) -> Vec<Transition> {
        let mut transitions = Vec::new();
        let mut v_sol = 30.0;
        let mut v_tokens = 1_000_000_000.0;
        for i in 0..10u64 {
            v_sol *= 1.2;
            v_tokens /= 1.2;
            let ev = trade(i, Side::Buy, v_tokens, v_sol, 1_000.0, 1_000.0, (i as i64 + 1) * 1_000);
            transitions.extend(token.on_trade(&ev, SOL_USD, config).transitions);
        }
        transitions
    }

    #[test]
    fn duplicate_signature_is_a_noop() {
        let cfg = SniperConfig::default();
        let mut token = Token::new(&create_event());

        let ev = trade(1, Side::Buy, 999_000_000.0, 36.0, 500.0, 500.0, 1_000);
        token.on_trade(&ev, SOL_USD, &cfg);
        let price_after = token.current_price_sol();
        let holders_after = token.holders.holder_count();

        // Same signature applied again changes nothing.
        token.on_trade(&ev, SOL_USD, &cfg);
        assert_eq!(token.current_price_sol(), price_after);
        assert_eq!(token.holders.holder_count(), holders_after);
        assert_eq!(token.candles().candle_count(Timeframe::S1), 1);
    }

    #[test]
    fn pump_detected_from_new() {
        let cfg = SniperConfig::default();
        let mut token = Token::new(&create_event());

        let transitions = pump(&mut token, &cfg);
        assert!(
            transitions
                .iter()
                .any(|t| t.from == TokenState::New && t.to == TokenState::Pumping),
            "expected New -> Pumping, got {transitions:?}"
        );
        assert_eq!(token.state(), TokenState::Pumping);
        assert_eq!(token.pump_count(), 1);
        assert!(token.last_pump_time().is_some());
        assert!(token.highest_gain_rate() > 0.0);
        assert_eq!(token.volume_spike_history().len(), 10);
    }

    #[test]
    fn pump_then_drawdown_with_first_dip() {
        let cfg = SniperConfig::default();
        let mut token = Token::new(&create_event());
        pump(&mut token, &cfg);
        assert_eq!(token.state(), TokenState::Pumping);
        let peak = token.current_price_sol();

        // Five sells, each multiplying the price by ~0.7.
        let mut v_sol = 30.0 * 1.2f64.powi(10);
        let mut v_tokens = 1_000_000_000.0 / 1.2f64.powi(10);
        let mut first_dip = None;
        let mut transitions = Vec::new();
        for i in 0..5u64 {
            v_sol *= 0.7;
            v_tokens /= 0.7;
            let ev = trade(100 + i, Side::Sell, v_tokens, v_sol, 1_000.0, 0.0, 11_000 + i as i64 * 1_000);
            let update = token.on_trade(&ev, SOL_USD, &cfg);
            if first_dip.is_none() {
                first_dip = update.first_dip;
            }
            transitions.extend(update.transitions);
        }

        let dip = first_dip.expect("first dip should fire");
        assert!(dip < -0.05, "dip {dip} should be below -0.05");
        assert!(
            transitions
                .iter()
                .any(|t| t.from == TokenState::Pumping && t.to == TokenState::Drawdown),
            "expected Pumping -> Drawdown, got {transitions:?}"
        );
        assert!(token.current_price_sol() < peak);
    }

    #[test]
    fn rebound_candidate_surfaces_after_drawdown() {
        let cfg = SniperConfig::default();
        let mut token = Token::new(&create_event());
        pump(&mut token, &cfg);

        // Crash well past the drawdown threshold.
        let mut v_sol = 30.0 * 1.2f64.powi(10);
        let mut v_tokens = 1_000_000_000.0 / 1.2f64.powi(10);
        for i in 0..5u64 {
            v_sol *= 0.7;
            v_tokens /= 0.7;
            let ev = trade(100 + i, Side::Sell, v_tokens, v_sol, 1_000.0, 0.0, 11_000 + i as i64 * 1_000);
            token.on_trade(&ev, SOL_USD, &cfg);
        }
        assert_eq!(token.state(), TokenState::Drawdown);

        // Rebound past the recovery minimum (+21% from the bottom) while
        // staying inside the entry window.
        v_sol *= 1.1;
        v_tokens /= 1.1;
        let ev = trade(200, Side::Buy, v_tokens, v_sol, 1_000.0, 1_000.0, 20_000);
        let update = token.on_trade(&ev, SOL_USD, &cfg);
        let rebound = update.rebound.expect("rebound candidate expected");
        assert!(rebound.gain_pct >= cfg.thresholds.recovery_min_gain_pct);
        assert!(rebound.gain_pct <= cfg.recovery.gain.max_entry);

        // Safe + inside the entry window => Ready with a full-size hint.
        let t = token
            .resolve_rebound(rebound, true, &cfg, 20_000)
            .expect("transition expected");
        assert_eq!(t.to, TokenState::Ready);
        assert_eq!(token.size_hint(), Some(SizeHint::Full));
    }

    #[test]
    fn unsafe_rebound_goes_to_recovery() {
        let cfg = SniperConfig::default();
        let mut token = Token::new(&create_event());
        pump(&mut token, &cfg);

        let mut v_sol = 30.0 * 1.2f64.powi(10);
        let mut v_tokens = 1_000_000_000.0 / 1.2f64.powi(10);
        for i in 0..5u64 {
            v_sol *= 0.7;
            v_tokens /= 0.7;
            let ev = trade(100 + i, Side::Sell, v_tokens, v_sol, 1_000.0, 0.0, 11_000 + i as i64 * 1_000);
            token.on_trade(&ev, SOL_USD, &cfg);
        }
        v_sol *= 1.1;
        v_tokens /= 1.1;
        let ev = trade(200, Side::Buy, v_tokens, v_sol, 1_000.0, 1_000.0, 20_000);
        let update = token.on_trade(&ev, SOL_USD, &cfg);
        let rebound = update.rebound.unwrap();

        let t = token.resolve_rebound(rebound, false, &cfg, 20_000).unwrap();
        assert_eq!(t.to, TokenState::Recovery);
    }

    #[test]
    fn dead_requires_first_pump_milestone() {
        let mut cfg = SniperConfig::default();
        cfg.thresholds.dead_usd = 4_000.0;
        cfg.thresholds.first_pump_usd = 9_000.0;

        // Market cap 10 SOL = $2250: below the dead floor but never pumped.
        let mut token = Token::new(&create_event());
        let ev = trade(1, Side::Sell, 1_000_000_000.0, 10.0, 10.0, 0.0, 1_000);
        let update = token.on_trade(&ev, SOL_USD, &cfg);
        assert!(update.transitions.is_empty());
        assert_eq!(token.state(), TokenState::New);

        // Reach the first-pump milestone ($9000 = 40 SOL), then crash.
        let ev = trade(2, Side::Buy, 1_000_000_000.0, 45.0, 10.0, 10.0, 2_000);
        token.on_trade(&ev, SOL_USD, &cfg);
        assert!(token.reached_first_pump);

        let ev = trade(3, Side::Sell, 1_000_000_000.0, 15.0, 10.0, 0.0, 3_000);
        let update = token.on_trade(&ev, SOL_USD, &cfg);
        assert!(
            update.transitions.iter().any(|t| t.to == TokenState::Dead),
            "expected Dead, got {:?}",
            update.transitions
        );
    }

    #[test]
    fn supply_invariant_holds_across_trades() {
        let cfg = SniperConfig::default();
        let create = create_event();
        let mut token = Token::new(&create);
        let supply = token.total_supply();

        // Buys move tokens from the curve into wallets; keep both sides
        // consistent in the synthetic events.
        let mut v_tokens = create.v_tokens_in_bonding_curve;
        for i in 0..5u64 {
            let amount = 10_000.0;
            v_tokens -= amount;
            let ev = TradeEvent {
                mint: "mint1".into(),
                trader: format!("w{i}"),
                side: Side::Buy,
                token_amount: amount,
                new_token_balance: amount,
                v_tokens_in_bonding_curve: v_tokens,
                v_sol_in_bonding_curve: 30.0 + i as f64,
                market_cap_sol: 30.0,
                signature: format!("s{i}"),
                timestamp: (i as i64 + 1) * 1_000,
            };
            token.on_trade(&ev, SOL_USD, &cfg);

            let held = token.holders.total_balance();
            assert!(
                (held + token.token_reserve() - supply).abs() < 1e-6,
                "supply invariant broken at trade {i}"
            );
        }
    }

    #[test]
    fn highest_market_cap_is_monotone() {
        let cfg = SniperConfig::default();
        let mut token = Token::new(&create_event());

        let caps = [12.0, 40.0, 25.0, 60.0, 9.0, 55.0];
        let mut highest_seen = token.snapshot(SOL_USD, 0).highest_market_cap_sol;
        for (i, cap) in caps.iter().enumerate() {
            let ev = trade(i as u64, Side::Buy, 1_000_000_000.0, *cap, 1.0, 1.0, (i as i64 + 1) * 1_000);
            token.on_trade(&ev, SOL_USD, &cfg);
            let snap = token.snapshot(SOL_USD, (i as i64 + 1) * 1_000);
            assert!(snap.highest_market_cap_sol >= highest_seen);
            highest_seen = snap.highest_market_cap_sol;
        }
        assert!((highest_seen - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn price_increase_windows() {
        let cfg = SniperConfig::default();
        let mut token = Token::new(&create_event());

        let ev = trade(1, Side::Buy, 1_000_000_000.0, 60.0, 1.0, 1.0, 10_000);
        token.on_trade(&ev, SOL_USD, &cfg);

        // Creation price 30/1e9, now 60/1e9 => +100% over any window that
        // reaches back to creation.
        let inc = token.price_increase_ms(60_000, 10_000);
        assert!((inc - 100.0).abs() < 1e-6, "got {inc}");

        // A window that excludes every sample yields 0... but the most recent
        // sample is always inside any positive window ending now.
        let inc_tiny = token.price_increase_ms(1, 10_000);
        assert_eq!(inc_tiny, 0.0);
    }

    #[test]
    fn price_acceleration_zero_until_three_samples() {
        let cfg = SniperConfig::default();
        let mut token = Token::new(&create_event());
        assert_eq!(token.price_acceleration(), 0.0);

        token.on_trade(&trade(1, Side::Buy, 1_000_000_000.0, 33.0, 1.0, 1.0, 1_000), SOL_USD, &cfg);
        assert_eq!(token.price_acceleration(), 0.0);

        token.on_trade(&trade(2, Side::Buy, 1_000_000_000.0, 40.0, 1.0, 2.0, 2_000), SOL_USD, &cfg);
        // Velocity rising => positive acceleration.
        assert!(token.price_acceleration() > 0.0);
    }

    #[test]
    fn snapshot_carries_aggregates() {
        let cfg = SniperConfig::default();
        let mut token = Token::new(&create_event());
        token.on_trade(&trade(1, Side::Buy, 999_000_000.0, 36.0, 500.0, 500.0, 1_000), SOL_USD, &cfg);

        let snap = token.snapshot(SOL_USD, 1_000);
        assert_eq!(snap.mint, "mint1");
        assert_eq!(snap.state, TokenState::New);
        assert_eq!(snap.holder_count, 2); // creator + trader
        assert!(snap.price_usd > 0.0);
        assert!(snap.volume_windows_usd[0] > 0.0);
        assert!((snap.market_cap_usd - snap.market_cap_sol * SOL_USD).abs() < 1e-9);
    }

    #[test]
    fn terminal_tokens_ignore_trades() {
        let mut cfg = SniperConfig::default();
        cfg.thresholds.first_pump_usd = 0.0; // milestone reached immediately
        let mut token = Token::new(&create_event());

        // Crash to the dead floor.
        let ev = trade(1, Side::Sell, 1_000_000_000.0, 0.001, 1.0, 0.0, 1_000);
        token.on_trade(&ev, SOL_USD, &cfg);
        assert_eq!(token.state(), TokenState::Dead);

        let before = token.candles().candle_count(Timeframe::S1);
        token.on_trade(&trade(2, Side::Buy, 1_000_000_000.0, 50.0, 1.0, 1.0, 2_000), SOL_USD, &cfg);
        assert_eq!(token.candles().candle_count(Timeframe::S1), before);
    }
}
