// =============================================================================
// Exit Evaluation — pure strategy functions over position snapshots
// =============================================================================
//
// `evaluate` walks the configured priority order; the first enabled strategy
// to fire wins. Every evaluator is a pure function over a `PositionView` —
// nothing here mutates position state, and nothing here suspends.
//
// Strategies:
//   - trailing stop-loss / take-profit (volatility-adjusted thresholds)
//   - tiered take-profit ladder (partial exits)
//   - time limit + timed take-profit intervals
//   - volume drop / spike / dry-up
//   - price action: wick rejection, momentum loss
// =============================================================================

pub mod price_action;
pub mod tiered;
pub mod timed;
pub mod trailing;
pub mod volume;

use serde::Serialize;

use crate::config::{DynamicAdjustment, ExitStrategies, ExitStrategyKind};
use crate::token::ohlcv::Candle;

/// Why an exit fired.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TieredTakeProfit { tier: usize },
    TimeLimit,
    TimedTakeProfit,
    VolumeDrop,
    VolumeSpike,
    LowVolume,
    WickRejection,
    MomentumLoss,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "stop_loss"),
            Self::TakeProfit => write!(f, "take_profit"),
            Self::TieredTakeProfit { tier } => write!(f, "tiered_take_profit[{tier}]"),
            Self::TimeLimit => write!(f, "time_limit"),
            Self::TimedTakeProfit => write!(f, "timed_take_profit"),
            Self::VolumeDrop => write!(f, "volume_drop"),
            Self::VolumeSpike => write!(f, "volume_spike"),
            Self::LowVolume => write!(f, "low_volume"),
            Self::WickRejection => write!(f, "wick_rejection"),
            Self::MomentumLoss => write!(f, "momentum_loss"),
        }
    }
}

/// An exit decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitSignal {
    pub reason: ExitReason,
    /// Fraction of the *original* position size to close, in (0, 1].
    /// 1.0 closes whatever remains.
    pub fraction: f64,
}

impl ExitSignal {
    pub fn full(reason: ExitReason) -> Self {
        Self { reason, fraction: 1.0 }
    }

    pub fn is_full(&self) -> bool {
        (self.fraction - 1.0).abs() < f64::EPSILON
    }
}

/// Read-only view of a position handed to the evaluators.
#[derive(Debug, Clone, Copy)]
pub struct PositionView<'a> {
    pub entry_price: f64,
    pub current_price: f64,
    pub highest_price: f64,
    pub open_time: i64,
    pub now: i64,
    /// Recent price samples, oldest first (up to 60).
    pub price_history: &'a [f64],
    /// Recent `(timestamp, fiat volume)` samples, oldest first (up to 30).
    pub volume_history: &'a [(i64, f64)],
    /// Recent 1s candles, oldest first (up to 30).
    pub candle_history: &'a [Candle],
    /// Which tiers of the tiered take-profit have already been taken.
    pub tiers_taken: &'a [bool],
    /// Latched once profit crossed the time-extension threshold.
    pub profit_extension_armed: bool,
}

impl PositionView<'_> {
    /// Profit of the current price over the entry, percent.
    pub fn profit_pct(&self) -> f64 {
        if self.entry_price > 0.0 {
            (self.current_price - self.entry_price) / self.entry_price * 100.0
        } else {
            0.0
        }
    }

    /// Decline from the highest observed price, percent.
    pub fn drop_from_high_pct(&self) -> f64 {
        if self.highest_price > 0.0 {
            (self.highest_price - self.current_price) / self.highest_price * 100.0
        } else {
            0.0
        }
    }

    /// Profit at the highest observed price, percent.
    pub fn peak_profit_pct(&self) -> f64 {
        if self.entry_price > 0.0 {
            (self.highest_price - self.entry_price) / self.entry_price * 100.0
        } else {
            0.0
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        self.now - self.open_time
    }
}

// ---------------------------------------------------------------------------
// Volatility & dynamic thresholds
// ---------------------------------------------------------------------------

/// Population standard deviation of per-sample percentage returns.
/// Empty or single-sample history returns 0.
pub fn volatility(prices: &[f64]) -> f64 {
    if prices.len() < 2 {
        return 0.0;
    }
    let mut returns = Vec::with_capacity(prices.len() - 1);
    for pair in prices.windows(2) {
        if pair[0] > 0.0 {
            returns.push((pair[1] - pair[0]) / pair[0] * 100.0);
        }
    }
    if returns.is_empty() {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    variance.sqrt()
}

/// `clamp(base + volatility * multiplier, min, max)`. Falls back to the base
/// threshold when the adjustment is disabled.
pub fn dynamic_threshold(base: f64, adjustment: &DynamicAdjustment, prices: &[f64]) -> f64 {
    if !adjustment.enabled {
        return base;
    }
    let vol = volatility(prices);
    (base + vol * adjustment.volatility_multiplier).clamp(adjustment.min_pct, adjustment.max_pct)
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Evaluate all enabled strategies in the configured priority order and
/// return the first signal that fires.
pub fn evaluate(view: &PositionView<'_>, config: &ExitStrategies) -> Option<ExitSignal> {
    for kind in &config.priority {
        let signal = match kind {
            ExitStrategyKind::StopLoss => trailing::stop_loss(view, &config.trailing_stop_loss),
            ExitStrategyKind::TakeProfit => {
                trailing::take_profit(view, &config.trailing_take_profit)
            }
            ExitStrategyKind::TieredTakeProfit => {
                tiered::tiered_take_profit(view, &config.tiered_take_profit)
            }
            ExitStrategyKind::TimeBased => timed::time_based(view, &config.time_based_exit),
            ExitStrategyKind::VolumeBased => volume::volume_based(view, &config.volume_based_exit),
            ExitStrategyKind::PriceAction => {
                price_action::price_action(view, &config.price_action)
            }
        };
        if signal.is_some() {
            return signal;
        }
    }
    None
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn view_with<'a>(
        entry: f64,
        current: f64,
        highest: f64,
        prices: &'a [f64],
        tiers_taken: &'a [bool],
    ) -> PositionView<'a> {
        PositionView {
            entry_price: entry,
            current_price: current,
            highest_price: highest,
            open_time: 0,
            now: 1_000,
            price_history: prices,
            volume_history: &[],
            candle_history: &[],
            tiers_taken,
            profit_extension_armed: false,
        }
    }

    #[test]
    fn volatility_of_flat_history_is_zero() {
        assert_eq!(volatility(&[100.0, 100.0, 100.0]), 0.0);
    }

    #[test]
    fn volatility_edge_cases() {
        assert_eq!(volatility(&[]), 0.0);
        assert_eq!(volatility(&[100.0]), 0.0);
    }

    #[test]
    fn volatility_known_value() {
        // Returns: +10%, -18.1818...%, +16.6667%
        let v = volatility(&[100.0, 110.0, 90.0, 105.0]);
        assert!(v > 0.0);
        // Mean ~ 2.83, population stddev ~ 15.1 (percent units).
        assert!((v - 15.07).abs() < 0.1, "got {v}");
    }

    #[test]
    fn dynamic_threshold_clamps_to_bounds() {
        let adj = DynamicAdjustment {
            enabled: true,
            volatility_multiplier: 1.5,
            min_pct: 20.0,
            max_pct: 40.0,
        };
        // Volatile history pushes past the cap.
        let t = dynamic_threshold(30.0, &adj, &[100.0, 110.0, 90.0, 105.0]);
        assert!((20.0..=40.0).contains(&t));
        assert!((t - 40.0).abs() < f64::EPSILON, "got {t}");

        // Flat history: threshold is the base.
        let t = dynamic_threshold(30.0, &adj, &[100.0, 100.0]);
        assert!((t - 30.0).abs() < f64::EPSILON);

        // Disabled adjustment passes the base through even with volatility.
        let adj_off = DynamicAdjustment { enabled: false, ..adj };
        let t = dynamic_threshold(30.0, &adj_off, &[100.0, 110.0, 90.0, 105.0]);
        assert!((t - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn dynamic_stop_loss_within_bounds_scenario() {
        // base=30, min=20, max=40, multiplier=1.5, history [100,110,90,105].
        // Dynamic threshold lands in [20,40]; a 30% drop from the high fires
        // only if the dynamic percentage is at or below 30 — here volatility
        // pushes it to the 40% cap, so no exit.
        let cfg = crate::config::TrailingStopLossConfig {
            enabled: true,
            stop_loss_pct: 30.0,
            dynamic: DynamicAdjustment {
                enabled: true,
                volatility_multiplier: 1.5,
                min_pct: 20.0,
                max_pct: 40.0,
            },
        };
        let prices = [100.0, 110.0, 90.0, 105.0];
        let view = view_with(100.0, 105.0, 150.0, &prices, &[]);
        assert!((view.drop_from_high_pct() - 30.0).abs() < 1e-9);
        assert_eq!(trailing::stop_loss(&view, &cfg), None);

        // With the adjustment disabled the base 30% threshold fires.
        let mut cfg_base = cfg.clone();
        cfg_base.dynamic.enabled = false;
        let signal = trailing::stop_loss(&view, &cfg_base).expect("should fire");
        assert_eq!(signal.reason, ExitReason::StopLoss);
        assert!(signal.is_full());
    }

    #[test]
    fn priority_order_decides_between_simultaneous_signals() {
        // Price collapsed: both stop-loss and tiered ladder conditions could
        // be live; the configured order picks the stop-loss first.
        let mut config = ExitStrategies::default();
        config.trailing_stop_loss.dynamic.enabled = false;
        config.trailing_take_profit.enabled = false;
        config.time_based_exit.enabled = false;
        config.volume_based_exit.enabled = false;
        config.price_action.enabled = false;

        let prices = [100.0; 4];
        let taken = [false; 3];
        // Profit 30% but 35% off the high: drop >= 30 fires stop-loss; the
        // 20% tier would also match.
        let view = view_with(100.0, 130.0, 200.0, &prices, &taken);
        let signal = evaluate(&view, &config).expect("should fire");
        assert_eq!(signal.reason, ExitReason::StopLoss);

        // Reversed priority: the tier wins.
        config.priority = vec![
            ExitStrategyKind::TieredTakeProfit,
            ExitStrategyKind::StopLoss,
        ];
        let signal = evaluate(&view, &config).expect("should fire");
        assert!(matches!(signal.reason, ExitReason::TieredTakeProfit { .. }));
    }

    #[test]
    fn no_strategy_firing_returns_none() {
        let mut config = ExitStrategies::default();
        config.trailing_stop_loss.dynamic.enabled = false;
        let prices = [100.0, 101.0];
        let view = view_with(100.0, 101.0, 101.0, &prices, &[false; 3]);
        assert_eq!(evaluate(&view, &config), None);
    }
}
