// =============================================================================
// Time-Based Exits — hold-duration limit and timed take-profit intervals
// =============================================================================
//
// Two evaluators share the `time_based_exit` configuration:
//
//   1. Time limit: close when the position has been open past the maximum
//      duration. A profitable position extends that duration once by the
//      configured factor.
//   2. Timed take-profit: interval entries pair an elapsed time with a
//      minimum profit; the applicable interval is the one with the largest
//      `elapsed_ms` not exceeding the position age.
// =============================================================================

use crate::config::TimeBasedExitConfig;

use super::{ExitReason, ExitSignal, PositionView};

/// Evaluate the time-limit and timed-take-profit rules, in that order.
pub fn time_based(view: &PositionView<'_>, config: &TimeBasedExitConfig) -> Option<ExitSignal> {
    if !config.enabled {
        return None;
    }
    time_limit(view, config).or_else(|| timed_take_profit(view, config))
}

fn time_limit(view: &PositionView<'_>, config: &TimeBasedExitConfig) -> Option<ExitSignal> {
    let ext = &config.profit_extension;
    let extended = ext.enabled
        && (view.profit_extension_armed || view.profit_pct() >= ext.profit_threshold_pct);
    let max_duration = if extended {
        (config.max_duration_ms as f64 * ext.extension_factor) as i64
    } else {
        config.max_duration_ms
    };

    if view.elapsed_ms() >= max_duration {
        Some(ExitSignal::full(ExitReason::TimeLimit))
    } else {
        None
    }
}

fn timed_take_profit(view: &PositionView<'_>, config: &TimeBasedExitConfig) -> Option<ExitSignal> {
    let elapsed = view.elapsed_ms();
    let interval = config
        .timed_take_profit
        .iter()
        .filter(|i| i.elapsed_ms <= elapsed)
        .max_by_key(|i| i.elapsed_ms)?;

    if view.profit_pct() >= interval.profit_pct {
        Some(ExitSignal::full(ExitReason::TimedTakeProfit))
    } else {
        None
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProfitExtension, TimedProfitInterval};
    use crate::exit::PositionView;

    fn config() -> TimeBasedExitConfig {
        TimeBasedExitConfig {
            enabled: true,
            max_duration_ms: 10_000,
            profit_extension: ProfitExtension {
                enabled: true,
                profit_threshold_pct: 20.0,
                extension_factor: 1.5,
            },
            timed_take_profit: vec![
                TimedProfitInterval { elapsed_ms: 2_000, profit_pct: 30.0 },
                TimedProfitInterval { elapsed_ms: 5_000, profit_pct: 10.0 },
            ],
        }
    }

    fn view_at(elapsed: i64, entry: f64, current: f64) -> PositionView<'static> {
        PositionView {
            entry_price: entry,
            current_price: current,
            highest_price: current.max(entry),
            open_time: 0,
            now: elapsed,
            price_history: &[],
            volume_history: &[],
            candle_history: &[],
            tiers_taken: &[],
            profit_extension_armed: false,
        }
    }

    #[test]
    fn time_limit_fires_at_max_duration() {
        let cfg = config();
        // Flat position at 10s: limit reached.
        let view = view_at(10_000, 100.0, 100.0);
        let s = time_based(&view, &cfg).unwrap();
        assert_eq!(s.reason, ExitReason::TimeLimit);
        assert!(s.is_full());

        // 9s: not yet.
        let view = view_at(9_000, 100.0, 100.0);
        assert!(time_based(&view, &cfg).is_none());
    }

    #[test]
    fn profitable_position_extends_duration() {
        let cfg = config();
        // 25% profit at 12s: extension pushes the limit to 15s — but the
        // timed take-profit ladder fires first at that profit level.
        let view = view_at(12_000, 100.0, 125.0);
        let s = time_based(&view, &cfg).unwrap();
        assert_eq!(s.reason, ExitReason::TimedTakeProfit);

        // 5% profit at 12s: no extension (below 20% threshold), limit hit.
        let view = view_at(12_000, 100.0, 105.0);
        let s = time_based(&view, &cfg).unwrap();
        assert_eq!(s.reason, ExitReason::TimeLimit);
    }

    #[test]
    fn armed_extension_applies_even_after_profit_faded() {
        let cfg = config();
        let mut view = view_at(12_000, 100.0, 105.0);
        view.profit_extension_armed = true;
        // Armed: limit extended to 15s, profit 5% below every interval.
        assert!(time_based(&view, &cfg).is_none());

        view.now = 15_000;
        let s = time_based(&view, &cfg).unwrap();
        assert_eq!(s.reason, ExitReason::TimeLimit);
    }

    #[test]
    fn timed_interval_uses_largest_elapsed_not_exceeding_age() {
        let cfg = config();
        // At 3s the 2s/30% interval applies: 15% profit is not enough.
        let view = view_at(3_000, 100.0, 115.0);
        assert!(time_based(&view, &cfg).is_none());

        // At 6s the 5s/10% interval applies: 15% fires.
        let view = view_at(6_000, 100.0, 115.0);
        let s = time_based(&view, &cfg).unwrap();
        assert_eq!(s.reason, ExitReason::TimedTakeProfit);

        // Before any interval: silent.
        let view = view_at(1_000, 100.0, 200.0);
        assert!(time_based(&view, &cfg).is_none());
    }

    #[test]
    fn disabled_config_is_silent() {
        let mut cfg = config();
        cfg.enabled = false;
        let view = view_at(100_000, 100.0, 100.0);
        assert!(time_based(&view, &cfg).is_none());
    }
}
