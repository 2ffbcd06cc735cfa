// =============================================================================
// Price-Action Exits — wick rejection and momentum loss
// =============================================================================
//
// Works on the position's recent 1s candles:
//
//   (a) wick rejection — the latest candle has a meaningful body and a wick
//       dominating its range on either side;
//   (b) momentum loss — the last K candles print strictly shrinking bodies,
//       each still large enough to matter.
// =============================================================================

use crate::config::PriceActionConfig;

use super::{ExitReason, ExitSignal, PositionView};

pub fn price_action(view: &PositionView<'_>, config: &PriceActionConfig) -> Option<ExitSignal> {
    if !config.enabled || view.candle_history.is_empty() {
        return None;
    }
    wick_rejection(view, config).or_else(|| momentum_loss(view, config))
}

/// (a) Latest candle: body at least `min_candle_size_pct` of its open, and
/// the larger wick at least `wick_threshold_pct` of the range.
fn wick_rejection(view: &PositionView<'_>, config: &PriceActionConfig) -> Option<ExitSignal> {
    let candle = view.candle_history.last()?;
    let range = candle.range();
    if range <= 0.0 {
        return None;
    }
    if candle.body_pct_of_open() < config.min_candle_size_pct {
        return None;
    }
    let upper_pct = candle.upper_wick() / range * 100.0;
    let lower_pct = candle.lower_wick() / range * 100.0;
    if upper_pct.max(lower_pct) >= config.wick_threshold_pct {
        Some(ExitSignal::full(ExitReason::WickRejection))
    } else {
        None
    }
}

/// (b) Strictly decreasing body sizes across the last K candles, each body at
/// least `min_body_size_pct` of its open.
fn momentum_loss(view: &PositionView<'_>, config: &PriceActionConfig) -> Option<ExitSignal> {
    let k = config.momentum_candle_count;
    if k < 2 || view.candle_history.len() < k {
        return None;
    }
    let tail = &view.candle_history[view.candle_history.len() - k..];

    let all_meaningful = tail
        .iter()
        .all(|c| c.body_pct_of_open() >= config.min_body_size_pct);
    if !all_meaningful {
        return None;
    }
    let strictly_shrinking = tail.windows(2).all(|pair| pair[1].body() < pair[0].body());
    if strictly_shrinking {
        Some(ExitSignal::full(ExitReason::MomentumLoss))
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
    use crate::exit::PositionView;
    use crate::token::ohlcv::Candle;

    /// Build a candle from quote-level prices, deriving the fiat and
    /// token-native denominations. The token rate is the inverse, so its
    /// high prints at the quote low and vice versa.
    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        let inv = |p: f64| if p > 0.0 { 1.0 / p } else { 0.0 };
        Candle {
            timestamp: 0,
            open,
            high,
            low,
            close,
            open_token: inv(open),
            high_token: inv(low),
            low_token: inv(high),
            close_token: inv(close),
            open_usd: open,
            high_usd: high,
            low_usd: low,
            close_usd: close,
            volume_token: 1.0,
            volume_sol: 1.0,
            volume_usd: 1.0,
            trade_count: 1,
            market_cap_sol: 0.0,
            market_cap_usd: 0.0,
        }
    }

    #[test]
    fn fixture_candles_are_well_formed_in_every_denomination() {
        for c in [
            candle(100.0, 120.0, 100.0, 103.0),
            candle(100.0, 111.0, 99.0, 110.0),
            candle(116.0, 119.0, 116.0, 119.0),
        ] {
            assert!(c.low <= c.open && c.open <= c.high);
            assert!(c.low <= c.close && c.close <= c.high);
            assert!(c.low_token <= c.open_token && c.open_token <= c.high_token);
            assert!(c.low_token <= c.close_token && c.close_token <= c.high_token);
            assert!(c.low_usd <= c.open_usd && c.open_usd <= c.high_usd);
            assert!(c.low_usd <= c.close_usd && c.close_usd <= c.high_usd);
        }
    }

    fn view(candles: &[Candle]) -> PositionView<'_> {
        PositionView {
            entry_price: 100.0,
            current_price: 100.0,
            highest_price: 100.0,
            open_time: 0,
            now: 1_000,
            price_history: &[],
            volume_history: &[],
            candle_history: candles,
            tiers_taken: &[],
            profit_extension_armed: false,
        }
    }

    fn config() -> PriceActionConfig {
        PriceActionConfig {
            enabled: true,
            min_candle_size_pct: 2.0,
            wick_threshold_pct: 60.0,
            momentum_candle_count: 3,
            min_body_size_pct: 1.0,
        }
    }

    #[test]
    fn long_upper_wick_rejected() {
        let cfg = config();
        // Open 100, close 103 (body 3%), high 120: upper wick 17 of range 20
        // = 85% >= 60%.
        let candles = [candle(100.0, 120.0, 100.0, 103.0)];
        let s = price_action(&view(&candles), &cfg).unwrap();
        assert_eq!(s.reason, ExitReason::WickRejection);
    }

    #[test]
    fn small_body_does_not_reject() {
        let cfg = config();
        // Body only 1% of open: below min_candle_size.
        let candles = [candle(100.0, 120.0, 100.0, 101.0)];
        assert!(price_action(&view(&candles), &cfg).is_none());
    }

    #[test]
    fn balanced_candle_does_not_reject() {
        let cfg = config();
        // Body 10, tiny wicks either side.
        let candles = [candle(100.0, 111.0, 99.0, 110.0)];
        assert!(price_action(&view(&candles), &cfg).is_none());
    }

    #[test]
    fn shrinking_bodies_signal_momentum_loss() {
        let cfg = config();
        let candles = [
            candle(100.0, 110.0, 100.0, 110.0), // body 10
            candle(110.0, 116.0, 110.0, 116.0), // body 6
            candle(116.0, 119.0, 116.0, 119.0), // body 3
        ];
        let s = price_action(&view(&candles), &cfg).unwrap();
        assert_eq!(s.reason, ExitReason::MomentumLoss);
    }

    #[test]
    fn growing_body_breaks_the_sequence() {
        let cfg = config();
        let candles = [
            candle(100.0, 110.0, 100.0, 110.0), // body 10
            candle(110.0, 113.0, 110.0, 113.0), // body 3
            candle(113.0, 121.0, 113.0, 121.0), // body 8 — momentum back
        ];
        assert!(price_action(&view(&candles), &cfg).is_none());
    }

    #[test]
    fn tiny_bodies_do_not_count_as_momentum() {
        let cfg = config();
        // Strictly shrinking but the last body is under min_body_size_pct.
        let candles = [
            candle(100.0, 103.0, 100.0, 103.0), // body 3%
            candle(103.0, 105.0, 103.0, 105.0), // body ~1.9%
            candle(105.0, 105.5, 105.0, 105.5), // body ~0.5% — too small
        ];
        assert!(price_action(&view(&candles), &cfg).is_none());
    }

    #[test]
    fn needs_enough_candles() {
        let cfg = config();
        let candles = [
            candle(100.0, 110.0, 100.0, 110.0),
            candle(110.0, 116.0, 110.0, 116.0),
        ];
        assert!(price_action(&view(&candles), &cfg).is_none());
    }
}
