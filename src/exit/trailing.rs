// =============================================================================
// Trailing Exits — stop-loss and take-profit measured from the high
// =============================================================================
//
// Both strategies trail the highest observed price. The stop-loss protects
// against any decline past its threshold; the take-profit arms only once the
// position has seen enough profit and then locks gains on a trail-sized
// give-back. Each threshold can be volatility-adjusted within configured
// bounds.
// =============================================================================

use crate::config::{TrailingStopLossConfig, TrailingTakeProfitConfig};

use super::{dynamic_threshold, ExitReason, ExitSignal, PositionView};

/// Trailing stop-loss: fires when the decline from the highest observed
/// price reaches the (possibly volatility-adjusted) threshold.
pub fn stop_loss(view: &PositionView<'_>, config: &TrailingStopLossConfig) -> Option<ExitSignal> {
    if !config.enabled {
        return None;
    }
    let threshold = dynamic_threshold(config.stop_loss_pct, &config.dynamic, view.price_history);
    if view.drop_from_high_pct() >= threshold {
        Some(ExitSignal::full(ExitReason::StopLoss))
    } else {
        None
    }
}

/// Trailing take-profit: armed once the peak profit reached the initial
/// trigger, fires when the give-back from the high reaches the trail.
pub fn take_profit(
    view: &PositionView<'_>,
    config: &TrailingTakeProfitConfig,
) -> Option<ExitSignal> {
    if !config.enabled {
        return None;
    }
    if view.peak_profit_pct() < config.initial_trigger_pct {
        return None;
    }
    let trail = dynamic_threshold(config.trail_pct, &config.dynamic, view.price_history);
    if view.drop_from_high_pct() >= trail {
        Some(ExitSignal::full(ExitReason::TakeProfit))
    } else {
        None
    }
}
