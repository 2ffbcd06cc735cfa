// =============================================================================
// Volume-Based Exits — collapse from peak, distribution spikes, dry-up
// =============================================================================
//
// Three conditions over the position's `(timestamp, fiat volume)` samples:
//
//   (a) volume drop — the latest in-window sample has fallen from the
//       in-window peak by at least the drop threshold;
//   (b) volume spike — with enough profit on the table, either a run of
//       consecutive period-over-period declines, or one sample towering
//       over the lookback average (distribution into strength);
//   (c) low volume — the in-window average has shrivelled to a sliver of
//       the all-history peak.
// =============================================================================

use crate::config::VolumeBasedExitConfig;

use super::{ExitReason, ExitSignal, PositionView};

pub fn volume_based(
    view: &PositionView<'_>,
    config: &VolumeBasedExitConfig,
) -> Option<ExitSignal> {
    if !config.enabled || view.volume_history.is_empty() {
        return None;
    }
    volume_drop(view, config)
        .or_else(|| volume_spike(view, config))
        .or_else(|| low_volume(view, config))
}

/// (a) Decline from the in-window peak to the latest sample.
fn volume_drop(view: &PositionView<'_>, config: &VolumeBasedExitConfig) -> Option<ExitSignal> {
    let window: Vec<f64> = view
        .volume_history
        .iter()
        .filter(|(t, _)| view.now - t <= config.window_ms)
        .map(|&(_, v)| v)
        .collect();
    if window.len() < 2 {
        return None;
    }
    let peak = window.iter().copied().fold(f64::MIN, f64::max);
    let current = *window.last()?;
    if peak <= 0.0 {
        return None;
    }
    let drop_pct = (peak - current) / peak * 100.0;
    if drop_pct >= config.drop_threshold_pct {
        Some(ExitSignal::full(ExitReason::VolumeDrop))
    } else {
        None
    }
}

/// (b) Distribution detection, gated on profit.
fn volume_spike(view: &PositionView<'_>, config: &VolumeBasedExitConfig) -> Option<ExitSignal> {
    if view.profit_pct() < config.spike_profit_threshold_pct {
        return None;
    }
    let volumes: Vec<f64> = view.volume_history.iter().map(|&(_, v)| v).collect();

    // (b1) N consecutive period-over-period declines of at least decline_pct.
    if volumes.len() > config.consecutive_declines {
        let tail = &volumes[volumes.len() - config.consecutive_declines - 1..];
        let all_declining = tail.windows(2).all(|pair| {
            pair[0] > 0.0 && (pair[0] - pair[1]) / pair[0] * 100.0 >= config.decline_pct
        });
        if all_declining {
            return Some(ExitSignal::full(ExitReason::VolumeSpike));
        }
    }

    // (b2) Latest sample towering over the lookback average.
    if volumes.len() > config.spike_lookback {
        let latest = *volumes.last()?;
        let lookback = &volumes[volumes.len() - 1 - config.spike_lookback..volumes.len() - 1];
        let avg = lookback.iter().sum::<f64>() / lookback.len() as f64;
        if avg > 0.0 && (latest / avg - 1.0) * 100.0 >= config.spike_threshold_pct {
            return Some(ExitSignal::full(ExitReason::VolumeSpike));
        }
    }

    None
}

/// (c) In-window average at or below the configured share of the peak.
fn low_volume(view: &PositionView<'_>, config: &VolumeBasedExitConfig) -> Option<ExitSignal> {
    let peak = view
        .volume_history
        .iter()
        .map(|&(_, v)| v)
        .fold(f64::MIN, f64::max);
    if peak <= 0.0 {
        return None;
    }
    let window: Vec<f64> = view
        .volume_history
        .iter()
        .filter(|(t, _)| view.now - t <= config.window_ms)
        .map(|&(_, v)| v)
        .collect();
    if window.is_empty() {
        return None;
    }
    let avg = window.iter().sum::<f64>() / window.len() as f64;
    if avg / peak * 100.0 <= config.low_volume_threshold_pct {
        Some(ExitSignal::full(ExitReason::LowVolume))
    } else {
        None
    }
}
