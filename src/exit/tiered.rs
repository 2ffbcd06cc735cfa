// =============================================================================
// Tiered Take-Profit — partial exits on a descending profit ladder
// =============================================================================
//
// Tiers are configured sorted by descending profit threshold. On each
// evaluation, the highest untaken tier whose threshold has been reached
// fires with its fraction. The caller records taken tiers so a tier never
// triggers twice.
// =============================================================================

use crate::config::TieredTakeProfitConfig;

use super::{ExitReason, ExitSignal, PositionView};

/// Find the highest reached, not-yet-taken tier.
pub fn tiered_take_profit(
    view: &PositionView<'_>,
    config: &TieredTakeProfitConfig,
) -> Option<ExitSignal> {
    if !config.enabled || config.tiers.is_empty() {
        return None;
    }
    let profit = view.profit_pct();

    for (idx, tier) in config.tiers.iter().enumerate() {
        let taken = view.tiers_taken.get(idx).copied().unwrap_or(false);
        if !taken && profit >= tier.profit_pct {
            return Some(ExitSignal {
                reason: ExitReason::TieredTakeProfit { tier: idx },
                fraction: tier.fraction.clamp(0.0, 1.0),
            });
        }
    }
    None
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfitTier;
    use crate::exit::tests::view_with;

    fn ladder() -> TieredTakeProfitConfig {
        TieredTakeProfitConfig {
            enabled: true,
            tiers: vec![
                ProfitTier { profit_pct: 60.0, fraction: 0.2 },
                ProfitTier { profit_pct: 40.0, fraction: 0.4 },
                ProfitTier { profit_pct: 20.0, fraction: 0.4 },
            ],
        }
    }

    #[test]
    fn tier_ladder_walks_upward() {
        let cfg = ladder();
        let prices = [100.0; 2];

        // 19% profit: nothing fires.
        let taken = [false, false, false];
        let view = view_with(100.0, 119.0, 119.0, &prices, &taken);
        assert!(tiered_take_profit(&view, &cfg).is_none());

        // 20%: the bottom tier fires 0.4.
        let view = view_with(100.0, 120.0, 120.0, &prices, &taken);
        let s = tiered_take_profit(&view, &cfg).unwrap();
        assert_eq!(s.reason, ExitReason::TieredTakeProfit { tier: 2 });
        assert!((s.fraction - 0.4).abs() < f64::EPSILON);

        // 40% with the bottom tier taken: the middle tier fires 0.4.
        let taken = [false, false, true];
        let view = view_with(100.0, 140.0, 140.0, &prices, &taken);
        let s = tiered_take_profit(&view, &cfg).unwrap();
        assert_eq!(s.reason, ExitReason::TieredTakeProfit { tier: 1 });
        assert!((s.fraction - 0.4).abs() < f64::EPSILON);

        // 60% with both lower tiers taken: the top tier fires 0.2.
        let taken = [false, true, true];
        let view = view_with(100.0, 160.0, 160.0, &prices, &taken);
        let s = tiered_take_profit(&view, &cfg).unwrap();
        assert_eq!(s.reason, ExitReason::TieredTakeProfit { tier: 0 });
        assert!((s.fraction - 0.2).abs() < f64::EPSILON);

        // All taken: silent.
        let taken = [true, true, true];
        let view = view_with(100.0, 200.0, 200.0, &prices, &taken);
        assert!(tiered_take_profit(&view, &cfg).is_none());
    }

    #[test]
    fn jump_straight_to_top_tier_fires_top_first() {
        let cfg = ladder();
        let prices = [100.0; 2];
        // 70% profit, nothing taken: the highest tier wins.
        let taken = [false, false, false];
        let view = view_with(100.0, 170.0, 170.0, &prices, &taken);
        let s = tiered_take_profit(&view, &cfg).unwrap();
        assert_eq!(s.reason, ExitReason::TieredTakeProfit { tier: 0 });
    }

    #[test]
    fn disabled_or_empty_ladder_is_silent() {
        let prices = [100.0; 2];
        let view = view_with(100.0, 200.0, 200.0, &prices, &[]);

        let mut cfg = ladder();
        cfg.enabled = false;
        assert!(tiered_take_profit(&view, &cfg).is_none());

        let cfg = TieredTakeProfitConfig { enabled: true, tiers: Vec::new() };
        assert!(tiered_take_profit(&view, &cfg).is_none());
    }
}
