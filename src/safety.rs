// =============================================================================
// Safety Gate — token-level checks run before any entry
// =============================================================================
//
// Each policy is individually toggleable and reports a human-readable reason
// on failure. The coordinator treats the gate as an opaque predicate over a
// token snapshot: `check` returns every failing reason, not just the first,
// so rejections can be logged and fed to the missed-opportunity tracker.
//
// Built-in policies:
//   - Creator dump:   creator sold too much of the initial allocation
//   - Concentration:  top holders control too much of the supply
//   - Wallet volume:  one wallet dominates recent volume
//   - Market cap:     outside the configured entry band
// =============================================================================

use serde::Serialize;
use tracing::debug;

use crate::config::SniperConfig;
use crate::token::TokenSnapshot;

/// Creator sell percentage above which a token is rejected.
const MAX_CREATOR_SELL_PCT: f64 = 50.0;
/// Top-10 concentration above which a token is rejected.
const MAX_TOP_HOLDER_PCT: f64 = 45.0;

/// Outcome of the safety predicate.
#[derive(Debug, Clone, Serialize)]
pub struct SafetyVerdict {
    pub safe: bool,
    pub reasons: Vec<String>,
}

impl SafetyVerdict {
    fn safe() -> Self {
        Self { safe: true, reasons: Vec::new() }
    }
}

/// Toggles for the built-in policies.
#[derive(Debug, Clone)]
pub struct SafetyPolicies {
    pub creator_dump: bool,
    pub concentration: bool,
    pub wallet_volume: bool,
    pub market_cap_band: bool,
}

impl Default for SafetyPolicies {
    fn default() -> Self {
        Self {
            creator_dump: true,
            concentration: true,
            wallet_volume: true,
            market_cap_band: true,
        }
    }
}

/// The opaque safety predicate handed to the coordinator.
pub struct SafetyGate {
    policies: SafetyPolicies,
}

impl SafetyGate {
    pub fn new(policies: SafetyPolicies) -> Self {
        Self { policies }
    }

    /// Run every enabled policy against the snapshot. All failing reasons are
    /// collected.
    pub fn check(&self, snapshot: &TokenSnapshot, config: &SniperConfig) -> SafetyVerdict {
        let mut reasons = Vec::new();

        if self.policies.creator_dump && snapshot.creator_sell_pct > MAX_CREATOR_SELL_PCT {
            reasons.push(format!(
                "creator sold {:.1}% of initial allocation (limit {MAX_CREATOR_SELL_PCT}%)",
                snapshot.creator_sell_pct
            ));
        }

        if self.policies.concentration
            && snapshot.top_holder_concentration_pct > MAX_TOP_HOLDER_PCT
        {
            reasons.push(format!(
                "top holders control {:.1}% of supply (limit {MAX_TOP_HOLDER_PCT}%)",
                snapshot.top_holder_concentration_pct
            ));
        }

        if self.policies.wallet_volume
            && snapshot.max_wallet_volume_pct > config.safety.max_wallet_volume_pct
        {
            reasons.push(format!(
                "single wallet drives {:.1}% of recent volume (limit {:.1}%)",
                snapshot.max_wallet_volume_pct, config.safety.max_wallet_volume_pct
            ));
        }

        if self.policies.market_cap_band {
            if snapshot.market_cap_sol < config.mcap.min {
                reasons.push(format!(
                    "market cap {:.1} SOL below minimum {:.1}",
                    snapshot.market_cap_sol, config.mcap.min
                ));
            } else if snapshot.market_cap_sol > config.mcap.max_entry {
                reasons.push(format!(
                    "market cap {:.1} SOL above entry ceiling {:.1}",
                    snapshot.market_cap_sol, config.mcap.max_entry
                ));
            }
        }

        if reasons.is_empty() {
            debug!(mint = %snapshot.mint, "safety gate passed");
            SafetyVerdict::safe()
        } else {
            debug!(mint = %snapshot.mint, reasons = ?reasons, "safety gate rejected");
            SafetyVerdict { safe: false, reasons }
        }
    }
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::new(SafetyPolicies::default())
    }
}
