// =============================================================================
// Sniper Configuration — every tunable the engine recognizes, in one record
// =============================================================================
//
// Loaded once at startup from a JSON file. Unknown keys are an error at load
// time (`deny_unknown_fields` on every section); missing keys take the
// documented defaults. Persistence uses an atomic tmp + rename pattern to
// prevent corruption on crash.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn d_pump_pct() -> f64 {
    25.0
}

fn d_drawdown_pct() -> f64 {
    30.0
}

fn d_recovery_min_gain_pct() -> f64 {
    15.0
}

fn d_max_volume_drop_pct() -> f64 {
    60.0
}

fn d_position_entry_window_pct() -> f64 {
    10.0
}

fn d_min_first_pump_gain_pct() -> f64 {
    40.0
}

fn d_dead_usd() -> f64 {
    4_000.0
}

fn d_first_pump_usd() -> f64 {
    9_000.0
}

fn d_heating_up_usd() -> f64 {
    6_500.0
}

fn d_mcap_min() -> f64 {
    20.0
}

fn d_mcap_max_entry() -> f64 {
    400.0
}

fn d_recovery_drawdown_min() -> f64 {
    25.0
}

fn d_recovery_drawdown_max() -> f64 {
    70.0
}

fn d_recovery_gain_min() -> f64 {
    10.0
}

fn d_recovery_gain_max_entry() -> f64 {
    25.0
}

fn d_risk_per_trade() -> f64 {
    0.05
}

fn d_max_mcap_position() -> f64 {
    0.01
}

fn d_min_position_size() -> f64 {
    0.01
}

fn d_max_position_size() -> f64 {
    0.5
}

fn d_position_size_mcap_ratio() -> f64 {
    0.005
}

fn d_first_pump_size_ratio() -> f64 {
    0.5
}

fn d_max_wallet_volume_pct() -> f64 {
    35.0
}

fn d_price_impact_threshold() -> f64 {
    5.0
}

fn d_fee_buy() -> f64 {
    0.02
}

fn d_fee_sell() -> f64 {
    0.01
}

fn d_stop_loss_pct() -> f64 {
    30.0
}

fn d_sl_vol_multiplier() -> f64 {
    1.5
}

fn d_sl_min_pct() -> f64 {
    20.0
}

fn d_sl_max_pct() -> f64 {
    40.0
}

fn d_tp_initial_trigger_pct() -> f64 {
    40.0
}

fn d_tp_trail_pct() -> f64 {
    15.0
}

fn d_tp_vol_multiplier() -> f64 {
    1.0
}

fn d_tp_min_pct() -> f64 {
    10.0
}

fn d_tp_max_pct() -> f64 {
    25.0
}

fn d_tiers() -> Vec<ProfitTier> {
    vec![
        ProfitTier { profit_pct: 60.0, fraction: 0.2 },
        ProfitTier { profit_pct: 40.0, fraction: 0.4 },
        ProfitTier { profit_pct: 20.0, fraction: 0.4 },
    ]
}

fn d_max_duration_ms() -> i64 {
    15 * 60 * 1000
}

fn d_extension_profit_pct() -> f64 {
    20.0
}

fn d_extension_factor() -> f64 {
    1.5
}

fn d_timed_intervals() -> Vec<TimedProfitInterval> {
    vec![
        TimedProfitInterval { elapsed_ms: 2 * 60 * 1000, profit_pct: 30.0 },
        TimedProfitInterval { elapsed_ms: 5 * 60 * 1000, profit_pct: 20.0 },
        TimedProfitInterval { elapsed_ms: 10 * 60 * 1000, profit_pct: 10.0 },
    ]
}

fn d_volume_window_ms() -> i64 {
    60_000
}

fn d_volume_drop_threshold_pct() -> f64 {
    70.0
}

fn d_spike_profit_threshold_pct() -> f64 {
    15.0
}

fn d_consecutive_declines() -> usize {
    3
}

fn d_decline_pct() -> f64 {
    20.0
}

fn d_spike_lookback() -> usize {
    10
}

fn d_spike_threshold_pct() -> f64 {
    200.0
}

fn d_low_volume_threshold_pct() -> f64 {
    10.0
}

fn d_min_candle_size_pct() -> f64 {
    2.0
}

fn d_wick_threshold_pct() -> f64 {
    60.0
}

fn d_momentum_candle_count() -> usize {
    3
}

fn d_min_body_size_pct() -> f64 {
    1.0
}

fn d_exit_priority() -> Vec<ExitStrategyKind> {
    vec![
        ExitStrategyKind::StopLoss,
        ExitStrategyKind::TakeProfit,
        ExitStrategyKind::TieredTakeProfit,
        ExitStrategyKind::TimeBased,
        ExitStrategyKind::VolumeBased,
        ExitStrategyKind::PriceAction,
    ]
}

fn d_recovery_monitor_interval_ms() -> u64 {
    30_000
}

fn d_cleanup_interval_ms() -> u64 {
    300_000
}

fn d_inactivity_threshold_ms() -> i64 {
    1_800_000
}

fn d_starting_balance_sol() -> f64 {
    10.0
}

fn d_default_sol_usd() -> f64 {
    225.0
}

fn d_oracle_refresh_interval_ms() -> u64 {
    60_000
}

// =============================================================================
// Sections
// =============================================================================

/// Lifecycle detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    /// Minimum 5-minute price increase (%) for a pump.
    #[serde(default = "d_pump_pct")]
    pub pump_pct: f64,
    /// Decline from peak (%) that triggers a drawdown.
    #[serde(default = "d_drawdown_pct")]
    pub drawdown_pct: f64,
    /// Minimum rebound from bottom (%) to count as a recovery.
    #[serde(default = "d_recovery_min_gain_pct")]
    pub recovery_min_gain_pct: f64,
    /// Maximum tolerated volume collapse (%) before a token is suspect.
    #[serde(default = "d_max_volume_drop_pct")]
    pub max_volume_drop_pct: f64,
    /// How far above the bottom (%) an entry is still acceptable.
    #[serde(default = "d_position_entry_window_pct")]
    pub position_entry_window_pct: f64,
    /// Minimum gain (%) for a first-pump entry.
    #[serde(default = "d_min_first_pump_gain_pct")]
    pub min_first_pump_gain_pct: f64,
    /// USD market cap at or below which a token is dead (after first pump).
    #[serde(default = "d_dead_usd")]
    pub dead_usd: f64,
    /// USD market cap that marks the first-pump milestone.
    #[serde(default = "d_first_pump_usd")]
    pub first_pump_usd: f64,
    /// USD market cap at which a token is flagged as heating up.
    #[serde(default = "d_heating_up_usd")]
    pub heating_up_usd: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pump_pct: d_pump_pct(),
            drawdown_pct: d_drawdown_pct(),
            recovery_min_gain_pct: d_recovery_min_gain_pct(),
            max_volume_drop_pct: d_max_volume_drop_pct(),
            position_entry_window_pct: d_position_entry_window_pct(),
            min_first_pump_gain_pct: d_min_first_pump_gain_pct(),
            dead_usd: d_dead_usd(),
            first_pump_usd: d_first_pump_usd(),
            heating_up_usd: d_heating_up_usd(),
        }
    }
}

/// Market-cap entry bounds, in SOL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct McapLimits {
    #[serde(default = "d_mcap_min")]
    pub min: f64,
    #[serde(default = "d_mcap_max_entry")]
    pub max_entry: f64,
}

impl Default for McapLimits {
    fn default() -> Self {
        Self { min: d_mcap_min(), max_entry: d_mcap_max_entry() }
    }
}

/// Acceptable band for drawdown depth (%).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DrawdownBand {
    #[serde(default = "d_recovery_drawdown_min")]
    pub min: f64,
    #[serde(default = "d_recovery_drawdown_max")]
    pub max: f64,
}

impl Default for DrawdownBand {
    fn default() -> Self {
        Self { min: d_recovery_drawdown_min(), max: d_recovery_drawdown_max() }
    }
}

/// Acceptable band for rebound gain (%).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GainBand {
    #[serde(default = "d_recovery_gain_min")]
    pub min: f64,
    #[serde(default = "d_recovery_gain_max_entry")]
    pub max_entry: f64,
}

impl Default for GainBand {
    fn default() -> Self {
        Self { min: d_recovery_gain_min(), max_entry: d_recovery_gain_max_entry() }
    }
}

/// Recovery-entry qualification bands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecoveryBands {
    pub drawdown: DrawdownBand,
    pub gain: GainBand,
}

/// Position sizing rules, in SOL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PositionSizing {
    /// Fraction of the wallet balance risked per trade.
    #[serde(default = "d_risk_per_trade")]
    pub risk_per_trade: f64,
    /// Hard cap on position size as a fraction of token market cap.
    #[serde(default = "d_max_mcap_position")]
    pub max_mcap_position: f64,
    #[serde(default = "d_min_position_size")]
    pub min_position_size: f64,
    #[serde(default = "d_max_position_size")]
    pub max_position_size: f64,
    /// Size cap as a ratio of market cap (liquidity guard).
    #[serde(default = "d_position_size_mcap_ratio")]
    pub position_size_market_cap_ratio: f64,
    /// Scale factor applied to first-pump entries.
    #[serde(default = "d_first_pump_size_ratio")]
    pub first_pump_size_ratio: f64,
}

impl Default for PositionSizing {
    fn default() -> Self {
        Self {
            risk_per_trade: d_risk_per_trade(),
            max_mcap_position: d_max_mcap_position(),
            min_position_size: d_min_position_size(),
            max_position_size: d_max_position_size(),
            position_size_market_cap_ratio: d_position_size_mcap_ratio(),
            first_pump_size_ratio: d_first_pump_size_ratio(),
        }
    }
}

/// Safety-gate policy limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SafetyLimits {
    /// Maximum share (%) of recent volume attributable to a single wallet.
    #[serde(default = "d_max_wallet_volume_pct")]
    pub max_wallet_volume_pct: f64,
    /// Oracle move (%) that forces a metrics re-evaluation.
    #[serde(default = "d_price_impact_threshold")]
    pub price_impact_threshold: f64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_wallet_volume_pct: d_max_wallet_volume_pct(),
            price_impact_threshold: d_price_impact_threshold(),
        }
    }
}

/// Flat per-trade fees, in SOL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionFees {
    #[serde(default = "d_fee_buy")]
    pub buy: f64,
    #[serde(default = "d_fee_sell")]
    pub sell: f64,
}

impl Default for TransactionFees {
    fn default() -> Self {
        Self { buy: d_fee_buy(), sell: d_fee_sell() }
    }
}

// ---------------------------------------------------------------------------
// Exit strategy sub-trees
// ---------------------------------------------------------------------------

/// Volatility-based adjustment of a percentage threshold:
/// `clamp(base + volatility * multiplier, min, max)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DynamicAdjustment {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub volatility_multiplier: f64,
    pub min_pct: f64,
    pub max_pct: f64,
}

impl Default for DynamicAdjustment {
    fn default() -> Self {
        Self {
            enabled: true,
            volatility_multiplier: d_sl_vol_multiplier(),
            min_pct: d_sl_min_pct(),
            max_pct: d_sl_max_pct(),
        }
    }
}

/// Trailing stop-loss: fires when the drop from the highest observed price
/// reaches the (possibly volatility-adjusted) threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrailingStopLossConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "d_stop_loss_pct")]
    pub stop_loss_pct: f64,
    pub dynamic: DynamicAdjustment,
}

impl Default for TrailingStopLossConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stop_loss_pct: d_stop_loss_pct(),
            dynamic: DynamicAdjustment::default(),
        }
    }
}

/// Trailing take-profit: arms once profit reaches `initial_trigger_pct`,
/// then fires on a trail-sized drop from the high.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrailingTakeProfitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "d_tp_initial_trigger_pct")]
    pub initial_trigger_pct: f64,
    #[serde(default = "d_tp_trail_pct")]
    pub trail_pct: f64,
    pub dynamic: DynamicAdjustment,
}

impl Default for TrailingTakeProfitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_trigger_pct: d_tp_initial_trigger_pct(),
            trail_pct: d_tp_trail_pct(),
            dynamic: DynamicAdjustment {
                enabled: true,
                volatility_multiplier: d_tp_vol_multiplier(),
                min_pct: d_tp_min_pct(),
                max_pct: d_tp_max_pct(),
            },
        }
    }
}

/// One tier of the tiered take-profit ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfitTier {
    pub profit_pct: f64,
    pub fraction: f64,
}

/// Tiered take-profit: partial exits at descending profit thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TieredTakeProfitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Sorted descending by `profit_pct`.
    #[serde(default = "d_tiers")]
    pub tiers: Vec<ProfitTier>,
}

impl Default for TieredTakeProfitConfig {
    fn default() -> Self {
        Self { enabled: true, tiers: d_tiers() }
    }
}

/// Interval entry for the timed take-profit ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimedProfitInterval {
    pub elapsed_ms: i64,
    pub profit_pct: f64,
}

/// Profit-conditional extension of the maximum hold duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfitExtension {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "d_extension_profit_pct")]
    pub profit_threshold_pct: f64,
    #[serde(default = "d_extension_factor")]
    pub extension_factor: f64,
}

impl Default for ProfitExtension {
    fn default() -> Self {
        Self {
            enabled: true,
            profit_threshold_pct: d_extension_profit_pct(),
            extension_factor: d_extension_factor(),
        }
    }
}

/// Time-based exit plus the timed take-profit ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeBasedExitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "d_max_duration_ms")]
    pub max_duration_ms: i64,
    pub profit_extension: ProfitExtension,
    /// Sorted ascending by `elapsed_ms`.
    #[serde(default = "d_timed_intervals")]
    pub timed_take_profit: Vec<TimedProfitInterval>,
}

impl Default for TimeBasedExitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_duration_ms: d_max_duration_ms(),
            profit_extension: ProfitExtension::default(),
            timed_take_profit: d_timed_intervals(),
        }
    }
}

/// Volume-based exits: collapse from peak, spike distribution, dried-up flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VolumeBasedExitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "d_volume_window_ms")]
    pub window_ms: i64,
    /// (a) volume drop: decline from peak (%) within the window.
    #[serde(default = "d_volume_drop_threshold_pct")]
    pub drop_threshold_pct: f64,
    /// (b) volume spike: minimum profit (%) before spike exits are considered.
    #[serde(default = "d_spike_profit_threshold_pct")]
    pub spike_profit_threshold_pct: f64,
    /// (b1) consecutive period-over-period declines required.
    #[serde(default = "d_consecutive_declines")]
    pub consecutive_declines: usize,
    /// (b1) minimum decline (%) per period.
    #[serde(default = "d_decline_pct")]
    pub decline_pct: f64,
    /// (b2) samples to average for the spike baseline.
    #[serde(default = "d_spike_lookback")]
    pub spike_lookback: usize,
    /// (b2) latest volume vs baseline (%) that counts as a spike.
    #[serde(default = "d_spike_threshold_pct")]
    pub spike_threshold_pct: f64,
    /// (c) low volume: window average at or below this share (%) of peak.
    #[serde(default = "d_low_volume_threshold_pct")]
    pub low_volume_threshold_pct: f64,
}

impl Default for VolumeBasedExitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: d_volume_window_ms(),
            drop_threshold_pct: d_volume_drop_threshold_pct(),
            spike_profit_threshold_pct: d_spike_profit_threshold_pct(),
            consecutive_declines: d_consecutive_declines(),
            decline_pct: d_decline_pct(),
            spike_lookback: d_spike_lookback(),
            spike_threshold_pct: d_spike_threshold_pct(),
            low_volume_threshold_pct: d_low_volume_threshold_pct(),
        }
    }
}

/// Price-action exits: wick rejection and momentum loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PriceActionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum candle body (% of open) for a wick signal to count.
    #[serde(default = "d_min_candle_size_pct")]
    pub min_candle_size_pct: f64,
    /// Wick share (%) of the candle range that signals rejection.
    #[serde(default = "d_wick_threshold_pct")]
    pub wick_threshold_pct: f64,
    /// Number of strictly shrinking candles that signals momentum loss.
    #[serde(default = "d_momentum_candle_count")]
    pub momentum_candle_count: usize,
    /// Minimum body (% of open) for a candle to participate in the
    /// momentum-loss sequence.
    #[serde(default = "d_min_body_size_pct")]
    pub min_body_size_pct: f64,
}

impl Default for PriceActionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_candle_size_pct: d_min_candle_size_pct(),
            wick_threshold_pct: d_wick_threshold_pct(),
            momentum_candle_count: d_momentum_candle_count(),
            min_body_size_pct: d_min_body_size_pct(),
        }
    }
}

/// Names of the individual exit evaluators, for the priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStrategyKind {
    StopLoss,
    TakeProfit,
    TieredTakeProfit,
    TimeBased,
    VolumeBased,
    PriceAction,
}

/// All exit strategies plus their evaluation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExitStrategies {
    pub trailing_stop_loss: TrailingStopLossConfig,
    pub trailing_take_profit: TrailingTakeProfitConfig,
    pub tiered_take_profit: TieredTakeProfitConfig,
    pub time_based_exit: TimeBasedExitConfig,
    pub volume_based_exit: VolumeBasedExitConfig,
    pub price_action: PriceActionConfig,
    /// First evaluator in this order to fire wins.
    #[serde(default = "d_exit_priority")]
    pub priority: Vec<ExitStrategyKind>,
}

impl Default for ExitStrategies {
    fn default() -> Self {
        Self {
            trailing_stop_loss: TrailingStopLossConfig::default(),
            trailing_take_profit: TrailingTakeProfitConfig::default(),
            tiered_take_profit: TieredTakeProfitConfig::default(),
            time_based_exit: TimeBasedExitConfig::default(),
            volume_based_exit: VolumeBasedExitConfig::default(),
            price_action: PriceActionConfig::default(),
            priority: d_exit_priority(),
        }
    }
}

/// Periodic task intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timers {
    #[serde(default = "d_recovery_monitor_interval_ms")]
    pub recovery_monitor_interval_ms: u64,
    #[serde(default = "d_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
    #[serde(default = "d_inactivity_threshold_ms")]
    pub inactivity_threshold_ms: i64,
}

impl Default for Timers {
    fn default() -> Self {
        Self {
            recovery_monitor_interval_ms: d_recovery_monitor_interval_ms(),
            cleanup_interval_ms: d_cleanup_interval_ms(),
            inactivity_threshold_ms: d_inactivity_threshold_ms(),
        }
    }
}

/// Oracle refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OracleSettings {
    #[serde(default = "d_oracle_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Rate used until the first successful fetch, and after fetch failures.
    #[serde(default = "d_default_sol_usd")]
    pub default_sol_usd: f64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            refresh_interval_ms: d_oracle_refresh_interval_ms(),
            default_sol_usd: d_default_sol_usd(),
        }
    }
}

// =============================================================================
// SniperConfig
// =============================================================================

/// Top-level configuration for the Pulsar engine.
///
/// Every field has a serde default so that older JSON files missing new fields
/// still deserialise; unknown keys anywhere in the tree are a load error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SniperConfig {
    pub thresholds: Thresholds,
    pub mcap: McapLimits,
    pub recovery: RecoveryBands,
    pub position: PositionSizing,
    pub safety: SafetyLimits,
    pub transaction_fees: TransactionFees,
    pub exit_strategies: ExitStrategies,
    pub timers: Timers,
    pub oracle: OracleSettings,
    #[serde(default = "d_starting_balance_sol")]
    pub starting_balance_sol: f64,
}

impl Default for SniperConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            mcap: McapLimits::default(),
            recovery: RecoveryBands::default(),
            position: PositionSizing::default(),
            safety: SafetyLimits::default(),
            transaction_fees: TransactionFees::default(),
            exit_strategies: ExitStrategies::default(),
            timers: Timers::default(),
            oracle: OracleSettings::default(),
            starting_balance_sol: d_starting_balance_sol(),
        }
    }
}

impl SniperConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read sniper config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse sniper config from {}", path.display()))?;

        info!(
            path = %path.display(),
            pump_pct = config.thresholds.pump_pct,
            drawdown_pct = config.thresholds.drawdown_pct,
            "sniper config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise sniper config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "sniper config saved (atomic)");
        Ok(())
    }
}
