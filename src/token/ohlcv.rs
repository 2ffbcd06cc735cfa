// =============================================================================
// OHLCV Aggregator — multi-timeframe candles in token / SOL / USD denominations
// =============================================================================
//
// Trades fold into 1-second candles; every higher timeframe is rolled up from
// the 1s series on demand (1s candles are never destroyed during a token's
// lifetime, so rollups are exact). Indicator values are memoised per
// timeframe and invalidated whenever a candle changes.
//
// Cross detection runs when a candle bucket closes: EMA(9)/EMA(21),
// EMA(21)/EMA(55) and close-vs-VWAP(24), with equality at either endpoint
// treated as no cross.
// =============================================================================

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::events::{CrossDirection, CrossEvent, CrossKind};

// ---------------------------------------------------------------------------
// Timeframes
// ---------------------------------------------------------------------------

/// Supported candle timeframes. The trading set drives cross detection; the
/// analytics set exists for dashboards and the recovery monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    S1,
    S5,
    S15,
    S30,
    M1,
    M5,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// All maintained timeframes, shortest first.
    pub const ALL: [Timeframe; 10] = [
        Self::S1,
        Self::S5,
        Self::S15,
        Self::S30,
        Self::M1,
        Self::M5,
        Self::M30,
        Self::H1,
        Self::H4,
        Self::D1,
    ];

    /// Timeframes the trading logic watches for crosses.
    pub const TRADING: [Timeframe; 5] = [Self::S1, Self::S5, Self::S15, Self::S30, Self::M1];

    pub fn duration_ms(self) -> i64 {
        match self {
            Self::S1 => 1_000,
            Self::S5 => 5_000,
            Self::S15 => 15_000,
            Self::S30 => 30_000,
            Self::M1 => 60_000,
            Self::M5 => 300_000,
            Self::M30 => 1_800_000,
            Self::H1 => 3_600_000,
            Self::H4 => 14_400_000,
            Self::D1 => 86_400_000,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::S1 => "1s",
            Self::S5 => "5s",
            Self::S15 => "15s",
            Self::S30 => "30s",
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    /// Start of the bucket containing `timestamp_ms`.
    pub fn bucket_start(self, timestamp_ms: i64) -> i64 {
        let d = self.duration_ms();
        (timestamp_ms.div_euclid(d)) * d
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ---------------------------------------------------------------------------
// Candle
// ---------------------------------------------------------------------------

/// One OHLCV candle. Prices and volume both carry all three denominations:
/// token-native (tokens per SOL), quote (SOL per token), and fiat (USD per
/// token). The low/high ordering holds within each denomination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    /// Bucket start, aligned to the timeframe boundary (epoch ms).
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Token-denominated price levels (tokens per SOL). A zero quote price
    /// short-circuits to 0.
    pub open_token: f64,
    pub high_token: f64,
    pub low_token: f64,
    pub close_token: f64,
    pub open_usd: f64,
    pub high_usd: f64,
    pub low_usd: f64,
    pub close_usd: f64,
    pub volume_token: f64,
    pub volume_sol: f64,
    pub volume_usd: f64,
    pub trade_count: u64,
    pub market_cap_sol: f64,
    pub market_cap_usd: f64,
}

/// Token-denominated exchange rate (tokens per SOL) for a quote price.
fn tokens_per_sol(price_sol: f64) -> f64 {
    if price_sol > 0.0 {
        1.0 / price_sol
    } else {
        0.0
    }
}

impl Candle {
    fn open_at(obs: &TradeObservation, bucket: i64) -> Self {
        let price_usd = obs.price_sol * obs.sol_usd;
        let price_token = tokens_per_sol(obs.price_sol);
        let volume_sol = obs.token_volume * obs.price_sol;
        Self {
            timestamp: bucket,
            open: obs.price_sol,
            high: obs.price_sol,
            low: obs.price_sol,
            close: obs.price_sol,
            open_token: price_token,
            high_token: price_token,
            low_token: price_token,
            close_token: price_token,
            open_usd: price_usd,
            high_usd: price_usd,
            low_usd: price_usd,
            close_usd: price_usd,
            volume_token: obs.token_volume,
            volume_sol,
            volume_usd: volume_sol * obs.sol_usd,
            trade_count: 1,
            market_cap_sol: obs.market_cap_sol,
            market_cap_usd: obs.market_cap_sol * obs.sol_usd,
        }
    }

    fn apply(&mut self, obs: &TradeObservation) {
        let price_usd = obs.price_sol * obs.sol_usd;
        let price_token = tokens_per_sol(obs.price_sol);
        let volume_sol = obs.token_volume * obs.price_sol;

        self.high = self.high.max(obs.price_sol);
        self.low = self.low.min(obs.price_sol);
        self.close = obs.price_sol;
        self.high_token = self.high_token.max(price_token);
        self.low_token = self.low_token.min(price_token);
        self.close_token = price_token;
        self.high_usd = self.high_usd.max(price_usd);
        self.low_usd = self.low_usd.min(price_usd);
        self.close_usd = price_usd;
        self.volume_token += obs.token_volume;
        self.volume_sol += volume_sol;
        self.volume_usd += volume_sol * obs.sol_usd;
        self.trade_count += 1;
        self.market_cap_sol = obs.market_cap_sol;
        self.market_cap_usd = obs.market_cap_sol * obs.sol_usd;
    }

    /// Typical price, USD denomination.
    pub fn typical_price_usd(&self) -> f64 {
        (self.high_usd + self.low_usd + self.close_usd) / 3.0
    }

    /// Absolute open-to-close extent, SOL denomination.
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// High-to-low extent, SOL denomination.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_green(&self) -> bool {
        self.close > self.open
    }

    /// Body as a percentage of the open price. 0 when the open is 0.
    pub fn body_pct_of_open(&self) -> f64 {
        if self.open > 0.0 {
            self.body() / self.open * 100.0
        } else {
            0.0
        }
    }
}

/// A single trade observation to fold into the candle store.
#[derive(Debug, Clone, Copy)]
pub struct TradeObservation {
    pub price_sol: f64,
    pub token_volume: f64,
    pub market_cap_sol: f64,
    pub timestamp: i64,
    /// Oracle rate captured at observation time.
    pub sol_usd: f64,
}

// ---------------------------------------------------------------------------
// Pure indicator functions
// ---------------------------------------------------------------------------

/// Simple moving average over the last `n` values. `None` when there is not
/// enough data or `n` is zero.
pub fn sma(values: &[f64], n: usize) -> Option<f64> {
    if n == 0 || values.len() < n {
        return None;
    }
    Some(values[values.len() - n..].iter().sum::<f64>() / n as f64)
}

/// Exponential moving average over the whole slice with look-back `n`.
/// Seeded with the first value; multiplier is 2/(n+1).
pub fn ema(values: &[f64], n: usize) -> Option<f64> {
    if n == 0 || values.is_empty() {
        return None;
    }
    let multiplier = 2.0 / (n as f64 + 1.0);
    let mut current = values[0];
    for &v in &values[1..] {
        current = v * multiplier + current * (1.0 - multiplier);
    }
    Some(current)
}

/// Full EMA series (one output per input), same seeding as [`ema`].
pub fn ema_series(values: &[f64], n: usize) -> Vec<f64> {
    if n == 0 || values.is_empty() {
        return Vec::new();
    }
    let multiplier = 2.0 / (n as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut current = values[0];
    out.push(current);
    for &v in &values[1..] {
        current = v * multiplier + current * (1.0 - multiplier);
        out.push(current);
    }
    out
}

/// Volume-weighted average price over the last `n` candles, USD denomination.
/// Returns 0 when the volume sum is 0.
pub fn vwap(candles: &[Candle], n: usize) -> f64 {
    if n == 0 || candles.is_empty() {
        return 0.0;
    }
    let start = candles.len().saturating_sub(n);
    let window = &candles[start..];
    let volume_sum: f64 = window.iter().map(|c| c.volume_usd).sum();
    if volume_sum <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = window
        .iter()
        .map(|c| c.volume_usd * c.typical_price_usd())
        .sum();
    weighted / volume_sum
}

// ---------------------------------------------------------------------------
// CandleStore
// ---------------------------------------------------------------------------

/// EMA pairs watched for crosses on each trading timeframe.
const CROSS_EMA_PAIRS: [(usize, usize); 2] = [(9, 21), (21, 55)];
/// VWAP look-back for the close-vs-VWAP cross.
const CROSS_VWAP_PERIOD: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CrossId {
    Ema(usize, usize),
    Vwap,
}

/// Per-token candle store across all timeframes.
#[derive(Debug)]
pub struct CandleStore {
    mint: String,
    frames: HashMap<Timeframe, BTreeMap<i64, Candle>>,
    /// Memoised indicator values, invalidated on every candle mutation.
    cache: HashMap<(Timeframe, &'static str, usize), f64>,
    /// Sign of the fast-minus-slow difference at the last closed candle, per
    /// (timeframe, pair). 0 means tie or unknown.
    cross_signs: HashMap<(Timeframe, CrossId), i8>,
}

impl CandleStore {
    pub fn new(mint: impl Into<String>) -> Self {
        Self {
            mint: mint.into(),
            frames: HashMap::new(),
            cache: HashMap::new(),
            cross_signs: HashMap::new(),
        }
    }

    /// Fold a trade into every timeframe and return any indicator crosses
    /// produced by candles that closed as a result.
    pub fn record_trade(&mut self, obs: TradeObservation) -> Vec<CrossEvent> {
        let mut crosses = Vec::new();

        // 1s fold first; note which trading timeframes opened a fresh bucket
        // (their previous candle just closed).
        for tf in Timeframe::ALL {
            let bucket = tf.bucket_start(obs.timestamp);
            let frame = self.frames.entry(tf).or_default();
            let closed_previous =
                !frame.contains_key(&bucket) && frame.keys().next_back().is_some_and(|&k| k < bucket);

            // Higher timeframes get corrected by the exact rollup below; the
            // in-place fold keeps the current bucket usable mid-period.
            match frame.get_mut(&bucket) {
                Some(candle) => candle.apply(&obs),
                None => {
                    frame.insert(bucket, Candle::open_at(&obs, bucket));
                }
            }

            if closed_previous && Timeframe::TRADING.contains(&tf) {
                crosses.extend(self.detect_crosses(tf));
            }
        }

        // Exact rollup of the current higher-timeframe buckets from 1s data.
        self.roll_up(obs.timestamp);

        // Any candle mutation invalidates the memoised indicators.
        self.cache.clear();

        crosses
    }

    /// Recompute each higher timeframe's bucket containing `timestamp` from
    /// the 1s candles inside `[period_start, period_start + duration)`.
    fn roll_up(&mut self, timestamp: i64) {
        let ones: Vec<Candle> = match self.frames.get(&Timeframe::S1) {
            Some(frame) => frame.values().cloned().collect(),
            None => return,
        };

        for tf in Timeframe::ALL.into_iter().skip(1) {
            let period_start = tf.bucket_start(timestamp);
            let period_end = period_start + tf.duration_ms();
            let members: Vec<&Candle> = ones
                .iter()
                .filter(|c| c.timestamp >= period_start && c.timestamp < period_end)
                .collect();
            let Some(first) = members.first() else { continue };
            let last = members[members.len() - 1];

            let mut rolled = Candle {
                timestamp: period_start,
                open: first.open,
                high: f64::MIN,
                low: f64::MAX,
                close: last.close,
                open_token: first.open_token,
                high_token: f64::MIN,
                low_token: f64::MAX,
                close_token: last.close_token,
                open_usd: first.open_usd,
                high_usd: f64::MIN,
                low_usd: f64::MAX,
                close_usd: last.close_usd,
                volume_token: 0.0,
                volume_sol: 0.0,
                volume_usd: 0.0,
                trade_count: 0,
                market_cap_sol: last.market_cap_sol,
                market_cap_usd: last.market_cap_usd,
            };
            for c in &members {
                rolled.high = rolled.high.max(c.high);
                rolled.low = rolled.low.min(c.low);
                rolled.high_token = rolled.high_token.max(c.high_token);
                rolled.low_token = rolled.low_token.min(c.low_token);
                rolled.high_usd = rolled.high_usd.max(c.high_usd);
                rolled.low_usd = rolled.low_usd.min(c.low_usd);
                rolled.volume_token += c.volume_token;
                rolled.volume_sol += c.volume_sol;
                rolled.volume_usd += c.volume_usd;
                rolled.trade_count += c.trade_count;
            }

            self.frames
                .entry(tf)
                .or_default()
                .insert(period_start, rolled);
        }
    }

    /// Detect crosses at the freshly closed candle of `tf`. The comparison is
    /// between the stored sign (previous closed candle) and the new sign; a
    /// tie at either endpoint produces no cross.
    fn detect_crosses(&mut self, tf: Timeframe) -> Vec<CrossEvent> {
        // The caller invokes this right after a fresh bucket opened; drop that
        // in-progress candle so the evaluation runs on the closed series.
        let mut candles = self.recent(tf, 201);
        candles.pop();
        if candles.len() < 2 {
            return Vec::new();
        }
        let last = &candles[candles.len() - 1];
        let closes: Vec<f64> = candles.iter().map(|c| c.close_usd).collect();

        let mut out = Vec::new();

        for (fast, slow) in CROSS_EMA_PAIRS {
            let (Some(f), Some(s)) = (ema(&closes, fast), ema(&closes, slow)) else {
                continue;
            };
            let sign = diff_sign(f - s);
            let key = (tf, CrossId::Ema(fast, slow));
            let prev = self.cross_signs.insert(key, sign).unwrap_or(0);
            if prev != 0 && sign != 0 && prev != sign {
                out.push(CrossEvent {
                    mint: self.mint.clone(),
                    kind: CrossKind::EmaFastSlow { fast, slow },
                    direction: if sign > 0 { CrossDirection::Up } else { CrossDirection::Down },
                    timeframe: tf.label().to_string(),
                    timestamp: last.timestamp,
                    price: last.close_usd,
                    cross_value: s,
                });
            }
        }

        let vw = vwap(&candles, CROSS_VWAP_PERIOD);
        if vw > 0.0 {
            let sign = diff_sign(last.close_usd - vw);
            let key = (tf, CrossId::Vwap);
            let prev = self.cross_signs.insert(key, sign).unwrap_or(0);
            if prev != 0 && sign != 0 && prev != sign {
                out.push(CrossEvent {
                    mint: self.mint.clone(),
                    kind: CrossKind::PriceVwap { period: CROSS_VWAP_PERIOD },
                    direction: if sign > 0 { CrossDirection::Up } else { CrossDirection::Down },
                    timeframe: tf.label().to_string(),
                    timestamp: last.timestamp,
                    price: last.close_usd,
                    cross_value: vw,
                });
            }
        }

        out
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// The most recent `n` candles of `tf`, oldest first.
    pub fn recent(&self, tf: Timeframe, n: usize) -> Vec<Candle> {
        match self.frames.get(&tf) {
            Some(frame) => {
                let skip = frame.len().saturating_sub(n);
                frame.values().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn latest(&self, tf: Timeframe) -> Option<&Candle> {
        self.frames.get(&tf).and_then(|f| f.values().next_back())
    }

    pub fn candle_count(&self, tf: Timeframe) -> usize {
        self.frames.get(&tf).map_or(0, BTreeMap::len)
    }

    /// USD closes of the most recent `n` candles, oldest first.
    pub fn closes_usd(&self, tf: Timeframe, n: usize) -> Vec<f64> {
        self.recent(tf, n).iter().map(|c| c.close_usd).collect()
    }

    /// Memoised SMA over the USD closes of `tf`.
    pub fn sma_usd(&mut self, tf: Timeframe, n: usize) -> Option<f64> {
        if let Some(&v) = self.cache.get(&(tf, "sma", n)) {
            return Some(v);
        }
        let closes = self.closes_usd(tf, n.max(1) * 4);
        let v = sma(&closes, n)?;
        self.cache.insert((tf, "sma", n), v);
        Some(v)
    }

    /// Memoised EMA over the USD closes of `tf`.
    pub fn ema_usd(&mut self, tf: Timeframe, n: usize) -> Option<f64> {
        if let Some(&v) = self.cache.get(&(tf, "ema", n)) {
            return Some(v);
        }
        let closes = self.closes_usd(tf, 200);
        let v = ema(&closes, n)?;
        self.cache.insert((tf, "ema", n), v);
        Some(v)
    }

    /// Memoised VWAP over the last `n` candles of `tf`.
    pub fn vwap_usd(&mut self, tf: Timeframe, n: usize) -> f64 {
        if let Some(&v) = self.cache.get(&(tf, "vwap", n)) {
            return v;
        }
        let v = vwap(&self.recent(tf, n), n);
        self.cache.insert((tf, "vwap", n), v);
        v
    }
}

fn diff_sign(d: f64) -> i8 {
    if d > 0.0 {
        1
    } else if d < 0.0 {
        -1
    } else {
        0
    }
}
