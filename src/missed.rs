// =============================================================================
// Missed-Opportunity Tracker — shadow tracking of rejected tokens
// =============================================================================
//
// When the safety gate rejects an entry, the token keeps trading without us.
// This module opens a shadow record at rejection time, rides along on every
// subsequent trade to capture the peak the token went on to reach, and — when
// the token dies or is evicted — appends the full story to a daily JSON file
// for offline policy calibration.
//
// Persisted layout: `logs/missed_opportunities/missed_opportunities_YYYY-MM-DD.json`,
// a JSON array of records. Files rotate daily by the date in the name; a file
// past the size cap is renamed with a timestamp suffix and a fresh array
// starts.
// =============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::token::TokenSnapshot;

/// Size-based rotation threshold (500 MiB).
const MAX_FILE_BYTES: u64 = 500 * 1024 * 1024;

/// Observed values behind the failed checks, for calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdAnalysis {
    pub creator_sell_pct: f64,
    pub top_holder_concentration_pct: f64,
    pub max_wallet_volume_pct: f64,
    pub market_cap_sol: f64,
}

/// Peak reached after the rejection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakData {
    pub peak_price: f64,
    pub peak_market_cap: f64,
    pub peak_time: i64,
}

/// Token part of a persisted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissedTokenRecord {
    pub mint: String,
    pub initial_price: f64,
    pub initial_market_cap: f64,
    pub failed_at: String,
    pub failed_checks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_data: Option<PeakData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub potential_profit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_analysis: Option<ThresholdAnalysis>,
}

/// One persisted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissedOpportunityRecord {
    /// RFC 3339 finalize time.
    pub timestamp: String,
    pub token: MissedTokenRecord,
}

/// In-memory shadow of a rejected token.
#[derive(Debug, Clone)]
struct ShadowRecord {
    initial_price: f64,
    initial_market_cap: f64,
    failed_at: String,
    failed_checks: Vec<String>,
    analysis: ThresholdAnalysis,
    peak_price: f64,
    peak_market_cap: f64,
    peak_time: i64,
    last_seen: i64,
}

/// Tracks rejected tokens and appends finalized records to daily files.
pub struct MissedOpportunityTracker {
    dir: PathBuf,
    shadows: HashMap<String, ShadowRecord>,
}

impl MissedOpportunityTracker {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), shadows: HashMap::new() }
    }

    /// Open a shadow record for a token the gate just rejected. A token
    /// already shadowed keeps its original record.
    pub fn record_rejection(
        &mut self,
        snapshot: &TokenSnapshot,
        failed_at: &str,
        failed_checks: &[String],
        now: i64,
    ) {
        if self.shadows.contains_key(&snapshot.mint) {
            return;
        }
        debug!(mint = %snapshot.mint, checks = ?failed_checks, "shadow tracking rejected token");
        self.shadows.insert(
            snapshot.mint.clone(),
            ShadowRecord {
                initial_price: snapshot.price_usd,
                initial_market_cap: snapshot.market_cap_usd,
                failed_at: failed_at.to_string(),
                failed_checks: failed_checks.to_vec(),
                analysis: ThresholdAnalysis {
                    creator_sell_pct: snapshot.creator_sell_pct,
                    top_holder_concentration_pct: snapshot.top_holder_concentration_pct,
                    max_wallet_volume_pct: snapshot.max_wallet_volume_pct,
                    market_cap_sol: snapshot.market_cap_sol,
                },
                peak_price: snapshot.price_usd,
                peak_market_cap: snapshot.market_cap_usd,
                peak_time: now,
                last_seen: now,
            },
        );
    }

    pub fn is_tracking(&self, mint: &str) -> bool {
        self.shadows.contains_key(mint)
    }

    /// Ride along on a trade of a shadowed token.
    pub fn observe_trade(&mut self, mint: &str, price_usd: f64, mcap_usd: f64, now: i64) {
        if let Some(shadow) = self.shadows.get_mut(mint) {
            shadow.last_seen = now;
            if price_usd > shadow.peak_price {
                shadow.peak_price = price_usd;
                shadow.peak_time = now;
            }
            if mcap_usd > shadow.peak_market_cap {
                shadow.peak_market_cap = mcap_usd;
            }
        }
    }

    /// Shadows with no trade for `threshold_ms` — due for finalization.
    pub fn stale_mints(&self, now: i64, threshold_ms: i64) -> Vec<String> {
        self.shadows
            .iter()
            .filter(|(_, s)| now - s.last_seen > threshold_ms)
            .map(|(mint, _)| mint.clone())
            .collect()
    }

    /// Finalize a shadow (the token died or was evicted): append the record
    /// to the daily file. Returns the potential profit percentage when the
    /// token was shadowed, `Ok(None)` otherwise.
    pub fn finalize(&mut self, mint: &str, now: i64) -> Result<Option<f64>> {
        let Some(shadow) = self.shadows.remove(mint) else {
            return Ok(None);
        };

        let potential_profit = if shadow.initial_price > 0.0 && shadow.peak_price > shadow.initial_price
        {
            Some((shadow.peak_price - shadow.initial_price) / shadow.initial_price * 100.0)
        } else {
            None
        };

        let record = MissedOpportunityRecord {
            timestamp: rfc3339(now),
            token: MissedTokenRecord {
                mint: mint.to_string(),
                initial_price: shadow.initial_price,
                initial_market_cap: shadow.initial_market_cap,
                failed_at: shadow.failed_at,
                failed_checks: shadow.failed_checks,
                peak_data: Some(PeakData {
                    peak_price: shadow.peak_price,
                    peak_market_cap: shadow.peak_market_cap,
                    peak_time: shadow.peak_time,
                }),
                potential_profit,
                threshold_analysis: Some(shadow.analysis),
            },
        };

        self.append(&record, now)?;
        info!(
            mint,
            potential_profit = ?potential_profit,
            "missed opportunity recorded"
        );
        Ok(Some(potential_profit.unwrap_or(0.0)))
    }

    /// Discard shadows without persisting (shutdown path).
    pub fn clear(&mut self) {
        self.shadows.clear();
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    fn daily_path(&self, now: i64) -> PathBuf {
        let date = match Utc.timestamp_millis_opt(now).single() {
            Some(dt) => dt.format("%Y-%m-%d").to_string(),
            None => "1970-01-01".to_string(),
        };
        self.dir.join(format!("missed_opportunities_{date}.json"))
    }

    fn append(&self, record: &MissedOpportunityRecord, now: i64) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let path = self.daily_path(now);
        rotate_if_oversized(&path, now)?;

        let mut records: Vec<MissedOpportunityRecord> = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "corrupt missed-opportunity file — starting fresh");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        records.push(record.clone());

        let content = serde_json::to_string_pretty(&records)
            .context("failed to serialise missed-opportunity records")?;

        // Atomic write: tmp sibling, then rename.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to rename {}", tmp.display()))?;
        Ok(())
    }
}

/// Rename an oversized file out of the way, suffixing the rotation time.
fn rotate_if_oversized(path: &Path, now: i64) -> Result<()> {
    let Ok(meta) = std::fs::metadata(path) else {
        return Ok(());
    };
    if meta.len() < MAX_FILE_BYTES {
        return Ok(());
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("missed_opportunities");
    let rotated = path.with_file_name(format!("{stem}_{now}.json"));
    std::fs::rename(path, &rotated)
        .with_context(|| format!("failed to rotate {}", path.display()))?;
    info!(from = %path.display(), to = %rotated.display(), "rotated oversized missed-opportunity file");
    Ok(())
}

fn rfc3339(now: i64) -> String {
    Utc.timestamp_millis_opt(now)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string())
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::lifecycle::TokenState;

    fn snapshot(mint: &str, price_usd: f64, mcap_usd: f64) -> TokenSnapshot {
        TokenSnapshot {
            mint: mint.into(),
            symbol: "TST".into(),
            name: "Test".into(),
            creator: "creator".into(),
            created_at: 0,
            state: TokenState::Ready,
            price_sol: price_usd / 225.0,
            price_usd,
            market_cap_sol: mcap_usd / 225.0,
            market_cap_usd: mcap_usd,
            highest_market_cap_sol: mcap_usd / 225.0,
            holder_count: 10,
            top_holder_concentration_pct: 80.0,
            creator_sell_pct: 60.0,
            max_wallet_volume_pct: 50.0,
            buy_pressure_pct: 50.0,
            volume_windows_usd: [0.0; 5],
            pump_count: 1,
            reached_first_pump: true,
            heating_up: false,
            last_trade_time: 0,
        }
    }

    #[test]
    fn rejection_then_peak_then_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = MissedOpportunityTracker::new(dir.path());

        let snap = snapshot("mint1", 0.001, 10_000.0);
        let checks = vec!["creator sold 60.0%".to_string()];
        tracker.record_rejection(&snap, "ready_check", &checks, 1_000);
        assert!(tracker.is_tracking("mint1"));

        // Token triples after rejection.
        tracker.observe_trade("mint1", 0.002, 20_000.0, 2_000);
        tracker.observe_trade("mint1", 0.003, 30_000.0, 3_000);
        tracker.observe_trade("mint1", 0.0015, 15_000.0, 4_000);

        let profit = tracker.finalize("mint1", 86_400_000).unwrap().unwrap();
        assert!((profit - 200.0).abs() < 1e-9, "got {profit}");
        assert!(!tracker.is_tracking("mint1"));

        // The daily file carries one record with the full story.
        let path = dir.path().join("missed_opportunities_1970-01-02.json");
        let content = std::fs::read_to_string(&path).unwrap();
        let records: Vec<MissedOpportunityRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(records.len(), 1);
        let token = &records[0].token;
        assert_eq!(token.mint, "mint1");
        assert_eq!(token.failed_at, "ready_check");
        assert_eq!(token.failed_checks, checks);
        let peak = token.peak_data.unwrap();
        assert!((peak.peak_price - 0.003).abs() < 1e-12);
        assert_eq!(peak.peak_time, 3_000);
        assert!((token.potential_profit.unwrap() - 200.0).abs() < 1e-9);
        assert!(token.threshold_analysis.is_some());

        // Wire format uses camelCase keys.
        assert!(content.contains("initialMarketCap"));
        assert!(content.contains("failedChecks"));
    }

    #[test]
    fn records_accumulate_in_daily_array() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = MissedOpportunityTracker::new(dir.path());

        for (i, mint) in ["a", "b", "c"].iter().enumerate() {
            let snap = snapshot(mint, 0.001, 10_000.0);
            tracker.record_rejection(&snap, "ready_check", &[], i as i64);
            tracker.finalize(mint, 1_000).unwrap();
        }

        let path = dir.path().join("missed_opportunities_1970-01-01.json");
        let records: Vec<MissedOpportunityRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn finalize_unknown_mint_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = MissedOpportunityTracker::new(dir.path());
        assert!(tracker.finalize("ghost", 1_000).unwrap().is_none());
    }

    #[test]
    fn no_profit_when_token_never_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = MissedOpportunityTracker::new(dir.path());

        let snap = snapshot("mint1", 0.001, 10_000.0);
        tracker.record_rejection(&snap, "ready_check", &[], 1_000);
        tracker.observe_trade("mint1", 0.0005, 5_000.0, 2_000);

        tracker.finalize("mint1", 3_000).unwrap();
        let path = dir.path().join("missed_opportunities_1970-01-01.json");
        let records: Vec<MissedOpportunityRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(records[0].token.potential_profit.is_none());
    }

    #[test]
    fn duplicate_rejection_keeps_first_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = MissedOpportunityTracker::new(dir.path());

        tracker.record_rejection(&snapshot("mint1", 0.001, 10_000.0), "ready_check", &[], 1_000);
        tracker.record_rejection(&snapshot("mint1", 0.009, 90_000.0), "ready_check", &[], 2_000);

        tracker.observe_trade("mint1", 0.002, 20_000.0, 3_000);
        tracker.finalize("mint1", 4_000).unwrap();

        let path = dir.path().join("missed_opportunities_1970-01-01.json");
        let records: Vec<MissedOpportunityRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        // Initial price is from the first rejection, not the second.
        assert!((records[0].token.initial_price - 0.001).abs() < 1e-12);
    }
}
