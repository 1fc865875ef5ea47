use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use scanner_core::{ClassifiedFeatures, Outcome, Side, Tick};
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::schema::{
    CREATE_SIGNALS_IDEMPOTENCY_INDEX, CREATE_SIGNALS_MARKET_INDEX, CREATE_SIGNALS_OUTCOME_INDEX,
    CREATE_SIGNALS_TABLE,
};

const VOID_AFTER: Duration = Duration::hours(24);
const EXTREME_YES_WIN: f64 = 0.9;
const EXTREME_YES_LOSS: f64 = 0.1;

/// Classified feature columns the weight learner (C9) joins on.
pub const FEATURE_COLUMNS: &[&str] = &[
    "vwap_position",
    "vwap_slope_dir",
    "rsi_zone",
    "macd_state",
    "heiken_color",
    "ob_zone",
    "vol_regime",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct ResolutionSummary {
    pub settled: usize,
    pub voided: usize,
    pub purged: usize,
}

pub struct SignalStore {
    pool: SqlitePool,
    retention: Duration,
}

fn enc<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn dec<T: serde::de::DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_str(raw).ok()
}

impl SignalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_retention(pool, Duration::days(90))
    }

    pub fn with_retention(pool: SqlitePool, retention: Duration) -> Self {
        Self { pool, retention }
    }

    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(CREATE_SIGNALS_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_SIGNALS_MARKET_INDEX).execute(&self.pool).await?;
        sqlx::query(CREATE_SIGNALS_OUTCOME_INDEX).execute(&self.pool).await?;
        sqlx::query(CREATE_SIGNALS_IDEMPOTENCY_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    /// Persist one ENTER tick, keyed by its classified feature set.
    ///
    /// Idempotent on `(market_id, created_at)`: logging the same tick twice
    /// returns the id of the row already recorded rather than inserting a
    /// duplicate.
    pub async fn record_enter(
        &self,
        tick: &Tick,
        classified: &ClassifiedFeatures,
        side: Side,
    ) -> Result<i64> {
        let rec = tick.rec.as_ref().context("enter tick missing recommendation")?;
        let entry_price = match side {
            Side::Up => tick.prices.up,
            Side::Down => tick.prices.down,
        };
        let edge = tick
            .edges
            .as_ref()
            .map(|e| match side {
                Side::Up => e.edge_up,
                Side::Down => e.edge_down,
            })
            .unwrap_or(0.0);
        let confidence = tick.confidence.as_ref().map(|c| c.score).unwrap_or(0.0);
        let bet_pct = tick.kelly.as_ref().map(|k| k.bet_pct).unwrap_or(0.0);
        let tick_json = serde_json::to_string(tick)?;
        let expected_settlement_at =
            tick.timestamp + Duration::minutes(tick.settlement_minutes_remaining.max(0.0) as i64);

        let created_at = tick.timestamp.to_rfc3339();

        let row = sqlx::query(
            "INSERT OR IGNORE INTO signals (
                market_id, category, side, entry_price, edge, confidence, bet_pct,
                vwap_position, vwap_slope_dir, rsi_zone, macd_state, heiken_color, ob_zone,
                vol_regime, degenerate, tick_json, created_at, expected_settlement_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&tick.market_id)
        .bind(&tick.category)
        .bind(format!("{:?}", side))
        .bind(entry_price)
        .bind(edge)
        .bind(confidence)
        .bind(bet_pct)
        .bind(enc(&classified.vwap_position))
        .bind(enc(&classified.vwap_slope_dir))
        .bind(enc(&classified.rsi_zone))
        .bind(enc(&classified.macd_state))
        .bind(enc(&classified.heiken_color))
        .bind(enc(&classified.ob_zone))
        .bind(enc(&classified.vol_regime))
        .bind(classified.degenerate as i64)
        .bind(&tick_json)
        .bind(&created_at)
        .bind(expected_settlement_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let _ = rec;
        if row.rows_affected() > 0 {
            return Ok(row.last_insert_rowid());
        }

        let existing = sqlx::query("SELECT id FROM signals WHERE market_id = ? AND created_at = ?")
            .bind(&tick.market_id)
            .bind(&created_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(existing.try_get("id")?)
    }

    /// Outcome resolution loop (C8): settle, void, and purge against the
    /// latest known tick per market.
    pub async fn resolve_outcomes(
        &self,
        latest_ticks: &HashMap<String, Tick>,
        now: DateTime<Utc>,
    ) -> Result<ResolutionSummary> {
        let mut summary = ResolutionSummary::default();

        let unresolved = sqlx::query(
            "SELECT id, market_id, side, entry_price, expected_settlement_at FROM signals WHERE outcome IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        for row in unresolved {
            let id: i64 = row.try_get("id")?;
            let market_id: String = row.try_get("market_id")?;
            let side_str: String = row.try_get("side")?;
            let entry_price: f64 = row.try_get("entry_price")?;
            let expected_settlement_at: String = row.try_get("expected_settlement_at")?;
            let expected_settlement_at = DateTime::parse_from_rfc3339(&expected_settlement_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now);

            let Some(tick) = latest_ticks.get(&market_id) else {
                if now - expected_settlement_at > VOID_AFTER {
                    self.void_signal(id, now).await?;
                    summary.voided += 1;
                }
                continue;
            };

            // Settlement heuristic is deliberately an OR across three signals:
            // an explicit close flag, expiry, or a price pinned to an extreme.
            let yes_price = tick.prices.up;
            let no_price = tick.prices.down;
            let settleable = tick.closed
                || tick.settlement_minutes_remaining <= 0.0
                || yes_price >= EXTREME_YES_WIN
                || yes_price <= EXTREME_YES_LOSS;

            if settleable {
                let won_yes = yes_price > 0.5;
                let side_is_up = side_str == format!("{:?}", Side::Up);
                let won = if side_is_up { won_yes } else { !won_yes };
                let pnl_pct = if won { (1.0 - entry_price) / entry_price } else { -1.0 };
                let outcome = if won { Outcome::Win } else { Outcome::Loss };

                sqlx::query(
                    "UPDATE signals SET outcome = ?, outcome_price_yes = ?, outcome_price_no = ?,
                     settled_at = ?, pnl_pct = ? WHERE id = ?",
                )
                .bind(enc(&outcome))
                .bind(yes_price)
                .bind(no_price)
                .bind(now.to_rfc3339())
                .bind(pnl_pct)
                .bind(id)
                .execute(&self.pool)
                .await?;
                summary.settled += 1;
            } else if now - expected_settlement_at > VOID_AFTER {
                self.void_signal(id, now).await?;
                summary.voided += 1;
            }
        }

        summary.purged = self.purge_expired(now).await?;
        Ok(summary)
    }

    async fn void_signal(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE signals SET outcome = ?, settled_at = ? WHERE id = ?")
            .bind(enc(&Outcome::Void))
            .bind(now.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = (now - self.retention).to_rfc3339();
        let result = sqlx::query("DELETE FROM signals WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        let purged = result.rows_affected() as usize;
        if purged > 0 {
            info!(purged, "purged retention-expired signals");
        }
        Ok(purged)
    }

    /// Settled (WIN/LOSS only) rows for a feature value, grouped by the
    /// weight learner (C9). Returns `(category, wins, losses)` triples.
    pub async fn settled_counts_for(
        &self,
        feature: &str,
        value: &str,
    ) -> Result<Vec<(String, i64, i64)>> {
        let column = match feature {
            "vwap_position" => "vwap_position",
            "vwap_slope_dir" => "vwap_slope_dir",
            "rsi_zone" => "rsi_zone",
            "macd_state" => "macd_state",
            "heiken_color" => "heiken_color",
            "ob_zone" => "ob_zone",
            "vol_regime" => "vol_regime",
            other => {
                warn!(feature = other, "unknown weight feature column requested");
                return Ok(vec![]);
            }
        };

        let query = format!(
            "SELECT category,
                SUM(CASE WHEN outcome = '\"Win\"' THEN 1 ELSE 0 END) as wins,
                SUM(CASE WHEN outcome = '\"Loss\"' THEN 1 ELSE 0 END) as losses
             FROM signals
             WHERE {column} = ? AND outcome IN ('\"Win\"', '\"Loss\"')
             GROUP BY category"
        );
        let rows = sqlx::query(&query).bind(value).fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|r| Ok((r.try_get::<String, _>("category")?, r.try_get("wins")?, r.try_get("losses")?)))
            .collect()
    }

    /// Joint (vwap_position, rsi_zone) win/loss counts across all categories,
    /// the combo table the weight learner derives its cap-limited multiplier
    /// from.
    pub async fn settled_combo_counts(&self) -> Result<Vec<(String, String, i64, i64)>> {
        let rows = sqlx::query(
            "SELECT vwap_position, rsi_zone,
                SUM(CASE WHEN outcome = '\"Win\"' THEN 1 ELSE 0 END) as wins,
                SUM(CASE WHEN outcome = '\"Loss\"' THEN 1 ELSE 0 END) as losses
             FROM signals
             WHERE outcome IN ('\"Win\"', '\"Loss\"')
             GROUP BY vwap_position, rsi_zone",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                Ok((
                    r.try_get::<String, _>("vwap_position")?,
                    r.try_get::<String, _>("rsi_zone")?,
                    r.try_get("wins")?,
                    r.try_get("losses")?,
                ))
            })
            .collect()
    }

    /// All distinct (value) labels seen for a feature column, across every
    /// settled row — the learner iterates these rather than hardcoding the
    /// enum's variant list.
    pub async fn distinct_feature_values(&self, feature: &str) -> Result<Vec<String>> {
        let column = match feature {
            "vwap_position" => "vwap_position",
            "vwap_slope_dir" => "vwap_slope_dir",
            "rsi_zone" => "rsi_zone",
            "macd_state" => "macd_state",
            "heiken_color" => "heiken_color",
            "ob_zone" => "ob_zone",
            "vol_regime" => "vol_regime",
            other => {
                warn!(feature = other, "unknown weight feature column requested");
                return Ok(vec![]);
            }
        };
        let query = format!(
            "SELECT DISTINCT {column} as v FROM signals WHERE outcome IN ('\"Win\"', '\"Loss\"')"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| Ok(r.try_get::<String, _>("v")?)).collect()
    }

    pub async fn settled_count_total(&self) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) as n FROM signals WHERE outcome IN ('\"Win\"', '\"Loss\"')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("n")?)
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[allow(dead_code)]
fn decode_classified(raw: &HashMap<String, String>) -> Option<ClassifiedFeatures> {
    Some(ClassifiedFeatures {
        vwap_position: dec(raw.get("vwap_position")?)?,
        vwap_slope_dir: dec(raw.get("vwap_slope_dir")?)?,
        rsi_zone: dec(raw.get("rsi_zone")?)?,
        macd_state: dec(raw.get("macd_state")?)?,
        heiken_color: dec(raw.get("heiken_color")?)?,
        ob_zone: dec(raw.get("ob_zone")?)?,
        vol_regime: dec(raw.get("vol_regime")?)?,
        degenerate: raw.get("degenerate").map(|s| s == "1").unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner_core::{Action, Edges, KellyResult, MarketPrices, Recommendation, Strength, Tick};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap()
    }

    fn sample_tick(market_id: &str, yes: f64, closed: bool, remaining: f64) -> Tick {
        Tick {
            market_id: market_id.to_string(),
            question: "Will it happen?".to_string(),
            category: "crypto".to_string(),
            timestamp: Utc::now(),
            ok: true,
            reason: None,
            indicators: None,
            regime: None,
            vol_class: None,
            model: None,
            edges: Some(Edges { edge_up: 0.05, edge_down: -0.05 }),
            rec: Some(Recommendation {
                action: Action::Enter,
                side: scanner_core::Side::Up,
                strength: Strength::Good,
                phase: scanner_core::Phase::Mid,
            }),
            order_flow: None,
            confidence: None,
            kelly: Some(KellyResult { bet_pct: 0.02, kelly_full: 0.08, odds: 1.2, tier: scanner_core::ConfidenceTier::Medium }),
            prices: MarketPrices { last: yes, up: yes, down: 1.0 - yes },
            settlement_minutes_remaining: remaining,
            closed,
            classified: None,
        }
    }

    fn sample_classified() -> ClassifiedFeatures {
        ClassifiedFeatures {
            vwap_position: scanner_core::VwapPosition::Above,
            vwap_slope_dir: scanner_core::VwapSlopeDir::Up,
            rsi_zone: scanner_core::RsiZone::Bullish,
            macd_state: scanner_core::MacdState::ExpandingGreen,
            heiken_color: scanner_core::HeikenColor::Green,
            ob_zone: scanner_core::ObZone::Bid,
            vol_regime: scanner_core::VolatilityClass::Normal,
            degenerate: false,
        }
    }

    #[tokio::test]
    async fn records_and_settles_a_winning_signal() {
        let store = SignalStore::new(test_pool().await);
        store.init_tables().await.unwrap();

        let entry_tick = sample_tick("m1", 0.4, false, 30.0);
        store.record_enter(&entry_tick, &sample_classified(), Side::Up).await.unwrap();

        let mut latest = HashMap::new();
        latest.insert("m1".to_string(), sample_tick("m1", 0.95, false, 0.0));

        let summary = store.resolve_outcomes(&latest, Utc::now()).await.unwrap();
        assert_eq!(summary.settled, 1);

        let total = store.settled_count_total().await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn recording_the_same_tick_twice_does_not_duplicate_the_row() {
        let store = SignalStore::new(test_pool().await);
        store.init_tables().await.unwrap();

        let tick = sample_tick("m4", 0.4, false, 30.0);
        let first_id = store.record_enter(&tick, &sample_classified(), Side::Up).await.unwrap();
        let second_id = store.record_enter(&tick, &sample_classified(), Side::Up).await.unwrap();

        assert_eq!(first_id, second_id);
        let row_count: i64 = sqlx::query("SELECT COUNT(*) as n FROM signals WHERE market_id = 'm4'")
            .fetch_one(store.pool())
            .await
            .unwrap()
            .try_get("n")
            .unwrap();
        assert_eq!(row_count, 1);
    }

    #[tokio::test]
    async fn voids_signal_with_no_resolvable_state_after_24h() {
        let store = SignalStore::new(test_pool().await);
        store.init_tables().await.unwrap();

        let entry_tick = sample_tick("m2", 0.4, false, 30.0);
        store.record_enter(&entry_tick, &sample_classified(), Side::Up).await.unwrap();

        let far_future = Utc::now() + Duration::hours(25) + Duration::minutes(30);
        let mut latest = HashMap::new();
        latest.insert("m2".to_string(), sample_tick("m2", 0.4, false, 30.0));

        let summary = store.resolve_outcomes(&latest, far_future).await.unwrap();
        assert_eq!(summary.voided, 1);
        assert_eq!(summary.settled, 0);
    }

    #[tokio::test]
    async fn purges_rows_older_than_retention() {
        let store = SignalStore::with_retention(test_pool().await, Duration::days(1));
        store.init_tables().await.unwrap();

        let old_tick = sample_tick("m3", 0.4, false, 30.0);
        store.record_enter(&old_tick, &sample_classified(), Side::Up).await.unwrap();

        sqlx::query("UPDATE signals SET created_at = ? WHERE market_id = 'm3'")
            .bind((Utc::now() - Duration::days(5)).to_rfc3339())
            .execute(store.pool())
            .await
            .unwrap();

        let summary = store.resolve_outcomes(&HashMap::new(), Utc::now()).await.unwrap();
        assert_eq!(summary.purged, 1);
    }
}
