use std::collections::HashMap;

use anyhow::Result;
use signal_store::{SignalStore, FEATURE_COLUMNS};
use tracing::{debug, info};

use crate::table::WeightTable;

pub const MIN_SETTLED_OUTCOMES: i64 = 50;
const CONFIDENCE_DENOMINATOR: f64 = 50.0;
const WEIGHT_CLAMP: f64 = 0.5;
const COMBO_CLAMP: f64 = 0.3;
const AUDIT_DELTA_THRESHOLD: f64 = 0.05;

/// `winRate = wins/(wins+losses)`, `conf = min(1, total/50)`,
/// `w = clamp((winRate - 0.5) * 2 * conf, -clamp, clamp)`, `multiplier = 1 + w`.
fn derive_multiplier(wins: i64, losses: i64, clamp: f64) -> f64 {
    let total = wins + losses;
    if total == 0 {
        return 1.0;
    }
    let win_rate = wins as f64 / total as f64;
    let conf = (total as f64 / CONFIDENCE_DENOMINATOR).min(1.0);
    let w = ((win_rate - 0.5) * 2.0 * conf).clamp(-clamp, clamp);
    1.0 + w
}

#[derive(Debug, Clone)]
pub struct WeightDelta {
    pub key: (String, String),
    pub old: f64,
    pub new: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RefreshOutcome {
    pub table: HashMap<(String, String), f64>,
    pub audit: Vec<WeightDelta>,
}

/// Periodic refresh (C9). Returns `None` when fewer than
/// [`MIN_SETTLED_OUTCOMES`] settled rows exist, signalling callers to keep
/// serving the 1.0 fallback table.
pub async fn refresh(
    store: &SignalStore,
    previous: &HashMap<(String, String), f64>,
) -> Result<Option<RefreshOutcome>> {
    let total = store.settled_count_total().await?;
    if total < MIN_SETTLED_OUTCOMES {
        debug!(total, required = MIN_SETTLED_OUTCOMES, "not enough settled outcomes to refresh weights");
        return Ok(None);
    }

    let mut table = HashMap::new();

    for &feature in FEATURE_COLUMNS {
        let values = store.distinct_feature_values(feature).await?;
        let mut global_wins = 0i64;
        let mut global_losses = 0i64;

        for value in values {
            let per_category = store.settled_counts_for(feature, &value).await?;
            let mut value_wins = 0i64;
            let mut value_losses = 0i64;

            for (category, wins, losses) in per_category {
                value_wins += wins;
                value_losses += losses;
                let multiplier = derive_multiplier(wins, losses, WEIGHT_CLAMP);
                table.insert((format!("{category}:{feature}"), value.clone()), multiplier);
            }

            global_wins += value_wins;
            global_losses += value_losses;
            let global_multiplier = derive_multiplier(value_wins, value_losses, WEIGHT_CLAMP);
            table.insert((feature.to_string(), value), global_multiplier);
        }
    }

    for (vwap_position, rsi_zone, wins, losses) in store.settled_combo_counts().await? {
        let multiplier = derive_multiplier(wins, losses, COMBO_CLAMP);
        table.insert(("combo:vwap_position+rsi_zone".to_string(), format!("{vwap_position}+{rsi_zone}")), multiplier);
    }

    let audit: Vec<WeightDelta> = table
        .iter()
        .filter_map(|(key, &new)| {
            let old = previous.get(key).copied().unwrap_or(1.0);
            if (new - old).abs() > AUDIT_DELTA_THRESHOLD {
                Some(WeightDelta { key: key.clone(), old, new })
            } else {
                None
            }
        })
        .collect();

    if !audit.is_empty() {
        info!(changes = audit.len(), "weight refresh recorded deltas above audit threshold");
    }

    Ok(Some(RefreshOutcome { table, audit }))
}

/// Refreshes against `store` and, when enough settled outcomes exist,
/// atomically swaps the result into `published`. Returns whatever `refresh`
/// returned so the caller can log audit deltas / feed `detect_drift`.
pub async fn refresh_and_publish(store: &SignalStore, published: &WeightTable) -> Result<Option<RefreshOutcome>> {
    let outcome = refresh(store, &published.snapshot()).await?;
    if let Some(outcome) = &outcome {
        published.publish(outcome.table.clone());
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn win_rate_above_half_raises_multiplier() {
        let m = derive_multiplier(40, 10, WEIGHT_CLAMP);
        assert!(m > 1.0);
    }

    #[test]
    fn low_sample_count_dampens_the_adjustment() {
        let confident = derive_multiplier(40, 10, WEIGHT_CLAMP);
        let unconfident = derive_multiplier(4, 1, WEIGHT_CLAMP);
        assert!((unconfident - 1.0).abs() < (confident - 1.0).abs());
    }

    #[test]
    fn extreme_win_rate_clamps_to_bound() {
        let m = derive_multiplier(1000, 0, WEIGHT_CLAMP);
        assert_eq!(m, 1.0 + WEIGHT_CLAMP);
    }

    #[test]
    fn combo_clamp_is_tighter_than_per_feature_clamp() {
        let combo = derive_multiplier(1000, 0, COMBO_CLAMP);
        assert_eq!(combo, 1.0 + COMBO_CLAMP);
    }
}
