use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use scanner_core::{WeightKey, WeightLookup};

/// A fully-learned multiplier table, keyed by `(feature, value)` for global
/// entries and `(category:feature, value)` for category-scoped ones.
///
/// Refreshes replace the whole inner map in one write-lock acquisition, so a
/// concurrent reader always observes either the complete old table or the
/// complete new one, never a partial mix.
#[derive(Clone)]
pub struct WeightTable {
    inner: Arc<RwLock<HashMap<(String, String), f64>>>,
}

impl WeightTable {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub(crate) fn publish(&self, table: HashMap<(String, String), f64>) {
        *self.inner.write().expect("weight table lock poisoned") = table;
    }

    pub fn snapshot(&self) -> HashMap<(String, String), f64> {
        self.inner.read().expect("weight table lock poisoned").clone()
    }

    /// Category-specific → global learned → default 1.0.
    pub fn weight_for_category(&self, category: &str, feature: &str, value: &str) -> f64 {
        let table = self.inner.read().expect("weight table lock poisoned");
        let scoped = (format!("{category}:{feature}"), value.to_string());
        if let Some(w) = table.get(&scoped) {
            return *w;
        }
        table.get(&(feature.to_string(), value.to_string())).copied().unwrap_or(1.0)
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self::new()
    }
}

impl WeightLookup for WeightTable {
    fn weight(&self, key: &WeightKey) -> f64 {
        self.inner
            .read()
            .expect("weight table lock poisoned")
            .get(&(key.feature.clone(), key.value.clone()))
            .copied()
            .unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_key_falls_back_to_one() {
        let table = WeightTable::new();
        assert_eq!(table.weight(&WeightKey::new("rsi_zone", "Bullish")), 1.0);
    }

    #[test]
    fn category_scoped_entry_takes_priority_over_global() {
        let table = WeightTable::new();
        let mut map = HashMap::new();
        map.insert(("rsi_zone".to_string(), "Bullish".to_string()), 1.1);
        map.insert(("crypto:rsi_zone".to_string(), "Bullish".to_string()), 1.3);
        table.publish(map);

        assert_eq!(table.weight_for_category("crypto", "rsi_zone", "Bullish"), 1.3);
        assert_eq!(table.weight_for_category("sports", "rsi_zone", "Bullish"), 1.1);
    }
}
