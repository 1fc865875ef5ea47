use scanner_core::{WeightKey, WeightLookup};

use crate::table::WeightTable;

/// Adapts a category-blind [`WeightLookup`] read into the category-specific →
/// global → default lookup order the scorer (C3) needs, for one market's
/// category. Constructed fresh per poll rather than cached, since it borrows
/// nothing but a clone of the table handle.
pub struct CategoryWeightView {
    table: WeightTable,
    category: String,
}

impl CategoryWeightView {
    pub fn new(table: WeightTable, category: impl Into<String>) -> Self {
        Self { table, category: category.into() }
    }
}

impl WeightLookup for CategoryWeightView {
    fn weight(&self, key: &WeightKey) -> f64 {
        self.table.weight_for_category(&self.category, &key.feature, &key.value)
    }
}
