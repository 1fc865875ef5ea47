use crate::types::WeightKey;

/// Read-side of the weight map (C9). Implementors publish a snapshot the scorer reads
/// without blocking on the learner's update cycle.
pub trait WeightLookup: Send + Sync {
    /// Multiplier for `(feature, discretized value)`, falling back to 1.0 when unseen.
    fn weight(&self, key: &WeightKey) -> f64;
}

/// A weight map that has learned nothing yet — every lookup returns the neutral 1.0.
pub struct NeutralWeights;

impl WeightLookup for NeutralWeights {
    fn weight(&self, _key: &WeightKey) -> f64 {
        1.0
    }
}
