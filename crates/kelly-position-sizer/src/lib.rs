pub mod confidence;
pub mod kelly;

pub use confidence::{compute_confidence, ConfidenceInputs};
pub use kelly::size_position;
