pub mod decision;

pub use decision::{compute_edges, decide, effective_threshold, BASE_THRESHOLD};
