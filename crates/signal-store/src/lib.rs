pub mod schema;
pub mod store;

pub use store::{ResolutionSummary, SignalStore, FEATURE_COLUMNS};
