pub mod classify;
pub mod decay;
pub mod scorer;

pub use classify::classify_features;
pub use decay::{decay_factor, indicator_horizon_minutes};
pub use scorer::score;
