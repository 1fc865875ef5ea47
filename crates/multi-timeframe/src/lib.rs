pub mod confluence;

pub use confluence::{trend_alignment, TrendAlignment, TrendDirection};
