pub mod models;
pub mod portfolio;

pub use models::{PositionStatus, VirtualPosition};
pub use portfolio::VirtualPortfolio;
