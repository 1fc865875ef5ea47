pub mod regime;
pub mod volatility;

pub use regime::{classify, RegimeInputs};
pub use volatility::classify_volatility;
