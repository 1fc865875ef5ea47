pub mod category_view;
pub mod drift;
pub mod learner;
pub mod table;

pub use category_view::CategoryWeightView;
pub use drift::{detect_drift, DriftReport, DriftSeverity};
pub use learner::{refresh, refresh_and_publish, RefreshOutcome, WeightDelta, MIN_SETTLED_OUTCOMES};
pub use table::WeightTable;
