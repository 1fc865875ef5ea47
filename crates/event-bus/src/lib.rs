pub mod bus;
pub mod event;

pub use bus::EventBus;
pub use event::ScannerEvent;
