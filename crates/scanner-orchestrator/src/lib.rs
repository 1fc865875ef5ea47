pub mod order_flow;
pub mod poller;
pub mod orchestrator;

pub use order_flow::analyze_order_flow;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use poller::poll_market;
