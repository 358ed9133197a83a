//! HTTP surface and control plane for the companion router

mod http;
mod metrics;
mod state;

pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;
