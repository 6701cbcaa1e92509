pub mod auth;
pub mod client_ip;
pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod orchestrator;
pub mod server;

pub use config::ServerConfig;
pub use error::ApiError;
pub use limiter::{AdmissionControl, AdmissionDecision, LimiterConfig, SlidingWindowLimiter};
pub use orchestrator::ReviewOrchestrator;
pub use server::{build_router, shutdown_signal, start, AppState, ServerHandle};
