//! The axum HTTP surface, the request pipeline, and the service binary's
//! supporting modules.

pub mod bootstrap;
pub mod config;
pub mod handlers;
pub mod observability;
pub mod patch;
pub mod pipeline;
pub mod router;
pub mod state;

pub use config::ServerConfig;
pub use router::build_router;
pub use state::AppState;
