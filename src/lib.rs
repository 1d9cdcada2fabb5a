// SpaceTraders Fleet Commander
// One process, one client, one rate limiter - every ship as a tokio task

pub mod client;
pub mod config;
pub mod fleet;
pub mod missions;
pub mod models;
pub mod storage;
pub mod verbosity;

// Re-export commonly used types
pub use client::{ApiClient, ApiError, Priority, RateLimit, RequestScheduler};
pub use config::{FleetConfig, Settings};
pub use fleet::commander::FleetCommander;

// Constants
pub const API_BASE_URL: &str = "https://api.spacetraders.io/v2";
