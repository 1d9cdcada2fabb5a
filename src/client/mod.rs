// Client module - scheduler-gated access to the upstream API

pub mod api;
pub mod scheduler;
pub mod shared_limiter;

pub use api::{ApiClient, ApiError};
pub use scheduler::{Priority, RateLimit, RequestScheduler};
pub use shared_limiter::SharedRateLimiter;
