// Models module - data structures for the upstream API

pub mod agent;
pub mod construction;
pub mod contract;
pub mod market;
pub mod responses;
pub mod ship;
pub mod waypoint;

// Re-export all models for easier imports
pub use agent::*;
pub use construction::*;
pub use contract::*;
pub use market::*;
pub use responses::*;
pub use ship::*;
pub use waypoint::*;
