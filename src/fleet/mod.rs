// Fleet module - the event-driven supervisor and its shared state

pub mod commander;
pub mod events;
pub mod registry;
pub mod ship_agent;
pub mod state;
pub mod strategy;

pub use commander::FleetCommander;
pub use events::{EventType, FleetEvent};
pub use registry::{MissionKind, MissionParams};
pub use ship_agent::ShipAgent;
pub use state::{FleetState, Shutdown, SystemState};
pub use strategy::{FleetPlan, FleetStrategy, ShipAssignment, ShipCapability, ShipCategory};
