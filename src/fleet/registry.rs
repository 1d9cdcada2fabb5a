// Mission registry - maps mission kinds to their entry points.
use crate::client::ApiClient;
use crate::fleet::state::FleetState;
use crate::missions;
use crate::missions::MissionError;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissionKind {
    Trade,
    Scan,
    Contract,
    GateBuild,
    Idle,
}

impl MissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionKind::Trade => "trade",
            MissionKind::Scan => "scan",
            MissionKind::Contract => "contract",
            MissionKind::GateBuild => "gate_build",
            MissionKind::Idle => "idle",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "trade" => Some(MissionKind::Trade),
            "scan" => Some(MissionKind::Scan),
            "contract" => Some(MissionKind::Contract),
            "gate_build" => Some(MissionKind::GateBuild),
            "idle" => Some(MissionKind::Idle),
            _ => None,
        }
    }
}

impl fmt::Display for MissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-mission tuning handed over by the strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissionParams {
    pub capital_floor: Option<i64>,
    pub loops_per_cycle: Option<u32>,
    pub max_age_min: Option<f64>,
}

pub type MissionFuture = Pin<Box<dyn Future<Output = Result<(), MissionError>> + Send>>;

pub type MissionFn =
    fn(Arc<ApiClient>, String, Arc<FleetState>, MissionParams) -> MissionFuture;

static REGISTRY: OnceLock<HashMap<MissionKind, MissionFn>> = OnceLock::new();

/// Entry point for a mission kind. IDLE and unknown kinds have none.
pub fn mission_entry(kind: MissionKind) -> Option<MissionFn> {
    let registry = REGISTRY.get_or_init(|| {
        let mut table: HashMap<MissionKind, MissionFn> = HashMap::new();
        table.insert(MissionKind::Trade, |api, ship, state, params| {
            Box::pin(missions::trader::trade_mission(api, ship, state, params))
        });
        table.insert(MissionKind::Scan, |api, ship, state, params| {
            Box::pin(missions::scanner::scan_mission(api, ship, state, params))
        });
        table.insert(MissionKind::Contract, |api, ship, state, params| {
            Box::pin(missions::contractor::contract_mission(api, ship, state, params))
        });
        table.insert(MissionKind::GateBuild, |api, ship, state, params| {
            Box::pin(missions::gate_builder::gate_build_mission(api, ship, state, params))
        });
        table
    });
    registry.get(&kind).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        for kind in [
            MissionKind::Trade,
            MissionKind::Scan,
            MissionKind::Contract,
            MissionKind::GateBuild,
            MissionKind::Idle,
        ] {
            assert_eq!(MissionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MissionKind::parse("mining"), None);
    }

    #[test]
    fn idle_has_no_entry_point() {
        assert!(mission_entry(MissionKind::Idle).is_none());
        assert!(mission_entry(MissionKind::Trade).is_some());
        assert!(mission_entry(MissionKind::Scan).is_some());
        assert!(mission_entry(MissionKind::Contract).is_some());
        assert!(mission_entry(MissionKind::GateBuild).is_some());
    }
}
