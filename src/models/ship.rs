use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Deserialize, Clone)]
pub struct Ship {
    pub symbol: String,
    pub registration: ShipRegistration,
    pub nav: ShipNav,
    pub frame: ShipFrame,
    pub engine: ShipEngine,
    pub modules: Vec<ShipModule>,
    pub mounts: Vec<ShipMount>,
    pub cargo: ShipCargo,
    pub fuel: ShipFuel,
    pub cooldown: ShipCooldown,
}

impl Ship {
    pub fn free_cargo(&self) -> i32 {
        self.cargo.capacity - self.cargo.units
    }

    /// Units of a specific good currently in cargo.
    pub fn units_in_cargo(&self, trade_symbol: &str) -> i32 {
        self.cargo
            .inventory
            .iter()
            .filter(|item| item.symbol == trade_symbol)
            .map(|item| item.units)
            .sum()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShipRegistration {
    pub name: String,
    #[serde(rename = "factionSymbol")]
    pub faction_symbol: String,
    pub role: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavStatus {
    Docked,
    InOrbit,
    InTransit,
}

impl fmt::Display for NavStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NavStatus::Docked => "DOCKED",
            NavStatus::InOrbit => "IN_ORBIT",
            NavStatus::InTransit => "IN_TRANSIT",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightMode {
    Cruise,
    Drift,
    Burn,
    Stealth,
}

impl FlightMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightMode::Cruise => "CRUISE",
            FlightMode::Drift => "DRIFT",
            FlightMode::Burn => "BURN",
            FlightMode::Stealth => "STEALTH",
        }
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShipNav {
    #[serde(rename = "systemSymbol")]
    pub system_symbol: String,
    #[serde(rename = "waypointSymbol")]
    pub waypoint_symbol: String,
    pub route: ShipRoute,
    pub status: NavStatus,
    #[serde(rename = "flightMode")]
    pub flight_mode: FlightMode,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShipRoute {
    pub destination: RouteWaypoint,
    pub origin: RouteWaypoint,
    #[serde(rename = "departureTime")]
    pub departure_time: DateTime<Utc>,
    pub arrival: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouteWaypoint {
    pub symbol: String,
    #[serde(rename = "type")]
    pub waypoint_type: String,
    #[serde(rename = "systemSymbol")]
    pub system_symbol: String,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShipFrame {
    pub symbol: String,
    pub name: String,
    #[serde(rename = "fuelCapacity")]
    pub fuel_capacity: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShipEngine {
    pub symbol: String,
    pub name: String,
    pub speed: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShipModule {
    pub symbol: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShipMount {
    pub symbol: String,
    pub name: String,
    pub strength: Option<i32>,
    pub deposits: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CargoItem {
    pub symbol: String,
    pub name: String,
    pub units: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ShipCargo {
    pub capacity: i32,
    pub units: i32,
    #[serde(default)]
    pub inventory: Vec<CargoItem>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FuelConsumed {
    pub amount: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShipFuel {
    pub current: i32,
    pub capacity: i32,
    pub consumed: Option<FuelConsumed>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShipCooldown {
    #[serde(rename = "shipSymbol")]
    pub ship_symbol: String,
    #[serde(rename = "totalSeconds")]
    pub total_seconds: f64,
    #[serde(rename = "remainingSeconds")]
    pub remaining_seconds: f64,
    pub expiration: Option<DateTime<Utc>>,
}
