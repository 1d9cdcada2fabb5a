// Typed payloads for mutating endpoint responses.
use crate::models::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct Meta {
    pub total: i32,
    pub page: i32,
    pub limit: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NavOnly {
    pub nav: ShipNav,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NavigationData {
    pub fuel: ShipFuel,
    pub nav: ShipNav,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefuelData {
    pub agent: Agent,
    pub fuel: ShipFuel,
    pub transaction: MarketTransaction,
}

/// Purchase or sale result.
#[derive(Debug, Deserialize, Clone)]
pub struct TradeData {
    pub agent: Agent,
    pub cargo: ShipCargo,
    pub transaction: MarketTransaction,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CargoData {
    pub cargo: ShipCargo,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeliverData {
    pub contract: Contract,
    pub cargo: ShipCargo,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AcceptData {
    pub agent: Agent,
    pub contract: Contract,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FulfillData {
    pub agent: Agent,
    pub contract: Contract,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NegotiateData {
    pub contract: Contract,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionData {
    pub cooldown: ShipCooldown,
    pub extraction: Extraction,
    pub cargo: ShipCargo,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Extraction {
    #[serde(rename = "shipSymbol")]
    pub ship_symbol: String,
    #[serde(rename = "yield")]
    pub extraction_yield: ExtractionYield,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionYield {
    pub symbol: String,
    pub units: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Survey {
    pub signature: String,
    pub symbol: String,
    pub deposits: Vec<SurveyDeposit>,
    pub expiration: DateTime<Utc>,
    pub size: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SurveyDeposit {
    pub symbol: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SurveyData {
    pub cooldown: ShipCooldown,
    pub surveys: Vec<Survey>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SupplyData {
    pub construction: Construction,
    pub cargo: ShipCargo,
}
