use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Clone)]
pub struct Market {
    pub symbol: String,
    #[serde(default)]
    pub exports: Vec<TradeGood>,
    #[serde(default)]
    pub imports: Vec<TradeGood>,
    #[serde(default)]
    pub exchange: Vec<TradeGood>,
    #[serde(rename = "tradeGoods")]
    pub trade_goods: Option<Vec<MarketTradeGood>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TradeGood {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Live price entry, only visible while a ship is docked at the market.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MarketTradeGood {
    pub symbol: String,
    #[serde(rename = "type")]
    pub trade_type: String,
    #[serde(rename = "tradeVolume")]
    pub trade_volume: i32,
    pub supply: String,
    pub activity: Option<String>,
    #[serde(rename = "purchasePrice")]
    pub purchase_price: i32,
    #[serde(rename = "sellPrice")]
    pub sell_price: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketTransaction {
    #[serde(rename = "waypointSymbol")]
    pub waypoint_symbol: String,
    #[serde(rename = "shipSymbol")]
    pub ship_symbol: String,
    #[serde(rename = "tradeSymbol")]
    pub trade_symbol: String,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub units: i32,
    #[serde(rename = "pricePerUnit")]
    pub price_per_unit: i32,
    #[serde(rename = "totalPrice")]
    pub total_price: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Shipyard {
    pub symbol: String,
    #[serde(rename = "shipTypes", default)]
    pub ship_types: Vec<ShipyardShipType>,
    #[serde(rename = "modificationsFee", default)]
    pub modifications_fee: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShipyardShipType {
    #[serde(rename = "type")]
    pub ship_type: String,
}
