use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Contract {
    pub id: String,
    #[serde(rename = "factionSymbol")]
    pub faction_symbol: String,
    #[serde(rename = "type")]
    pub contract_type: String,
    pub terms: ContractTerms,
    pub accepted: bool,
    pub fulfilled: bool,
    pub expiration: DateTime<Utc>,
    #[serde(rename = "deadlineToAccept")]
    pub deadline_to_accept: Option<DateTime<Utc>>,
}

impl Contract {
    pub fn total_payment(&self) -> i64 {
        self.terms.payment.on_accepted + self.terms.payment.on_fulfilled
    }

    /// Delivery lines that still need units.
    pub fn remaining_deliveries(&self) -> Vec<&ContractDelivery> {
        self.terms
            .deliver
            .iter()
            .filter(|d| d.units_remaining() > 0)
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContractTerms {
    pub deadline: DateTime<Utc>,
    pub payment: ContractPayment,
    #[serde(default)]
    pub deliver: Vec<ContractDelivery>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContractPayment {
    #[serde(rename = "onAccepted")]
    pub on_accepted: i64,
    #[serde(rename = "onFulfilled")]
    pub on_fulfilled: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContractDelivery {
    #[serde(rename = "tradeSymbol")]
    pub trade_symbol: String,
    #[serde(rename = "destinationSymbol")]
    pub destination_symbol: String,
    #[serde(rename = "unitsRequired")]
    pub units_required: i32,
    #[serde(rename = "unitsFulfilled")]
    pub units_fulfilled: i32,
}

impl ContractDelivery {
    pub fn units_remaining(&self) -> i32 {
        self.units_required - self.units_fulfilled
    }
}
