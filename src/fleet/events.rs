// Typed events that drive the commander's loop.
use serde_json::Value;
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    TradeCompleted,
    TradeDry,
    ContractFulfilled,
    ContractDelivery,
    GateDelivery,
    GateComplete,
    ScanComplete,
    MissionCrashed,
    MissionEnded,
    CapitalLow,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TradeCompleted => "trade_completed",
            EventType::TradeDry => "trade_dry",
            EventType::ContractFulfilled => "contract_fulfilled",
            EventType::ContractDelivery => "contract_delivery",
            EventType::GateDelivery => "gate_delivery",
            EventType::GateComplete => "gate_complete",
            EventType::ScanComplete => "scan_complete",
            EventType::MissionCrashed => "mission_crashed",
            EventType::MissionEnded => "mission_ended",
            EventType::CapitalLow => "capital_low",
        }
    }

    /// Events that trigger a strategy re-evaluation.
    pub fn is_strategic(&self) -> bool {
        matches!(
            self,
            EventType::TradeCompleted
                | EventType::TradeDry
                | EventType::ContractFulfilled
                | EventType::GateDelivery
                | EventType::GateComplete
                | EventType::MissionCrashed
                | EventType::MissionEnded
                | EventType::CapitalLow
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single event emitted by a ship agent or the commander.
#[derive(Debug, Clone)]
pub struct FleetEvent {
    pub event_type: EventType,
    pub ship_symbol: String,
    pub timestamp: Instant,
    pub data: Value,
}

impl FleetEvent {
    pub fn new(event_type: EventType, ship_symbol: &str) -> Self {
        Self::with_data(event_type, ship_symbol, Value::Null)
    }

    pub fn with_data(event_type: EventType, ship_symbol: &str, data: Value) -> Self {
        Self {
            event_type,
            ship_symbol: ship_symbol.to_string(),
            timestamp: Instant::now(),
            data,
        }
    }
}

impl fmt::Display for FleetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.event_type, self.ship_symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategic_event_set() {
        let strategic = [
            EventType::TradeCompleted,
            EventType::TradeDry,
            EventType::ContractFulfilled,
            EventType::GateDelivery,
            EventType::GateComplete,
            EventType::MissionCrashed,
            EventType::MissionEnded,
            EventType::CapitalLow,
        ];
        for event in strategic {
            assert!(event.is_strategic(), "{} should be strategic", event);
        }
        assert!(!EventType::ContractDelivery.is_strategic());
        assert!(!EventType::ScanComplete.is_strategic());
    }

    #[test]
    fn display_includes_ship() {
        let event = FleetEvent::new(EventType::TradeCompleted, "SHIP-1");
        assert_eq!(event.to_string(), "trade_completed(SHIP-1)");
    }
}
