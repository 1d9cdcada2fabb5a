use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Waypoint {
    pub symbol: String,
    #[serde(rename = "type")]
    pub waypoint_type: String,
    #[serde(rename = "systemSymbol")]
    pub system_symbol: String,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub traits: Vec<WaypointTrait>,
    #[serde(rename = "isUnderConstruction", default)]
    pub is_under_construction: bool,
}

impl Waypoint {
    pub fn has_trait(&self, trait_symbol: &str) -> bool {
        self.traits.iter().any(|t| t.symbol == trait_symbol)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WaypointTrait {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct System {
    pub symbol: String,
    #[serde(rename = "sectorSymbol")]
    pub sector_symbol: String,
    #[serde(rename = "type")]
    pub system_type: String,
    pub x: i64,
    pub y: i64,
}

/// Extract the system symbol from a waypoint symbol ("X1-AB12-C3" -> "X1-AB12").
pub fn system_symbol_of(waypoint_symbol: &str) -> String {
    waypoint_symbol
        .split('-')
        .take(2)
        .collect::<Vec<&str>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_symbol_from_waypoint() {
        assert_eq!(system_symbol_of("X1-AB12-C3"), "X1-AB12");
        assert_eq!(system_symbol_of("X1-AB12"), "X1-AB12");
    }
}
