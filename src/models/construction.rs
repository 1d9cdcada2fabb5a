use serde::Deserialize;

/// Jump gate construction site state.
#[derive(Debug, Deserialize, Clone)]
pub struct Construction {
    pub symbol: String,
    #[serde(default)]
    pub materials: Vec<ConstructionMaterial>,
    #[serde(rename = "isComplete")]
    pub is_complete: bool,
}

impl Construction {
    /// Materials that still need units delivered.
    pub fn unmet_materials(&self) -> Vec<&ConstructionMaterial> {
        self.materials.iter().filter(|m| m.remaining() > 0).collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConstructionMaterial {
    #[serde(rename = "tradeSymbol")]
    pub trade_symbol: String,
    pub required: i32,
    pub fulfilled: i32,
}

impl ConstructionMaterial {
    pub fn remaining(&self) -> i32 {
        self.required - self.fulfilled
    }
}
