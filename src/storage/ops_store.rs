// Append-only operations log for the external dashboard.
//
// One JSON object per line; write failures are logged and swallowed so a
// full disk can never take a mission down.
use crate::o_error;
use chrono::Utc;
use serde_json::{Value, json};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

pub struct OpsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OpsStore {
    pub fn new(path: PathBuf) -> Self {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self { path, lock: Mutex::new(()) }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_trade(
        &self,
        ship_symbol: &str,
        side: &str,
        trade_symbol: &str,
        units: i32,
        price_per_unit: i32,
        total: i64,
        waypoint_symbol: &str,
        credits: Option<i64>,
        mission: &str,
    ) {
        self.append(json!({
            "kind": "trade",
            "at": Utc::now().to_rfc3339(),
            "ship": ship_symbol,
            "side": side,
            "good": trade_symbol,
            "units": units,
            "price_per_unit": price_per_unit,
            "total": total,
            "waypoint": waypoint_symbol,
            "credits": credits,
            "mission": mission,
        }));
    }

    pub fn record_extraction(&self, ship_symbol: &str, waypoint_symbol: &str, good: &str, units: i32) {
        self.append(json!({
            "kind": "extraction",
            "at": Utc::now().to_rfc3339(),
            "ship": ship_symbol,
            "waypoint": waypoint_symbol,
            "good": good,
            "units": units,
        }));
    }

    pub fn snapshot_agent(&self, credits: i64, ship_count: i32) {
        self.append(json!({
            "kind": "agent_snapshot",
            "at": Utc::now().to_rfc3339(),
            "credits": credits,
            "ship_count": ship_count,
        }));
    }

    fn append(&self, record: Value) {
        let _guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", record));
        if let Err(e) = result {
            o_error!("⚠️ Failed to append to operations log {}: {}", self.path.display(), e);
        }
    }
}
