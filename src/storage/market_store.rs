// Persistent market price cache shared by probes, traders, and contractors.
//
// Prices flow in whenever any ship docks at a market (write-through), and
// every planner reads from the same cache. Route claims live here too so
// standalone mission processes can see the commander's reservations.
use crate::models::MarketTradeGood;
use crate::models::waypoint::system_symbol_of;
use crate::o_error;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Cached price entry for one good at one market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketPriceRecord {
    pub waypoint_symbol: String,
    pub trade_symbol: String,
    pub trade_type: String,
    pub supply: String,
    pub activity: Option<String>,
    pub trade_volume: i32,
    pub purchase_price: i32,
    pub sell_price: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MarketEntry {
    system_symbol: String,
    updated_at: DateTime<Utc>,
    goods: Vec<MarketPriceRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RouteClaim {
    good: String,
    source: String,
    destination: String,
    claimed_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    markets: HashMap<String, MarketEntry>,
    claims: HashMap<String, RouteClaim>,
}

pub struct MarketStore {
    storage_path: Option<PathBuf>,
    data: Mutex<StoreData>,
}

/// Claims older than this are ignored (crashed process never released).
const CLAIM_DEFAULT_MAX_AGE_MIN: i64 = 15;

impl MarketStore {
    pub fn new(storage_path: PathBuf) -> Self {
        let data = match fs::read_to_string(&storage_path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(data) => data,
                Err(e) => {
                    o_error!("⚠️ Corrupt market cache {}: {} - starting empty", storage_path.display(), e);
                    StoreData::default()
                }
            },
            Err(_) => StoreData::default(),
        };
        Self { storage_path: Some(storage_path), data: Mutex::new(data) }
    }

    /// Cache with no disk backing, used by tests and dry runs.
    pub fn in_memory() -> Self {
        Self { storage_path: None, data: Mutex::new(StoreData::default()) }
    }

    pub fn update_market(
        &self,
        waypoint_symbol: &str,
        goods: &[MarketTradeGood],
        system_symbol: Option<&str>,
    ) {
        let now = Utc::now();
        let system = system_symbol
            .map(str::to_string)
            .unwrap_or_else(|| system_symbol_of(waypoint_symbol));
        let records = goods
            .iter()
            .map(|g| MarketPriceRecord {
                waypoint_symbol: waypoint_symbol.to_string(),
                trade_symbol: g.symbol.clone(),
                trade_type: g.trade_type.clone(),
                supply: g.supply.clone(),
                activity: g.activity.clone(),
                trade_volume: g.trade_volume,
                purchase_price: g.purchase_price,
                sell_price: g.sell_price,
                updated_at: now,
            })
            .collect();

        let mut data = self.lock();
        data.markets.insert(
            waypoint_symbol.to_string(),
            MarketEntry { system_symbol: system, updated_at: now, goods: records },
        );
        self.save(&data);
    }

    pub fn get_prices(&self, waypoint_symbol: &str) -> Vec<MarketPriceRecord> {
        self.lock()
            .markets
            .get(waypoint_symbol)
            .map(|entry| entry.goods.clone())
            .unwrap_or_default()
    }

    pub fn get_all_markets(&self, system_symbol: Option<&str>) -> Vec<String> {
        let data = self.lock();
        let mut markets: Vec<String> = data
            .markets
            .iter()
            .filter(|(_, entry)| {
                system_symbol.is_none_or(|s| entry.system_symbol == s)
            })
            .map(|(waypoint, _)| waypoint.clone())
            .collect();
        markets.sort();
        markets
    }

    pub fn get_stale_markets(&self, max_age_hours: f64) -> Vec<String> {
        let cutoff = Utc::now() - Duration::seconds((max_age_hours * 3600.0) as i64);
        let data = self.lock();
        let mut stale: Vec<String> = data
            .markets
            .iter()
            .filter(|(_, entry)| entry.updated_at < cutoff)
            .map(|(waypoint, _)| waypoint.clone())
            .collect();
        stale.sort();
        stale
    }

    /// Cheapest cached purchase price for a good.
    pub fn find_best_buy(
        &self,
        trade_symbol: &str,
        system_symbol: Option<&str>,
    ) -> Option<MarketPriceRecord> {
        self.records_for(trade_symbol, system_symbol)
            .into_iter()
            .min_by_key(|r| r.purchase_price)
    }

    /// Highest cached sell price for a good.
    pub fn find_best_sell(
        &self,
        trade_symbol: &str,
        system_symbol: Option<&str>,
    ) -> Option<MarketPriceRecord> {
        self.records_for(trade_symbol, system_symbol)
            .into_iter()
            .max_by_key(|r| r.sell_price)
    }

    fn records_for(
        &self,
        trade_symbol: &str,
        system_symbol: Option<&str>,
    ) -> Vec<MarketPriceRecord> {
        let data = self.lock();
        data.markets
            .values()
            .filter(|entry| system_symbol.is_none_or(|s| entry.system_symbol == s))
            .flat_map(|entry| entry.goods.iter())
            .filter(|r| r.trade_symbol == trade_symbol)
            .cloned()
            .collect()
    }

    /// Quick predicate used to gate TRADE assignments: is there any good
    /// exported somewhere and imported elsewhere with a positive margin?
    pub fn has_profitable_routes(&self) -> bool {
        let data = self.lock();
        let mut cheapest_export: HashMap<&str, (&str, i32)> = HashMap::new();
        for entry in data.markets.values() {
            for record in &entry.goods {
                if record.trade_type == "EXPORT" {
                    let slot = cheapest_export
                        .entry(record.trade_symbol.as_str())
                        .or_insert((record.waypoint_symbol.as_str(), record.purchase_price));
                    if record.purchase_price < slot.1 {
                        *slot = (record.waypoint_symbol.as_str(), record.purchase_price);
                    }
                }
            }
        }
        for entry in data.markets.values() {
            for record in &entry.goods {
                if record.trade_type != "IMPORT" {
                    continue;
                }
                if let Some((export_wp, buy_price)) =
                    cheapest_export.get(record.trade_symbol.as_str())
                {
                    if *export_wp != record.waypoint_symbol && record.sell_price > *buy_price {
                        return true;
                    }
                }
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Route claims
    // ------------------------------------------------------------------

    pub fn claim_route(&self, ship_symbol: &str, good: &str, source: &str, destination: &str) {
        let mut data = self.lock();
        data.claims.insert(
            ship_symbol.to_string(),
            RouteClaim {
                good: good.to_string(),
                source: source.to_string(),
                destination: destination.to_string(),
                claimed_at: Utc::now(),
            },
        );
        self.save(&data);
    }

    pub fn release_route(&self, ship_symbol: &str) {
        let mut data = self.lock();
        if data.claims.remove(ship_symbol).is_some() {
            self.save(&data);
        }
    }

    /// Routes claimed by other ships, ignoring stale claims.
    pub fn get_claimed_routes(
        &self,
        exclude_ship: &str,
        max_age_min: Option<i64>,
    ) -> Vec<(String, String, String)> {
        let cutoff =
            Utc::now() - Duration::minutes(max_age_min.unwrap_or(CLAIM_DEFAULT_MAX_AGE_MIN));
        let data = self.lock();
        let mut routes: Vec<(String, String, String)> = data
            .claims
            .iter()
            .filter(|(ship, claim)| ship.as_str() != exclude_ship && claim.claimed_at >= cutoff)
            .map(|(_, c)| (c.good.clone(), c.source.clone(), c.destination.clone()))
            .collect();
        routes.sort();
        routes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreData> {
        match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn save(&self, data: &StoreData) {
        let Some(path) = &self.storage_path else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match serde_json::to_string(data) {
            Ok(raw) => {
                if let Err(e) = fs::write(path, raw) {
                    o_error!("⚠️ Failed to save market cache {}: {}", path.display(), e);
                }
            }
            Err(e) => o_error!("⚠️ Failed to serialize market cache: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good(symbol: &str, trade_type: &str, buy: i32, sell: i32) -> MarketTradeGood {
        MarketTradeGood {
            symbol: symbol.to_string(),
            trade_type: trade_type.to_string(),
            trade_volume: 20,
            supply: "MODERATE".to_string(),
            activity: Some("WEAK".to_string()),
            purchase_price: buy,
            sell_price: sell,
        }
    }

    #[test]
    fn update_then_read_prices() {
        let store = MarketStore::in_memory();
        store.update_market("X1-AB12-K89", &[good("CLOTHING", "EXPORT", 3182, 1537)], None);

        let prices = store.get_prices("X1-AB12-K89");
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].trade_symbol, "CLOTHING");
        assert_eq!(prices[0].purchase_price, 3182);
        assert_eq!(store.get_all_markets(None), vec!["X1-AB12-K89".to_string()]);
        assert_eq!(store.get_all_markets(Some("X1-AB12")).len(), 1);
        assert!(store.get_all_markets(Some("X1-ZZ99")).is_empty());
    }

    #[test]
    fn fresh_markets_are_not_stale() {
        let store = MarketStore::in_memory();
        store.update_market("X1-AB12-A1", &[good("FOOD", "IMPORT", 4294, 2060)], None);
        assert!(store.get_stale_markets(1.0).is_empty());
    }

    #[test]
    fn best_buy_and_sell_pick_extremes() {
        let store = MarketStore::in_memory();
        store.update_market("X1-AB12-H58", &[good("ALUMINUM", "EXPORT", 155, 74)], None);
        store.update_market("X1-AB12-K89", &[good("ALUMINUM", "EXPORT", 476, 226)], None);
        store.update_market("X1-AB12-A1", &[good("ALUMINUM", "IMPORT", 900, 640)], None);

        let buy = store.find_best_buy("ALUMINUM", None).unwrap();
        assert_eq!(buy.waypoint_symbol, "X1-AB12-H58");
        assert_eq!(buy.purchase_price, 155);
        let sell = store.find_best_sell("ALUMINUM", None).unwrap();
        assert_eq!(sell.waypoint_symbol, "X1-AB12-A1");
        assert_eq!(sell.sell_price, 640);
    }

    #[test]
    fn profitable_route_predicate() {
        let store = MarketStore::in_memory();
        assert!(!store.has_profitable_routes());

        store.update_market("X1-AB12-K89", &[good("CLOTHING", "EXPORT", 3182, 1537)], None);
        assert!(!store.has_profitable_routes());

        store.update_market("X1-AB12-A1", &[good("CLOTHING", "IMPORT", 9884, 4790)], None);
        assert!(store.has_profitable_routes());
    }

    #[test]
    fn claims_roundtrip_and_exclude_owner() {
        let store = MarketStore::in_memory();
        store.claim_route("SHIP-1", "CLOTHING", "X1-AB12-K89", "X1-AB12-A1");

        assert!(store.get_claimed_routes("SHIP-1", None).is_empty());
        let others = store.get_claimed_routes("SHIP-2", None);
        assert_eq!(
            others,
            vec![(
                "CLOTHING".to_string(),
                "X1-AB12-K89".to_string(),
                "X1-AB12-A1".to_string()
            )]
        );

        store.release_route("SHIP-1");
        assert!(store.get_claimed_routes("SHIP-2", None).is_empty());
    }

    #[test]
    fn stale_claims_are_ignored() {
        let store = MarketStore::in_memory();
        store.claim_route("SHIP-1", "FOOD", "X1-AB12-K89", "X1-AB12-A1");
        // A zero-minute window makes every claim stale
        assert!(store.get_claimed_routes("SHIP-2", Some(0)).is_empty());
    }
}
