// Probe market scanner: drift between marketplaces, cache prices.
//
// Cycle 1 visits every market; later cycles only the stale ones. Several
// probes share one market cache, so each re-checks freshness right before
// a stop and skips markets another probe already refreshed.
use crate::client::{ApiClient, ApiError, Priority};
use crate::fleet::events::{EventType, FleetEvent};
use crate::fleet::registry::MissionParams;
use crate::fleet::state::{FleetState, load_system_intel};
use crate::missions::MissionError;
use crate::missions::navigation::wait_for_arrival;
use crate::missions::router::waypoint_distance;
use crate::models::{FlightMode, NavStatus, Ship, Waypoint};
use crate::storage::MarketStore;
use crate::{o_info, o_summary};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Duration;

/// Default re-scan threshold in minutes.
const DEFAULT_MAX_AGE_MIN: f64 = 90.0;

/// Sleep when every market is fresh.
const ALL_FRESH_SLEEP: Duration = Duration::from_secs(300);

pub fn find_marketplace_waypoints(waypoints: &[Waypoint]) -> Vec<Waypoint> {
    waypoints.iter().filter(|wp| wp.has_trait("MARKETPLACE")).cloned().collect()
}

/// Order marketplaces by nearest-neighbor from the starting position.
pub fn plan_scan_route(start: &Waypoint, markets: &[Waypoint]) -> Vec<Waypoint> {
    let mut remaining: Vec<Waypoint> = markets.to_vec();
    let mut route: Vec<Waypoint> = Vec::new();
    let mut current = start.clone();

    while !remaining.is_empty() {
        let (index, _) = remaining
            .iter()
            .enumerate()
            .map(|(i, wp)| (i, waypoint_distance(&current, wp)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, 0.0));
        let nearest = remaining.remove(index);
        current = nearest.clone();
        route.push(nearest);
    }
    route
}

/// Is this market's cache newer than the staleness threshold?
fn market_is_fresh(store: &MarketStore, waypoint: &str, max_age_min: f64) -> bool {
    let prices = store.get_prices(waypoint);
    let Some(oldest) = prices.iter().map(|p| p.updated_at).min() else {
        return false;
    };
    let age_min = (Utc::now() - oldest).num_seconds() as f64 / 60.0;
    age_min < max_age_min
}

/// Markets that are stale or never scanned.
fn stale_targets(markets: &[Waypoint], store: &MarketStore, max_age_min: f64) -> Vec<Waypoint> {
    markets
        .iter()
        .filter(|wp| !market_is_fresh(store, &wp.symbol, max_age_min))
        .cloned()
        .collect()
}

/// Navigate to a marketplace (DRIFT - probes are solar), dock, and cache
/// its prices. Returns the updated ship and whether data was cached.
async fn scan_marketplace(
    api: &ApiClient,
    mut ship: Ship,
    waypoint: &Waypoint,
    store: &MarketStore,
) -> Result<(Ship, bool), ApiError> {
    if ship.nav.status == NavStatus::InTransit {
        ship = wait_for_arrival(api, &ship.symbol).await?;
    }

    if ship.nav.waypoint_symbol != waypoint.symbol {
        if ship.nav.status == NavStatus::Docked {
            api.orbit(&ship.symbol).await?;
        }
        if ship.nav.flight_mode != FlightMode::Drift {
            api.set_flight_mode(&ship.symbol, FlightMode::Drift).await?;
        }
        api.navigate(&ship.symbol, &waypoint.symbol).await?;
        ship = wait_for_arrival(api, &ship.symbol).await?;

        if ship.nav.waypoint_symbol != waypoint.symbol {
            o_info!("  ⚠️ [{}] Failed to arrive at {}", ship.symbol, waypoint.symbol);
            return Ok((ship, false));
        }
    }

    o_info!("  📡 [{}] At {} ({})", ship.symbol, waypoint.symbol, waypoint.waypoint_type);
    if ship.nav.status != NavStatus::Docked {
        ship.nav = api.dock(&ship.symbol).await?;
    }

    match api
        .get_market_with_priority(&ship.nav.system_symbol, &waypoint.symbol, Priority::Background)
        .await
    {
        Ok(market) => {
            let goods = market.trade_goods.unwrap_or_default();
            if goods.is_empty() {
                o_info!("  ⚠️ [{}] No trade goods visible at {}", ship.symbol, waypoint.symbol);
                Ok((ship, false))
            } else {
                store.update_market(&waypoint.symbol, &goods, Some(&ship.nav.system_symbol));
                o_info!(
                    "  📊 [{}] Cached {} trade goods at {}",
                    ship.symbol,
                    goods.len(),
                    waypoint.symbol
                );
                Ok((ship, true))
            }
        }
        Err(e) => {
            o_info!(
                "  ⚠️ [{}] Market fetch failed at {} ({}): {}",
                ship.symbol, waypoint.symbol, e.code, e
            );
            Ok((ship, false))
        }
    }
}

/// SCAN mission entry point.
pub async fn scan_mission(
    api: Arc<ApiClient>,
    ship_symbol: String,
    state: Arc<FleetState>,
    params: MissionParams,
) -> Result<(), MissionError> {
    let max_age_min = params.max_age_min.unwrap_or(DEFAULT_MAX_AGE_MIN);

    let mut ship = wait_for_arrival(&api, &ship_symbol).await?;
    let system = ship.nav.system_symbol.clone();
    let system_state = load_system_intel(&api, &system, &state).await?;
    let markets = find_marketplace_waypoints(&system_state.waypoints);

    o_summary!(
        "🛰️ [{}] SCAN mission started in {} ({} markets, refresh > {:.0} min)",
        ship_symbol, system, markets.len(), max_age_min
    );
    if markets.is_empty() {
        return Err(MissionError::other(format!("no marketplaces found in {}", system)));
    }

    let mut cycle: u32 = 0;
    while !state.shutdown.is_set() {
        cycle += 1;

        let targets = if cycle == 1 {
            markets.clone()
        } else {
            let stale = stale_targets(&markets, &state.market_store, max_age_min);
            if stale.is_empty() {
                o_info!(
                    "🛰️ [{}] All {} markets fresh (< {:.0} min). Sleeping 5 min...",
                    ship_symbol, markets.len(), max_age_min
                );
                state.shutdown.sleep(ALL_FRESH_SLEEP).await;
                continue;
            }
            stale
        };

        ship = wait_for_arrival(&api, &ship_symbol).await?;
        let Some(ship_waypoint) = system_state
            .waypoints
            .iter()
            .find(|wp| wp.symbol == ship.nav.waypoint_symbol)
        else {
            return Err(MissionError::other(format!(
                "unknown probe waypoint {}",
                ship.nav.waypoint_symbol
            )));
        };

        let route = plan_scan_route(ship_waypoint, &targets);
        o_info!(
            "🛰️ [{}] CYCLE {}: {}/{} markets to scan",
            ship_symbol, cycle, route.len(), markets.len()
        );

        let mut scanned = 0;
        let mut skipped = 0;
        for (i, waypoint) in route.iter().enumerate() {
            if state.shutdown.is_set() {
                break;
            }

            // Another probe may have refreshed this stop while we drifted
            if cycle > 1 && market_is_fresh(&state.market_store, &waypoint.symbol, max_age_min) {
                o_info!("  ⏭️ [{}] SKIP {} (freshly scanned)", ship_symbol, waypoint.symbol);
                skipped += 1;
                continue;
            }

            o_info!("### [{}] STOP {}/{}: {} ###", ship_symbol, i + 1, route.len(), waypoint.symbol);
            ship = api.get_ship(&ship_symbol).await?;
            let (updated, success) = scan_marketplace(&api, ship, waypoint, &state.market_store).await?;
            ship = updated;
            if success {
                scanned += 1;
            }
        }

        let cached = state.market_store.get_all_markets(Some(&system)).len();
        o_summary!(
            "🛰️ [{}] CYCLE {} COMPLETE: {}/{} scanned, {} skipped | {} markets in cache",
            ship_symbol, cycle, scanned, route.len(), skipped, cached
        );
    }

    state.emit(FleetEvent::new(EventType::ScanComplete, &ship_symbol));
    o_summary!("🛰️ [{}] SCAN mission stopped", ship_symbol);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WaypointTrait;

    fn waypoint(symbol: &str, x: i32, y: i32, market: bool) -> Waypoint {
        Waypoint {
            symbol: symbol.to_string(),
            waypoint_type: "PLANET".to_string(),
            system_symbol: "X1-AB12".to_string(),
            x,
            y,
            traits: if market {
                vec![WaypointTrait {
                    symbol: "MARKETPLACE".to_string(),
                    name: "Marketplace".to_string(),
                    description: String::new(),
                }]
            } else {
                Vec::new()
            },
            is_under_construction: false,
        }
    }

    #[test]
    fn filters_marketplaces() {
        let waypoints = vec![
            waypoint("X1-AB12-A1", 0, 0, true),
            waypoint("X1-AB12-B2", 5, 5, false),
            waypoint("X1-AB12-C3", 9, 9, true),
        ];
        let markets = find_marketplace_waypoints(&waypoints);
        assert_eq!(markets.len(), 2);
        assert!(markets.iter().all(|wp| wp.has_trait("MARKETPLACE")));
    }

    #[test]
    fn nearest_neighbor_tour() {
        let start = waypoint("START", 0, 0, false);
        let markets = vec![
            waypoint("FAR", 100, 0, true),
            waypoint("NEAR", 10, 0, true),
            waypoint("MID", 50, 0, true),
        ];
        let route = plan_scan_route(&start, &markets);
        let symbols: Vec<&str> = route.iter().map(|wp| wp.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["NEAR", "MID", "FAR"]);
    }

    #[test]
    fn unscanned_markets_are_stale() {
        let store = MarketStore::in_memory();
        let markets = vec![waypoint("X1-AB12-A1", 0, 0, true)];
        assert_eq!(stale_targets(&markets, &store, 90.0).len(), 1);
        assert!(!market_is_fresh(&store, "X1-AB12-A1", 90.0));
    }

    #[test]
    fn freshly_scanned_market_is_skipped() {
        use crate::models::MarketTradeGood;
        let store = MarketStore::in_memory();
        store.update_market(
            "X1-AB12-A1",
            &[MarketTradeGood {
                symbol: "FUEL".to_string(),
                trade_type: "EXCHANGE".to_string(),
                trade_volume: 100,
                supply: "MODERATE".to_string(),
                activity: None,
                purchase_price: 72,
                sell_price: 68,
            }],
            None,
        );
        assert!(market_is_fresh(&store, "X1-AB12-A1", 90.0));
        let markets = vec![waypoint("X1-AB12-A1", 0, 0, true)];
        assert!(stale_targets(&markets, &store, 90.0).is_empty());
    }
}
