// Autonomous trade mission: find the best cached buy/sell route, claim it,
// run it, repeat. Prices refresh at every market visit so routes adapt to
// shifting supply and demand.
use crate::client::{ApiClient, ApiError};
use crate::fleet::events::{EventType, FleetEvent};
use crate::fleet::registry::MissionParams;
use crate::fleet::state::{FleetState, load_system_intel};
use crate::missions::MissionError;
use crate::missions::navigation::{
    navigate_ship, navigate_with_refuel_stops, try_refuel, wait_for_arrival,
};
use crate::missions::router::{
    build_fuel_waypoints, coord_distance, estimate_fuel_one_way, plan_multihop, travel_time,
};
use crate::models::{FlightMode, MarketTradeGood, NavStatus, Ship};
use crate::models::waypoint::system_symbol_of;
use crate::storage::{MarketPriceRecord, MarketStore};
use crate::{o_debug, o_error, o_info, o_summary};
use serde_json::json;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;

/// Fuel price in credits per unit, consistent across markets.
pub const FUEL_PRICE: i64 = 72;

/// How long a failed route stays blacklisted.
const FAILED_ROUTE_TTL: Duration = Duration::from_secs(1800);

/// Dry-cycle sleep schedule in seconds, capped at the last entry.
const BACKOFF_SCHEDULE: [u64; 4] = [300, 600, 1200, 1800];

/// Overhead per trip: dock + buy batches + dock + sell batches + refuel.
pub const TRADE_OVERHEAD_SECONDS: u32 = 30;

fn supply_multiplier(supply: &str) -> f64 {
    match supply {
        "SCARCE" => 2.0,
        "LIMITED" => 3.0,
        "MODERATE" => 4.0,
        "HIGH" => 5.0,
        "ABUNDANT" => 6.0,
        _ => 3.0,
    }
}

/// How many units a destination market can absorb without crashing its
/// price. STRONG activity recovers faster, so it takes one extra multiple.
pub fn safe_sell_volume(
    dest_supply: &str,
    dest_activity: Option<&str>,
    trade_volume: i32,
    cargo_capacity: i32,
) -> i32 {
    let mut multiplier = supply_multiplier(dest_supply);
    if dest_activity == Some("STRONG") {
        multiplier += 1.0;
    }
    ((trade_volume as f64 * multiplier) as i32).min(cargo_capacity)
}

/// A scored trade route: buy `good` at `source`, sell at `destination`.
#[derive(Debug, Clone)]
pub struct TradeRoute {
    pub good: String,
    pub source: String,
    pub destination: String,
    pub buy_price: i32,
    pub sell_price: i32,
    pub trade_volume: i32,
    pub profit_per_unit: i32,
    pub deadhead_fuel_credits: i64,
    pub leg_fuel_credits: i64,
    pub dest_supply: String,
    pub dest_trade_volume: i32,
    pub trip_seconds: u32,
    pub net_profit: i64,
    pub profit_per_minute: f64,
}

/// Scan all cached markets for profitable EXPORT -> IMPORT pairs.
///
/// Accounts for fuel cost, deadhead, and travel time; routes out of direct
/// fuel range are re-planned through the multi-hop pathfinder. Ranked by
/// profit per minute, not raw net profit.
#[allow(clippy::too_many_arguments)]
pub fn find_best_routes(
    store: &MarketStore,
    coords: &HashMap<String, (i32, i32)>,
    ship_location: &str,
    cargo_capacity: i32,
    fuel_capacity: i32,
    excluded_routes: &[(String, String, String)],
    credits: Option<i64>,
    speed: i32,
    system_symbol: Option<&str>,
    fuel_waypoints: &HashSet<String>,
) -> Vec<TradeRoute> {
    let excluded: HashSet<&(String, String, String)> = excluded_routes.iter().collect();

    let mut exports: HashMap<String, Vec<MarketPriceRecord>> = HashMap::new();
    let mut imports: HashMap<String, Vec<MarketPriceRecord>> = HashMap::new();
    for waypoint in store.get_all_markets(system_symbol) {
        for record in store.get_prices(&waypoint) {
            match record.trade_type.as_str() {
                "EXPORT" => exports.entry(record.trade_symbol.clone()).or_default().push(record),
                "IMPORT" => imports.entry(record.trade_symbol.clone()).or_default().push(record),
                _ => {}
            }
        }
    }

    let mut routes: Vec<TradeRoute> = Vec::new();
    for (good, export_list) in &exports {
        let Some(import_list) = imports.get(good) else {
            continue;
        };
        for src in export_list {
            for dst in import_list {
                if src.waypoint_symbol == dst.waypoint_symbol {
                    continue;
                }
                let key = (good.clone(), src.waypoint_symbol.clone(), dst.waypoint_symbol.clone());
                if excluded.contains(&key) {
                    continue;
                }
                let profit_per_unit = dst.sell_price - src.purchase_price;
                if profit_per_unit <= 0 {
                    continue;
                }
                // Skip routes where even one batch is unaffordable
                if let Some(credits) = credits {
                    if src.purchase_price as i64 * src.trade_volume as i64 > credits {
                        o_debug!(
                            "Skipping {} at {}: one batch exceeds {} credits",
                            good, src.waypoint_symbol, credits
                        );
                        continue;
                    }
                }

                let mut deadhead_fuel =
                    estimate_fuel_one_way(coords, ship_location, &src.waypoint_symbol);
                let mut leg_fuel =
                    estimate_fuel_one_way(coords, &src.waypoint_symbol, &dst.waypoint_symbol);

                let deadhead_dist =
                    coord_distance(coords, ship_location, &src.waypoint_symbol).unwrap_or(0.0);
                let leg_dist =
                    coord_distance(coords, &src.waypoint_symbol, &dst.waypoint_symbol).unwrap_or(0.0);
                let mut deadhead_secs = if deadhead_dist > 0.0 {
                    travel_time(deadhead_dist, speed, FlightMode::Cruise)
                } else {
                    0
                };
                let mut leg_secs = travel_time(leg_dist, speed, FlightMode::Cruise);

                // Legs beyond direct fuel range go through the multi-hop planner
                if deadhead_fuel > fuel_capacity {
                    if fuel_waypoints.is_empty() {
                        continue;
                    }
                    let plan = plan_multihop(
                        coords,
                        fuel_waypoints,
                        ship_location,
                        &src.waypoint_symbol,
                        fuel_capacity,
                        speed,
                        FlightMode::Cruise,
                    );
                    if !plan.feasible {
                        continue;
                    }
                    deadhead_fuel = plan.total_fuel;
                    deadhead_secs = plan.total_seconds;
                }
                if leg_fuel > fuel_capacity {
                    if fuel_waypoints.is_empty() {
                        continue;
                    }
                    let plan = plan_multihop(
                        coords,
                        fuel_waypoints,
                        &src.waypoint_symbol,
                        &dst.waypoint_symbol,
                        fuel_capacity,
                        speed,
                        FlightMode::Cruise,
                    );
                    if !plan.feasible {
                        continue;
                    }
                    leg_fuel = plan.total_fuel;
                    leg_secs = plan.total_seconds;
                }

                let deadhead_fuel_credits = deadhead_fuel as i64 * FUEL_PRICE;
                let leg_fuel_credits = leg_fuel as i64 * FUEL_PRICE;
                let safe_units = safe_sell_volume(
                    &dst.supply,
                    dst.activity.as_deref(),
                    dst.trade_volume,
                    cargo_capacity,
                );
                let gross = profit_per_unit as i64 * safe_units as i64;
                let net_profit = gross - deadhead_fuel_credits - leg_fuel_credits;
                if net_profit <= 0 {
                    continue;
                }

                let trip_seconds = deadhead_secs + leg_secs + TRADE_OVERHEAD_SECONDS;
                let profit_per_minute = net_profit as f64 / (trip_seconds as f64 / 60.0);

                routes.push(TradeRoute {
                    good: good.clone(),
                    source: src.waypoint_symbol.clone(),
                    destination: dst.waypoint_symbol.clone(),
                    buy_price: src.purchase_price,
                    sell_price: dst.sell_price,
                    trade_volume: src.trade_volume,
                    profit_per_unit,
                    deadhead_fuel_credits,
                    leg_fuel_credits,
                    dest_supply: dst.supply.clone(),
                    dest_trade_volume: dst.trade_volume,
                    trip_seconds,
                    net_profit,
                    profit_per_minute,
                });
            }
        }
    }

    routes.sort_by(|a, b| {
        b.profit_per_minute
            .partial_cmp(&a.profit_per_minute)
            .unwrap_or(Ordering::Equal)
    });
    routes
}

/// Fetch live market data and write it through to the shared cache.
pub async fn refresh_market(
    api: &ApiClient,
    waypoint: &str,
    store: &MarketStore,
) -> Result<Vec<MarketTradeGood>, ApiError> {
    let system = system_symbol_of(waypoint);
    let market = api.get_market(&system, waypoint).await?;
    let goods = market.trade_goods.unwrap_or_default();
    if !goods.is_empty() {
        store.update_market(waypoint, &goods, Some(&system));
        o_info!("📊 Refreshed prices at {} ({} goods)", waypoint, goods.len());
    }
    Ok(goods)
}

/// Buy `good` in trade-volume batches. Returns (units_bought, total_cost).
pub async fn buy_cargo(
    api: &ApiClient,
    state: &FleetState,
    ship_symbol: &str,
    good: &str,
    target_units: i32,
    trade_volume: i32,
    waypoint: &str,
    mission: &str,
) -> (i32, i64) {
    let mut bought = 0;
    let mut cost: i64 = 0;
    while bought < target_units {
        let batch = trade_volume.min(target_units - bought);
        match api.purchase_cargo(ship_symbol, good, batch).await {
            Ok(trade) => {
                bought += trade.transaction.units;
                cost += trade.transaction.total_price;
                o_info!(
                    "  💳 [{}] Bought {} {} @ {}/unit ({}/{}). Balance: {}",
                    ship_symbol,
                    trade.transaction.units,
                    good,
                    trade.transaction.price_per_unit,
                    bought,
                    target_units,
                    trade.agent.credits
                );
                if let Some(ops) = &state.ops_store {
                    ops.record_trade(
                        ship_symbol,
                        "BUY",
                        good,
                        trade.transaction.units,
                        trade.transaction.price_per_unit,
                        trade.transaction.total_price,
                        waypoint,
                        Some(trade.agent.credits),
                        mission,
                    );
                }
            }
            Err(e) => {
                o_info!(
                    "  ⚠️ [{}] Buy failed ({}): {} - bought {} so far",
                    ship_symbol, e.code, e, bought
                );
                break;
            }
        }
    }
    (bought, cost)
}

/// Sell `good` in trade-volume batches. Returns (units_sold, total_revenue).
pub async fn sell_cargo(
    api: &ApiClient,
    state: &FleetState,
    ship_symbol: &str,
    good: &str,
    units: i32,
    trade_volume: i32,
    waypoint: &str,
    mission: &str,
) -> (i32, i64) {
    let mut sold = 0;
    let mut revenue: i64 = 0;
    let mut remaining = units;
    while remaining > 0 {
        let batch = trade_volume.min(remaining);
        match api.sell_cargo(ship_symbol, good, batch).await {
            Ok(trade) => {
                sold += trade.transaction.units;
                remaining -= trade.transaction.units;
                revenue += trade.transaction.total_price;
                o_info!(
                    "  💵 [{}] Sold {} {} @ {}/unit ({} remaining). Balance: {}",
                    ship_symbol,
                    trade.transaction.units,
                    good,
                    trade.transaction.price_per_unit,
                    remaining,
                    trade.agent.credits
                );
                if let Some(ops) = &state.ops_store {
                    ops.record_trade(
                        ship_symbol,
                        "SELL",
                        good,
                        trade.transaction.units,
                        trade.transaction.price_per_unit,
                        trade.transaction.total_price,
                        waypoint,
                        Some(trade.agent.credits),
                        mission,
                    );
                }
            }
            Err(e) => {
                o_info!(
                    "  ⚠️ [{}] Sell failed ({}): {} - sold {} so far",
                    ship_symbol, e.code, e, sold
                );
                break;
            }
        }
    }
    (sold, revenue)
}

/// Sell leftover cargo at whichever market yields the best revenue per
/// minute, repeating until the hold is empty. Cargo nobody buys gets
/// jettisoned so the trade loop can start clean.
pub async fn sell_existing_cargo(
    api: &ApiClient,
    state: &FleetState,
    mut ship: Ship,
    coords: &HashMap<String, (i32, i32)>,
) -> Result<Ship, ApiError> {
    let mut total_sold = 0;
    let mut total_revenue: i64 = 0;

    loop {
        ship = api.get_ship(&ship.symbol).await?;
        if ship.cargo.units == 0 {
            break;
        }
        let items: Vec<(String, i32)> = ship
            .cargo
            .inventory
            .iter()
            .map(|item| (item.symbol.clone(), item.units))
            .collect();
        o_info!(
            "📦 [{}] Existing cargo to sell: {}",
            ship.symbol,
            items.iter().map(|(s, u)| format!("{}x {}", u, s)).collect::<Vec<_>>().join(", ")
        );

        // Score candidate markets by total revenue across all items
        let system = ship.nav.system_symbol.clone();
        let mut market_scores: HashMap<String, i64> = HashMap::new();
        for (symbol, units) in &items {
            if let Some(best) = state.market_store.find_best_sell(symbol, Some(&system)) {
                *market_scores.entry(best.waypoint_symbol).or_insert(0) +=
                    best.sell_price as i64 * *units as i64;
            }
        }

        if market_scores.is_empty() {
            o_info!("🗑️ [{}] No cached sell destinations - jettisoning", ship.symbol);
            for (symbol, units) in &items {
                match api.jettison(&ship.symbol, symbol, *units).await {
                    Ok(_) => o_info!("  🗑️ [{}] Jettisoned {}x {}", ship.symbol, units, symbol),
                    Err(e) => o_info!("  ⚠️ [{}] Jettison {} failed: {}", ship.symbol, symbol, e),
                }
            }
            ship = api.get_ship(&ship.symbol).await?;
            break;
        }

        // Weight revenue by the time it takes to get there
        let speed = ship.engine.speed;
        let mut best_waypoint: Option<String> = None;
        let mut best_rate = 0.0f64;
        for (waypoint, revenue) in &market_scores {
            let dist = coord_distance(coords, &ship.nav.waypoint_symbol, waypoint).unwrap_or(0.0);
            let trip_secs = if dist > 0.0 {
                travel_time(dist, speed, FlightMode::Cruise) + TRADE_OVERHEAD_SECONDS
            } else {
                TRADE_OVERHEAD_SECONDS
            };
            let rate = *revenue as f64 / trip_secs as f64;
            if rate > best_rate {
                best_rate = rate;
                best_waypoint = Some(waypoint.clone());
            }
        }
        let Some(best_waypoint) = best_waypoint else {
            break;
        };
        o_info!(
            "💰 [{}] Selling cargo at {} (est revenue/sec: {:.0})",
            ship.symbol, best_waypoint, best_rate
        );

        while ship.nav.status == NavStatus::InTransit {
            ship = wait_for_arrival(api, &ship.symbol).await?;
        }
        if ship.nav.waypoint_symbol != best_waypoint {
            ship = navigate_ship(api, ship, &best_waypoint, None).await?;
            while ship.nav.status == NavStatus::InTransit {
                ship = wait_for_arrival(api, &ship.symbol).await?;
            }
        }
        if ship.nav.status != NavStatus::Docked {
            ship.nav = api.dock(&ship.symbol).await?;
        }
        refresh_market(api, &best_waypoint, &state.market_store).await?;
        ship = try_refuel(api, ship).await?;

        let volumes: HashMap<String, i32> = state
            .market_store
            .get_prices(&best_waypoint)
            .into_iter()
            .map(|record| (record.trade_symbol, record.trade_volume))
            .collect();
        for (symbol, units) in &items {
            let volume = volumes.get(symbol).copied().unwrap_or(20);
            let (sold, revenue) = sell_cargo(
                api, state, &ship.symbol, symbol, *units, volume, &best_waypoint, "trade",
            )
            .await;
            total_sold += sold;
            total_revenue += revenue;
        }
    }

    if total_sold > 0 {
        o_info!(
            "💰 [{}] Cargo cleanup complete: sold {} units for {} credits",
            ship.symbol, total_sold, total_revenue
        );
    }
    Ok(ship)
}

/// TRADE mission entry point.
pub async fn trade_mission(
    api: Arc<ApiClient>,
    ship_symbol: String,
    state: Arc<FleetState>,
    params: MissionParams,
) -> Result<(), MissionError> {
    let loops_per_cycle = params.loops_per_cycle.unwrap_or(3);

    let ship = wait_for_arrival(&api, &ship_symbol).await?;
    let system = ship.nav.system_symbol.clone();
    let system_state = load_system_intel(&api, &system, &state).await?;
    let coords = system_state.coords.clone();
    let fuel_waypoints = build_fuel_waypoints(&system_state.waypoints);

    let agent_info = api.get_agent().await?;
    o_summary!(
        "📈 [{}] TRADE mission started at {} | {} credits | fuel {}/{}",
        ship_symbol, ship.nav.waypoint_symbol, agent_info.credits,
        ship.fuel.current, ship.fuel.capacity
    );
    if let Some(ops) = &state.ops_store {
        ops.snapshot_agent(agent_info.credits, agent_info.ship_count);
    }

    let result = trade_loop(
        &api,
        &ship_symbol,
        &state,
        &system,
        &coords,
        &fuel_waypoints,
        loops_per_cycle,
        agent_info.credits,
    )
    .await;

    state.release_route(&system, &ship_symbol);
    o_summary!("📈 [{}] TRADE mission stopped", ship_symbol);
    result
}

#[allow(clippy::too_many_arguments)]
async fn trade_loop(
    api: &ApiClient,
    ship_symbol: &str,
    state: &FleetState,
    system: &str,
    coords: &HashMap<String, (i32, i32)>,
    fuel_waypoints: &HashSet<String>,
    loops_per_cycle: u32,
    session_start_credits: i64,
) -> Result<(), MissionError> {
    let mut cycle: u32 = 0;
    let mut failed_routes: HashMap<(String, String, String), Instant> = HashMap::new();
    let mut dry_streak: u32 = 0;

    while !state.shutdown.is_set() {
        cycle += 1;
        let cycle_start_credits = api.get_agent().await?.credits;
        let mut cycle_successes: u32 = 0;
        let mut cycle_trips: Vec<(String, i64)> = Vec::new();

        // Blacklisted routes get a second chance after the TTL
        failed_routes.retain(|_, failed_at| failed_at.elapsed() < FAILED_ROUTE_TTL);
        if !failed_routes.is_empty() {
            o_info!(
                "🚫 [{}] Failed route memory: {} routes blacklisted",
                ship_symbol,
                failed_routes.len()
            );
        }

        // Catch up after a crash/restart mid-flight
        let mut ship = wait_for_arrival(api, ship_symbol).await?;

        if ship.cargo.units > 0 {
            ship = sell_existing_cargo(api, state, ship, coords).await?;
        }

        let mut agent_info = api.get_agent().await?;
        let mut excluded = state.get_excluded_routes(system, ship_symbol);
        excluded.extend(failed_routes.keys().cloned());
        let speed = ship.engine.speed;
        let mut routes = find_best_routes(
            &state.market_store,
            coords,
            &ship.nav.waypoint_symbol,
            ship.cargo.capacity,
            ship.fuel.capacity,
            &excluded,
            Some(agent_info.credits),
            speed,
            Some(system),
            fuel_waypoints,
        );

        if routes.is_empty() {
            dry_streak += 1;
            let backoff = BACKOFF_SCHEDULE[(dry_streak as usize - 1).min(BACKOFF_SCHEDULE.len() - 1)];
            o_info!(
                "🏜️ [{}] No profitable routes (dry streak {}). Sleeping {} min...",
                ship_symbol,
                dry_streak,
                backoff / 60
            );
            state.emit(FleetEvent::with_data(
                EventType::TradeDry,
                ship_symbol,
                json!({ "dry_streak": dry_streak }),
            ));
            state.shutdown.sleep(Duration::from_secs(backoff)).await;
            continue;
        }

        o_info!("📈 [{}] Top routes from {}:", ship_symbol, ship.nav.waypoint_symbol);
        for route in routes.iter().take(3) {
            o_info!(
                "  {} {} → {}  net={:+}  {}/min",
                route.good,
                route.source,
                route.destination,
                route.net_profit,
                route.profit_per_minute.round()
            );
        }

        for loop_num in 1..=loops_per_cycle {
            if state.shutdown.is_set() {
                break;
            }

            // Re-rank each loop: prices shift and the ship moved
            if loop_num > 1 {
                ship = api.get_ship(ship_symbol).await?;
                agent_info = api.get_agent().await?;
                excluded = state.get_excluded_routes(system, ship_symbol);
                excluded.extend(failed_routes.keys().cloned());
                routes = find_best_routes(
                    &state.market_store,
                    coords,
                    &ship.nav.waypoint_symbol,
                    ship.cargo.capacity,
                    ship.fuel.capacity,
                    &excluded,
                    Some(agent_info.credits),
                    speed,
                    Some(system),
                    fuel_waypoints,
                );
                if routes.is_empty() {
                    o_info!("🏜️ [{}] No profitable routes left this cycle", ship_symbol);
                    break;
                }
            }

            let best = routes[0].clone();
            state.claim_route(system, ship_symbol, &best.good, &best.source, &best.destination);
            o_info!(
                "### [{}] LOOP {}/{} (cycle {}) - {}: {} → {}  est net={:+}  buy={} sell={} ###",
                ship_symbol, loop_num, loops_per_cycle, cycle, best.good,
                best.source, best.destination, best.net_profit, best.buy_price, best.sell_price
            );

            // 1. Fly to source
            ship = api.get_ship(ship_symbol).await?;
            ship = navigate_with_refuel_stops(api, ship, &best.source, coords, fuel_waypoints).await?;
            if ship.nav.status != NavStatus::Docked {
                ship.nav = api.dock(ship_symbol).await?;
            }
            refresh_market(api, &best.source, &state.market_store).await?;
            ship = try_refuel(api, ship).await?;

            // 2. Buy, volume-capped so the destination can absorb it
            let mut space = ship.free_cargo();
            if space == 0 {
                o_info!(
                    "📦 [{}] Cargo full ({}/{}) mid-cycle - selling first",
                    ship_symbol, ship.cargo.units, ship.cargo.capacity
                );
                ship = sell_existing_cargo(api, state, ship, coords).await?;
                space = ship.free_cargo();
                if space == 0 {
                    o_error!("❌ [{}] Still full after selling - breaking", ship_symbol);
                    break;
                }
            }
            let dest_prices = state.market_store.get_prices(&best.destination);
            if let Some(dest_good) = dest_prices.iter().find(|p| p.trade_symbol == best.good) {
                let cap = safe_sell_volume(
                    &dest_good.supply,
                    dest_good.activity.as_deref(),
                    dest_good.trade_volume,
                    space,
                );
                if cap < space {
                    o_info!(
                        "📉 [{}] Volume cap: {} at {} is {} supply - buying {} not {}",
                        ship_symbol, best.good, best.destination, dest_good.supply, cap, space
                    );
                    space = cap;
                }
            }

            let (units_bought, total_cost) = buy_cargo(
                api, state, ship_symbol, &best.good, space, best.trade_volume, &best.source, "trade",
            )
            .await;
            if units_bought == 0 {
                failed_routes.insert(
                    (best.good.clone(), best.source.clone(), best.destination.clone()),
                    Instant::now(),
                );
                o_info!(
                    "🚫 [{}] Couldn't buy any {} at {} - route blacklisted ({} total)",
                    ship_symbol, best.good, best.source, failed_routes.len()
                );
                continue;
            }

            // 3. Fly to destination and sell at its live trade volume
            ship = api.get_ship(ship_symbol).await?;
            ship = navigate_with_refuel_stops(api, ship, &best.destination, coords, fuel_waypoints).await?;
            if ship.nav.status != NavStatus::Docked {
                api.dock(ship_symbol).await?;
            }
            let dest_goods = refresh_market(api, &best.destination, &state.market_store).await?;
            let dest_volume = dest_goods
                .iter()
                .find(|g| g.symbol == best.good)
                .map(|g| g.trade_volume)
                .unwrap_or(best.trade_volume);
            let (units_sold, total_revenue) = sell_cargo(
                api, state, ship_symbol, &best.good, units_bought, dest_volume,
                &best.destination, "trade",
            )
            .await;
            cycle_successes += 1;

            let trip_profit = total_revenue - total_cost;
            cycle_trips.push((best.good.clone(), trip_profit));
            o_info!(
                "💹 [{}] Trip P&L: bought {} for {}, sold {} for {} → {:+} credits (estimated {:+})",
                ship_symbol, units_bought, total_cost, units_sold, total_revenue,
                trip_profit, best.net_profit
            );

            let agent_now = api.get_agent().await?;
            state.emit(FleetEvent::with_data(
                EventType::TradeCompleted,
                ship_symbol,
                json!({ "good": best.good, "profit": trip_profit, "credits": agent_now.credits }),
            ));

            // 4. Refuel before the next leg
            ship = api.get_ship(ship_symbol).await?;
            ship = try_refuel(api, ship).await?;
            o_info!(
                "💰 [{}] Balance: {} ({:+} session) | Fuel: {}/{}",
                ship_symbol,
                agent_now.credits,
                agent_now.credits - session_start_credits,
                ship.fuel.current,
                ship.fuel.capacity
            );
        }

        let agent_end = api.get_agent().await?;
        let cycle_profit = agent_end.credits - cycle_start_credits;
        o_summary!(
            "📈 [{}] CYCLE {} COMPLETE - {:+} credits this cycle | {:+} session | {} trades",
            ship_symbol, cycle, cycle_profit,
            agent_end.credits - session_start_credits, cycle_successes
        );
        if !cycle_trips.is_empty() {
            o_info!(
                "  [{}] Trades: {}",
                ship_symbol,
                cycle_trips
                    .iter()
                    .map(|(good, profit)| format!("{} {:+}", good, profit))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        if cycle_successes == 0 {
            dry_streak += 1;
            let backoff = BACKOFF_SCHEDULE[(dry_streak as usize - 1).min(BACKOFF_SCHEDULE.len() - 1)];
            o_info!(
                "🏜️ [{}] Dry cycle {} - sleeping {} min",
                ship_symbol,
                dry_streak,
                backoff / 60
            );
            state.emit(FleetEvent::with_data(
                EventType::TradeDry,
                ship_symbol,
                json!({ "dry_streak": dry_streak }),
            ));
            state.shutdown.sleep(Duration::from_secs(backoff)).await;
        } else {
            dry_streak = 0;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MarketStore;

    #[test]
    fn safe_sell_volume_by_supply_and_activity() {
        assert_eq!(safe_sell_volume("LIMITED", Some("WEAK"), 6, 40), 18);
        assert_eq!(safe_sell_volume("LIMITED", Some("STRONG"), 6, 40), 24);
        assert_eq!(safe_sell_volume("ABUNDANT", Some("STRONG"), 100, 25), 25);
        // Unknown supply defaults to the LIMITED multiplier
        assert_eq!(safe_sell_volume("MYSTERY", None, 10, 100), 30);
        assert_eq!(safe_sell_volume("SCARCE", None, 10, 100), 20);
    }

    #[test]
    fn safe_sell_volume_never_exceeds_cargo() {
        for supply in ["SCARCE", "LIMITED", "MODERATE", "HIGH", "ABUNDANT"] {
            assert!(safe_sell_volume(supply, Some("STRONG"), 100, 40) <= 40);
        }
    }

    fn good(symbol: &str, trade_type: &str, buy: i32, sell: i32, volume: i32) -> MarketTradeGood {
        MarketTradeGood {
            symbol: symbol.to_string(),
            trade_type: trade_type.to_string(),
            trade_volume: volume,
            supply: "LIMITED".to_string(),
            activity: Some("WEAK".to_string()),
            purchase_price: buy,
            sell_price: sell,
        }
    }

    fn seeded_store() -> MarketStore {
        let store = MarketStore::in_memory();
        // K89 exports CLOTHING and FOOD
        store.update_market(
            "X1-AB12-K89",
            &[
                good("CLOTHING", "EXPORT", 3182, 1537, 20),
                good("FOOD", "EXPORT", 1438, 694, 60),
            ],
            None,
        );
        // A1 imports both
        store.update_market(
            "X1-AB12-A1",
            &[
                good("CLOTHING", "IMPORT", 9884, 4790, 20),
                good("FOOD", "IMPORT", 4294, 2060, 60),
            ],
            None,
        );
        // H58 exports IRON that nobody imports
        store.update_market("X1-AB12-H58", &[good("IRON", "EXPORT", 83, 40, 60)], None);
        store
    }

    fn test_coords() -> HashMap<String, (i32, i32)> {
        [
            ("X1-AB12-A1".to_string(), (0, 0)),
            ("X1-AB12-K89".to_string(), (60, 70)),
            ("X1-AB12-H58".to_string(), (30, 35)),
        ]
        .into_iter()
        .collect()
    }

    fn routes_from(
        store: &MarketStore,
        location: &str,
        excluded: &[(String, String, String)],
        credits: Option<i64>,
    ) -> Vec<TradeRoute> {
        find_best_routes(
            store,
            &test_coords(),
            location,
            40,
            300,
            excluded,
            credits,
            36,
            None,
            &HashSet::new(),
        )
    }

    #[test]
    fn finds_profitable_export_import_pairs() {
        let store = seeded_store();
        let routes = routes_from(&store, "X1-AB12-A1", &[], None);

        let clothing = routes.iter().find(|r| r.good == "CLOTHING").unwrap();
        assert_eq!(clothing.source, "X1-AB12-K89");
        assert_eq!(clothing.destination, "X1-AB12-A1");
        assert_eq!(clothing.profit_per_unit, 4790 - 3182);
        assert!(routes.iter().any(|r| r.good == "FOOD"));
        assert!(!routes.iter().any(|r| r.good == "IRON"));
    }

    #[test]
    fn net_profit_subtracts_all_fuel() {
        let store = seeded_store();
        let routes = routes_from(&store, "X1-AB12-A1", &[], None);
        for route in &routes {
            let safe_units = safe_sell_volume(&route.dest_supply, Some("WEAK"), route.dest_trade_volume, 40);
            let gross = route.profit_per_unit as i64 * safe_units as i64;
            assert_eq!(
                route.net_profit,
                gross - route.deadhead_fuel_credits - route.leg_fuel_credits,
                "{} net mismatch",
                route.good
            );
        }
    }

    #[test]
    fn ranked_by_profit_per_minute() {
        let store = seeded_store();
        let routes = routes_from(&store, "X1-AB12-A1", &[], None);
        assert!(routes.len() >= 2);
        for pair in routes.windows(2) {
            assert!(pair[0].profit_per_minute >= pair[1].profit_per_minute);
        }
    }

    #[test]
    fn claimed_routes_are_excluded() {
        let store = seeded_store();
        let claimed = vec![(
            "CLOTHING".to_string(),
            "X1-AB12-K89".to_string(),
            "X1-AB12-A1".to_string(),
        )];
        let routes = routes_from(&store, "X1-AB12-A1", &claimed, None);
        assert!(!routes.iter().any(|r| r.good == "CLOTHING"));
        assert!(routes.iter().any(|r| r.good == "FOOD"));
    }

    #[test]
    fn unaffordable_batches_are_excluded() {
        let store = seeded_store();
        // One CLOTHING batch costs 3182*20 = 63640; FOOD costs 1438*60 = 86280
        let routes = routes_from(&store, "X1-AB12-A1", &[], Some(64_000));
        assert!(routes.iter().any(|r| r.good == "CLOTHING"));
        assert!(!routes.iter().any(|r| r.good == "FOOD"));

        let none = routes_from(&store, "X1-AB12-A1", &[], Some(1_000));
        assert!(none.is_empty());
    }

    #[test]
    fn deadhead_affects_scoring() {
        let store = seeded_store();
        let from_source = routes_from(&store, "X1-AB12-K89", &[], None);
        let from_dest = routes_from(&store, "X1-AB12-A1", &[], None);

        let at_source = from_source.iter().find(|r| r.good == "CLOTHING").unwrap();
        let away = from_dest.iter().find(|r| r.good == "CLOTHING").unwrap();
        assert_eq!(at_source.deadhead_fuel_credits, 0);
        assert!(away.deadhead_fuel_credits > 0);
        assert!(at_source.net_profit > away.net_profit);
    }

    #[test]
    fn out_of_range_without_fuel_stops_is_empty() {
        let store = seeded_store();
        let routes = find_best_routes(
            &store,
            &test_coords(),
            "X1-AB12-A1",
            40,
            50, // tank too small for the ~93-fuel legs
            &[],
            None,
            36,
            None,
            &HashSet::new(),
        );
        assert!(routes.is_empty());
    }

    #[test]
    fn empty_store_yields_no_routes() {
        let store = MarketStore::in_memory();
        assert!(routes_from(&store, "X1-AB12-A1", &[], None).is_empty());
    }
}
