// Jump gate construction supply mission.
//
// Hauls whichever still-needed material is cheapest (per the cached
// prices) from its source market to the gate until construction is
// complete. Never spends the balance below the capital floor.
use crate::client::ApiClient;
use crate::fleet::events::{EventType, FleetEvent};
use crate::fleet::registry::MissionParams;
use crate::fleet::state::{FleetState, load_system_intel};
use crate::missions::MissionError;
use crate::missions::navigation::{navigate_with_refuel_stops, try_refuel, wait_for_arrival};
use crate::missions::router::build_fuel_waypoints;
use crate::models::{Construction, NavStatus};
use crate::{o_error, o_info, o_summary};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Duration;

/// Default minimum balance to preserve while buying materials.
const DEFAULT_CAPITAL_FLOOR: i64 = 300_000;

/// Wait between re-checks when below the floor or out of price data.
const CAPITAL_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// GATE_BUILD mission entry point.
pub async fn gate_build_mission(
    api: Arc<ApiClient>,
    ship_symbol: String,
    state: Arc<FleetState>,
    params: MissionParams,
) -> Result<(), MissionError> {
    let capital_floor = params.capital_floor.unwrap_or(DEFAULT_CAPITAL_FLOOR);

    let ship = wait_for_arrival(&api, &ship_symbol).await?;
    let system = ship.nav.system_symbol.clone();
    let system_state = load_system_intel(&api, &system, &state).await?;
    let coords = system_state.coords.clone();
    let fuel_waypoints = build_fuel_waypoints(&system_state.waypoints);

    let Some(gate) = system_state.gate_under_construction() else {
        return Err(MissionError::other(format!(
            "no jump gate under construction in {}",
            system
        )));
    };
    let gate_waypoint = gate.symbol.clone();

    o_summary!(
        "🏗️ [{}] GATE_BUILD mission started: {} (capital floor {})",
        ship_symbol, gate_waypoint, capital_floor
    );

    let mut total_delivered: HashMap<String, i32> = HashMap::new();
    let mut total_spent: i64 = 0;
    let mut trips: u32 = 0;

    while !state.shutdown.is_set() {
        // --- Restart recovery: deliver whatever is already on board ---
        let mut ship = api.get_ship(&ship_symbol).await?;
        if ship.cargo.units > 0 && ship.nav.waypoint_symbol == gate_waypoint {
            if ship.nav.status != NavStatus::Docked {
                api.dock(&ship_symbol).await?;
            }
            let needed = api.get_construction(&system, &gate_waypoint).await?;
            let wanted: Vec<String> = needed
                .unmet_materials()
                .iter()
                .map(|m| m.trade_symbol.clone())
                .collect();
            for item in ship.cargo.inventory.clone() {
                if !wanted.iter().any(|w| w == &item.symbol) {
                    continue;
                }
                match api
                    .supply_construction(&system, &gate_waypoint, &ship_symbol, &item.symbol, item.units)
                    .await
                {
                    Ok(supply) => {
                        o_info!(
                            "🏗️ [{}] Delivered {} {} (restart recovery)",
                            ship_symbol, item.units, item.symbol
                        );
                        *total_delivered.entry(item.symbol.clone()).or_insert(0) += item.units;
                        emit_delivery(&state, &ship_symbol, &supply.construction, &item.symbol, item.units);
                        if supply.construction.is_complete {
                            o_summary!("🎉 [{}] JUMP GATE CONSTRUCTION COMPLETE!", ship_symbol);
                            state.emit(FleetEvent::new(EventType::GateComplete, &ship_symbol));
                            return Ok(());
                        }
                    }
                    Err(e) => o_error!("❌ [{}] Supply failed ({}): {}", ship_symbol, e.code, e),
                }
            }
        }

        // --- Refuel before any planning ---
        ship = api.get_ship(&ship_symbol).await?;
        if ship.nav.status != NavStatus::Docked {
            ship.nav = api.dock(&ship_symbol).await?;
        }
        ship = try_refuel(&api, ship).await?;

        // --- Check construction progress ---
        let construction = api.get_construction(&system, &gate_waypoint).await?;
        if construction.is_complete || construction.unmet_materials().is_empty() {
            o_summary!("🎉 [{}] JUMP GATE CONSTRUCTION COMPLETE!", ship_symbol);
            state.emit(FleetEvent::new(EventType::GateComplete, &ship_symbol));
            return Ok(());
        }
        for material in construction.unmet_materials() {
            o_info!(
                "🏗️ [{}]   {}: {}/{} delivered ({} remaining)",
                ship_symbol, material.trade_symbol, material.fulfilled,
                material.required, material.remaining()
            );
        }

        // --- Hold while the balance is below the floor ---
        let mut agent_info = api.get_agent().await?;
        while agent_info.credits < capital_floor && !state.shutdown.is_set() {
            o_info!(
                "💸 [{}] Balance {} below {} floor. Waiting 60s...",
                ship_symbol, agent_info.credits, capital_floor
            );
            state.emit(FleetEvent::with_data(
                EventType::CapitalLow,
                &ship_symbol,
                json!({ "credits": agent_info.credits }),
            ));
            state.shutdown.sleep(CAPITAL_CHECK_INTERVAL).await;
            agent_info = api.get_agent().await?;
        }
        if state.shutdown.is_set() {
            break;
        }

        // --- Pick the cheapest still-needed material with a cached price ---
        let mut target: Option<(String, i32, String, i32)> = None; // (material, remaining, source, price)
        for material in construction.unmet_materials() {
            let Some(best) = state
                .market_store
                .find_best_buy(&material.trade_symbol, Some(&system))
            else {
                continue;
            };
            o_info!(
                "🏗️ [{}]   {} at {}: {}/unit",
                ship_symbol, material.trade_symbol, best.waypoint_symbol, best.purchase_price
            );
            let cheaper = target.as_ref().is_none_or(|(_, _, _, price)| best.purchase_price < *price);
            if cheaper {
                target = Some((
                    material.trade_symbol.clone(),
                    material.remaining(),
                    best.waypoint_symbol.clone(),
                    best.purchase_price,
                ));
            }
        }
        let Some((material, remaining, source, cached_price)) = target else {
            o_info!(
                "⚠️ [{}] No cached prices for any needed material. Retrying in 60s.",
                ship_symbol
            );
            state.shutdown.sleep(CAPITAL_CHECK_INTERVAL).await;
            continue;
        };

        trips += 1;
        o_info!(
            "### [{}] TRIP {}: {} - up to {} units from {} → {} (@ ~{}/unit) ###",
            ship_symbol, trips, material, remaining.min(ship.free_cargo()), source,
            gate_waypoint, cached_price
        );

        // --- Fly to the source and refresh the price live ---
        ship = navigate_with_refuel_stops(&api, ship, &source, &coords, &fuel_waypoints).await?;
        if ship.nav.status != NavStatus::Docked {
            ship.nav = api.dock(&ship_symbol).await?;
        }
        ship = try_refuel(&api, ship).await?;

        let mut trade_volume = 20;
        let mut live_price = cached_price;
        if let Ok(market) = api.get_market(&system, &source).await {
            if let Some(goods) = market.trade_goods {
                state.market_store.update_market(&source, &goods, Some(&system));
                if let Some(good) = goods.iter().find(|g| g.symbol == material) {
                    trade_volume = good.trade_volume;
                    live_price = good.purchase_price;
                }
            }
        }

        // --- Size the load so the floor survives the purchase ---
        agent_info = api.get_agent().await?;
        let affordable = if live_price > 0 {
            ((agent_info.credits - capital_floor) / live_price as i64).max(0) as i32
        } else {
            0
        };
        let load = ship.free_cargo().min(remaining).min(affordable);
        if load <= 0 {
            o_info!(
                "💸 [{}] Can't afford any {} above the capital floor. Waiting...",
                ship_symbol, material
            );
            state.shutdown.sleep(CAPITAL_CHECK_INTERVAL).await;
            continue;
        }

        let (bought, cost) =
            buy_materials(&api, &state, &ship_symbol, &material, load, trade_volume, capital_floor, &source).await;
        if bought == 0 {
            o_info!("⚠️ [{}] Couldn't buy any {}. Retrying next trip.", ship_symbol, material);
            continue;
        }
        total_spent += cost;

        // --- Haul to the gate and supply ---
        ship = api.get_ship(&ship_symbol).await?;
        ship = navigate_with_refuel_stops(&api, ship, &gate_waypoint, &coords, &fuel_waypoints).await?;
        if ship.nav.status != NavStatus::Docked {
            ship.nav = api.dock(&ship_symbol).await?;
        }

        match api
            .supply_construction(&system, &gate_waypoint, &ship_symbol, &material, bought)
            .await
        {
            Ok(supply) => {
                if let Some(progress) = supply
                    .construction
                    .materials
                    .iter()
                    .find(|m| m.trade_symbol == material)
                {
                    o_info!(
                        "🏗️ [{}] Delivered {} {}! Progress: {}/{}",
                        ship_symbol, bought, material, progress.fulfilled, progress.required
                    );
                }
                *total_delivered.entry(material.clone()).or_insert(0) += bought;
                emit_delivery(&state, &ship_symbol, &supply.construction, &material, bought);
                if supply.construction.is_complete {
                    o_summary!("🎉 [{}] JUMP GATE CONSTRUCTION COMPLETE!", ship_symbol);
                    state.emit(FleetEvent::new(EventType::GateComplete, &ship_symbol));
                    return Ok(());
                }
            }
            Err(e) => o_error!("❌ [{}] Supply failed ({}): {}", ship_symbol, e.code, e),
        }

        // --- Refuel at the gate and report the trip ---
        ship = try_refuel(&api, ship).await?;
        let _ = ship;
        agent_info = api.get_agent().await?;
        o_summary!(
            "🏗️ [{}] Trip {} complete. Spent: {} | Balance: {} | Delivered: {}",
            ship_symbol,
            trips,
            cost,
            agent_info.credits,
            total_delivered
                .iter()
                .filter(|(_, units)| **units > 0)
                .map(|(material, units)| format!("{} {}", units, material))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    o_summary!(
        "🏗️ [{}] GATE_BUILD mission stopped - {} trips, {} spent",
        ship_symbol, trips, total_spent
    );
    Ok(())
}

fn emit_delivery(
    state: &FleetState,
    ship_symbol: &str,
    construction: &Construction,
    material: &str,
    units: i32,
) {
    let remaining = construction
        .materials
        .iter()
        .find(|m| m.trade_symbol == material)
        .map(|m| m.remaining())
        .unwrap_or(0);
    state.emit(FleetEvent::with_data(
        EventType::GateDelivery,
        ship_symbol,
        json!({ "material": material, "units": units, "remaining": remaining }),
    ));
}

/// Buy in trade-volume batches, re-checking the balance before each batch
/// so a commanded purchase never drops the balance below the floor.
#[allow(clippy::too_many_arguments)]
async fn buy_materials(
    api: &ApiClient,
    state: &FleetState,
    ship_symbol: &str,
    material: &str,
    target_units: i32,
    trade_volume: i32,
    capital_floor: i64,
    waypoint: &str,
) -> (i32, i64) {
    let mut bought = 0;
    let mut cost: i64 = 0;
    while bought < target_units {
        let batch = trade_volume.min(target_units - bought);
        let average_price = if bought > 0 { cost / bought as i64 } else { 0 };
        if average_price > 0 {
            let agent_info = match api.get_agent().await {
                Ok(agent_info) => agent_info,
                Err(e) => {
                    o_error!("⚠️ [{}] Balance check failed: {}", ship_symbol, e);
                    break;
                }
            };
            if agent_info.credits - batch as i64 * average_price < capital_floor {
                o_info!(
                    "💸 [{}] Next batch would breach the {} floor. Stopping at {}.",
                    ship_symbol, capital_floor, bought
                );
                break;
            }
        }
        match api.purchase_cargo(ship_symbol, material, batch).await {
            Ok(trade) => {
                bought += trade.transaction.units;
                cost += trade.transaction.total_price;
                o_info!(
                    "  💳 [{}] Bought {} {} @ {}/unit ({}/{}). Balance: {}",
                    ship_symbol, trade.transaction.units, material,
                    trade.transaction.price_per_unit, bought, target_units,
                    trade.agent.credits
                );
                if let Some(ops) = &state.ops_store {
                    ops.record_trade(
                        ship_symbol,
                        "BUY",
                        material,
                        trade.transaction.units,
                        trade.transaction.price_per_unit,
                        trade.transaction.total_price,
                        waypoint,
                        Some(trade.agent.credits),
                        "gate_build",
                    );
                }
                if trade.agent.credits < capital_floor {
                    o_info!(
                        "💸 [{}] Balance {} hit the floor - stopping purchases",
                        ship_symbol, trade.agent.credits
                    );
                    break;
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
