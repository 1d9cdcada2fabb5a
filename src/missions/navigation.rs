// Shared navigation helpers: transit waits, flight-mode handling, refueling.
use crate::client::{ApiClient, ApiError};
use crate::missions::router::{RoutePlan, estimate_fuel_one_way, plan_multihop};
use crate::models::{FlightMode, NavStatus, Ship};
use crate::{o_debug, o_error, o_info};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::time::Duration;

/// Sanity cap for in-transit waits - reject clearly bogus arrival times.
const MAX_TRANSIT_WAIT_SECS: f64 = 3600.0;
/// Max poll attempts after the initial sleep (10s each).
const TRANSIT_POLL_ATTEMPTS: u32 = 12;
/// Heartbeat log interval during long sleeps.
const HEARTBEAT_SECS: f64 = 60.0;

/// Sleep for `seconds`, logging a heartbeat every minute.
pub async fn sleep_with_heartbeat(seconds: f64, context: &str) {
    let mut elapsed = 0.0;
    while elapsed < seconds {
        let chunk = (seconds - elapsed).min(HEARTBEAT_SECS);
        tokio::time::sleep(Duration::from_secs_f64(chunk)).await;
        elapsed += chunk;
        if elapsed < seconds {
            o_info!("  ⏳ [heartbeat] {} - {:.0}/{:.0}s", context, elapsed, seconds);
        }
    }
}

/// If the ship is in transit, wait for arrival with a safety clamp and a
/// short poll window. Callers with very long legs re-enter this until the
/// status leaves IN_TRANSIT.
pub async fn wait_for_arrival(api: &ApiClient, ship_symbol: &str) -> Result<Ship, ApiError> {
    let mut ship = api.get_ship(ship_symbol).await?;
    if ship.nav.status != NavStatus::InTransit {
        return Ok(ship);
    }

    let raw_wait = (ship.nav.route.arrival - Utc::now()).num_milliseconds() as f64 / 1000.0 + 2.0;
    let wait_secs = raw_wait.clamp(0.0, MAX_TRANSIT_WAIT_SECS);
    if raw_wait > MAX_TRANSIT_WAIT_SECS {
        o_info!(
            "⚠️ [{}] Transit wait {:.0}s exceeds cap, clamping to {:.0}s",
            ship_symbol, raw_wait, MAX_TRANSIT_WAIT_SECS
        );
    }
    if wait_secs > 0.0 {
        o_info!(
            "🚀 [{}] In transit {} → {}, waiting {:.0}s ({:.1} min)",
            ship_symbol,
            ship.nav.route.origin.symbol,
            ship.nav.route.destination.symbol,
            wait_secs,
            wait_secs / 60.0
        );
        let context = format!("{} transit → {}", ship_symbol, ship.nav.route.destination.symbol);
        sleep_with_heartbeat(wait_secs, &context).await;
    }

    ship = api.get_ship(ship_symbol).await?;
    let mut polls = 0;
    while ship.nav.status == NavStatus::InTransit && polls < TRANSIT_POLL_ATTEMPTS {
        polls += 1;
        o_debug!("[{}] Still in transit, polling {}/{}...", ship_symbol, polls, TRANSIT_POLL_ATTEMPTS);
        tokio::time::sleep(Duration::from_secs(10)).await;
        ship = api.get_ship(ship_symbol).await?;
    }
    if ship.nav.status == NavStatus::InTransit {
        o_error!("⚠️ [{}] Still IN_TRANSIT after max wait + polling", ship_symbol);
    }
    Ok(ship)
}

/// Navigate to a destination, handling orbit, flight mode, and the transit
/// wait. Returns the ship as observed after arrival.
pub async fn navigate_ship(
    api: &ApiClient,
    ship: Ship,
    destination: &str,
    mode: Option<FlightMode>,
) -> Result<Ship, ApiError> {
    if ship.nav.waypoint_symbol == destination {
        o_debug!("[{}] Already at {}", ship.symbol, destination);
        return Ok(ship);
    }

    let mut ship = ship;
    if ship.nav.status == NavStatus::Docked {
        ship.nav = api.orbit(&ship.symbol).await?;
    }
    if let Some(mode) = mode {
        if ship.nav.flight_mode != mode {
            api.set_flight_mode(&ship.symbol, mode).await?;
            o_info!("[{}] Flight mode set to {}", ship.symbol, mode);
        }
    }

    let nav = api.navigate(&ship.symbol, destination).await?;
    let fuel_used = nav.fuel.consumed.as_ref().map(|c| c.amount).unwrap_or(0);
    o_info!(
        "🧭 [{}] {} → {} ({} fuel)",
        ship.symbol, nav.nav.route.origin.symbol, destination, fuel_used
    );

    ship = wait_for_arrival(api, &ship.symbol).await?;
    o_info!(
        "📍 [{}] Arrived at {}. Fuel {}/{}",
        ship.symbol, destination, ship.fuel.current, ship.fuel.capacity
    );
    Ok(ship)
}

/// Walk a multi-hop plan, refueling at every intermediate stop.
pub async fn navigate_multihop(
    api: &ApiClient,
    mut ship: Ship,
    plan: &RoutePlan,
) -> Result<Ship, ApiError> {
    if !plan.feasible || plan.segments.is_empty() {
        return Ok(ship);
    }

    for (i, segment) in plan.segments.iter().enumerate() {
        let is_last = i + 1 == plan.segments.len();
        ship = navigate_ship(api, ship, &segment.destination, Some(segment.flight_mode)).await?;
        // Long legs can exceed the transit wait cap - keep waiting
        while ship.nav.status == NavStatus::InTransit {
            ship = wait_for_arrival(api, &ship.symbol).await?;
        }
        if !is_last {
            o_info!(
                "⛽ [{}] Refuel stop {}/{}: {}",
                ship.symbol,
                i + 1,
                plan.num_stops(),
                segment.destination
            );
            if ship.nav.status != NavStatus::Docked {
                ship.nav = api.dock(&ship.symbol).await?;
            }
            ship = try_refuel(api, ship).await?;
        }
    }
    Ok(ship)
}

/// Navigate to a destination, planning refuel stops through the multi-hop
/// pathfinder when the direct leg exceeds the ship's tank.
pub async fn navigate_with_refuel_stops(
    api: &ApiClient,
    ship: Ship,
    destination: &str,
    coords: &HashMap<String, (i32, i32)>,
    fuel_waypoints: &HashSet<String>,
) -> Result<Ship, ApiError> {
    if ship.nav.waypoint_symbol == destination {
        return Ok(ship);
    }
    let needed = estimate_fuel_one_way(coords, &ship.nav.waypoint_symbol, destination);
    if needed > ship.fuel.capacity && !fuel_waypoints.is_empty() {
        let plan = plan_multihop(
            coords,
            fuel_waypoints,
            &ship.nav.waypoint_symbol,
            destination,
            ship.fuel.capacity,
            ship.engine.speed,
            FlightMode::Cruise,
        );
        if plan.feasible && plan.num_stops() > 0 {
            o_info!(
                "🛰️ [{}] Multi-hop to {} ({} stops, {} fuel)",
                ship.symbol,
                destination,
                plan.num_stops(),
                plan.total_fuel
            );
            return navigate_multihop(api, ship, &plan).await;
        }
    }
    navigate_ship(api, ship, destination, None).await
}

/// Try to refuel at the current location. A refused refuel (no fuel sold
/// here, already full) is logged, not fatal.
pub async fn try_refuel(api: &ApiClient, ship: Ship) -> Result<Ship, ApiError> {
    if ship.fuel.current >= ship.fuel.capacity {
        return Ok(ship);
    }
    let mut ship = ship;
    if ship.nav.status != NavStatus::Docked {
        ship.nav = api.dock(&ship.symbol).await?;
    }
    match api.refuel(&ship.symbol, false).await {
        Ok(refuel) => {
            o_info!(
                "⛽ [{}] Refueled {} → {}/{} ({} cr). Balance: {}",
                ship.symbol,
                ship.fuel.current,
                refuel.fuel.current,
                refuel.fuel.capacity,
                refuel.transaction.total_price,
                refuel.agent.credits
            );
            ship = api.get_ship(&ship.symbol).await?;
            Ok(ship)
        }
        Err(e) => {
            o_info!(
                "⚠️ [{}] Refuel failed ({}): {}. Fuel: {}/{}",
                ship.symbol, e.code, e, ship.fuel.current, ship.fuel.capacity
            );
            api.get_ship(&ship.symbol).await
        }
    }
}
