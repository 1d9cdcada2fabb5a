// Fuel-aware route planning: distances, fuel costs, travel times, and the
// multi-hop refueling pathfinder.
use crate::models::{FlightMode, Ship, Waypoint};
use std::collections::{HashMap, HashSet};

/// Fraction of fuel capacity withheld from direct route planning so ships
/// never strand themselves. The multi-hop planner takes an explicit
/// capacity instead.
pub const FUEL_RESERVE_FRACTION: f64 = 0.20;

/// Seconds per intermediate stop (dock + refuel + orbit).
pub const REFUEL_STOP_OVERHEAD_SECS: u32 = 30;

pub fn distance(a: (i32, i32), b: (i32, i32)) -> f64 {
    let dx = (b.0 - a.0) as f64;
    let dy = (b.1 - a.1) as f64;
    (dx * dx + dy * dy).sqrt()
}

pub fn waypoint_distance(a: &Waypoint, b: &Waypoint) -> f64 {
    distance((a.x, a.y), (b.x, b.y))
}

/// Distance between two waypoints by symbol, or None if either is unknown.
pub fn coord_distance(coords: &HashMap<String, (i32, i32)>, a: &str, b: &str) -> Option<f64> {
    if a == b {
        return Some(0.0);
    }
    let &from = coords.get(a)?;
    let &to = coords.get(b)?;
    Some(distance(from, to))
}

/// One-way CRUISE fuel: ceil(distance), 0 when already there, 9999 when a
/// coordinate is unknown (treated as unreachable by the planners).
pub fn estimate_fuel_one_way(
    coords: &HashMap<String, (i32, i32)>,
    origin: &str,
    destination: &str,
) -> i32 {
    if origin == destination {
        return 0;
    }
    match coord_distance(coords, origin, destination) {
        Some(d) if d == 0.0 => 0,
        Some(d) => (d.ceil() as i32).max(1),
        None => 9999,
    }
}

/// Fuel consumed for a leg: CRUISE burns ceil(distance), DRIFT always 1,
/// BURN twice CRUISE.
pub fn fuel_cost(dist: f64, mode: FlightMode) -> i32 {
    let d = (dist.ceil() as i32).max(1);
    match mode {
        FlightMode::Drift => 1,
        FlightMode::Burn => d * 2,
        FlightMode::Cruise | FlightMode::Stealth => d,
    }
}

/// Travel time in seconds: round(15 + distance * m / speed).
pub fn travel_time(dist: f64, speed: i32, mode: FlightMode) -> u32 {
    let multiplier = match mode {
        FlightMode::Drift => 250.0,
        FlightMode::Burn => 12.5,
        FlightMode::Cruise | FlightMode::Stealth => 25.0,
    };
    (15.0 + dist * multiplier / speed.max(1) as f64).round() as u32
}

/// Fuel available after withholding the reserve.
pub fn usable_fuel(ship: &Ship) -> i32 {
    let reserve = (ship.fuel.capacity as f64 * FUEL_RESERVE_FRACTION).ceil() as i32;
    (ship.fuel.current - reserve).max(0)
}

/// A single leg of a route.
#[derive(Debug, Clone)]
pub struct RouteSegment {
    pub origin: String,
    pub destination: String,
    pub distance: f64,
    pub flight_mode: FlightMode,
    pub fuel_cost: i32,
    pub travel_seconds: u32,
}

/// A complete route with fuel analysis.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    pub segments: Vec<RouteSegment>,
    pub total_fuel: i32,
    pub total_seconds: u32,
    pub feasible: bool,
    pub reason: String,
}

impl RoutePlan {
    fn infeasible(reason: String) -> Self {
        Self { segments: Vec::new(), total_fuel: 0, total_seconds: 0, feasible: false, reason }
    }

    /// Number of intermediate refueling stops (0 for direct routes).
    pub fn num_stops(&self) -> usize {
        if !self.feasible || self.segments.is_empty() {
            0
        } else {
            self.segments.len() - 1
        }
    }
}

/// Waypoints where a ship can refuel (markets sell FUEL).
pub fn build_fuel_waypoints(waypoints: &[Waypoint]) -> HashSet<String> {
    waypoints
        .iter()
        .filter(|wp| wp.has_trait("MARKETPLACE"))
        .map(|wp| wp.symbol.clone())
        .collect()
}

fn plan_segment(
    from: (i32, i32),
    to: (i32, i32),
    origin: &str,
    destination: &str,
    speed: i32,
    mode: FlightMode,
) -> RouteSegment {
    let dist = distance(from, to);
    RouteSegment {
        origin: origin.to_string(),
        destination: destination.to_string(),
        distance: dist,
        flight_mode: mode,
        fuel_cost: fuel_cost(dist, mode),
        travel_seconds: travel_time(dist, speed, mode),
    }
}

/// Plan a route with refueling stops via greedy forward-progress.
///
/// Starting with a full tank, while the destination is out of single-tank
/// range, hop to the unvisited fuel waypoint that strictly reduces the
/// remaining distance; none reachable means infeasible. Total time adds 30s
/// of refuel overhead per intermediate stop (not after the final leg).
pub fn plan_multihop(
    coords: &HashMap<String, (i32, i32)>,
    fuel_waypoints: &HashSet<String>,
    origin: &str,
    destination: &str,
    fuel_capacity: i32,
    speed: i32,
    mode: FlightMode,
) -> RoutePlan {
    if origin == destination {
        return RoutePlan {
            segments: Vec::new(),
            total_fuel: 0,
            total_seconds: 0,
            feasible: true,
            reason: String::new(),
        };
    }
    let (Some(&_origin_xy), Some(&dest_xy)) = (coords.get(origin), coords.get(destination)) else {
        return RoutePlan::infeasible(format!(
            "unknown coordinates for {} or {}",
            origin, destination
        ));
    };

    let mut current = origin.to_string();
    let mut segments: Vec<RouteSegment> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(origin.to_string());

    let max_hops = fuel_waypoints.len() + 1;

    for _ in 0..max_hops {
        let current_xy = coords[&current];
        let dist_to_dest = distance(current_xy, dest_xy);

        // Destination directly reachable on one tank?
        if fuel_cost(dist_to_dest, mode) <= fuel_capacity {
            segments.push(plan_segment(current_xy, dest_xy, &current, destination, speed, mode));
            let total_fuel = segments.iter().map(|s| s.fuel_cost).sum();
            let mut total_seconds: u32 = segments.iter().map(|s| s.travel_seconds).sum();
            total_seconds += (segments.len() as u32 - 1) * REFUEL_STOP_OVERHEAD_SECS;
            return RoutePlan {
                segments,
                total_fuel,
                total_seconds,
                feasible: true,
                reason: String::new(),
            };
        }

        // Reachable fuel waypoint with the most forward progress
        let mut best: Option<(&str, (i32, i32))> = None;
        let mut best_remaining = dist_to_dest;
        for wp in fuel_waypoints {
            if visited.contains(wp) {
                continue;
            }
            let Some(&wp_xy) = coords.get(wp) else {
                continue;
            };
            if fuel_cost(distance(current_xy, wp_xy), mode) > fuel_capacity {
                continue;
            }
            let remaining = distance(wp_xy, dest_xy);
            if remaining < best_remaining {
                best_remaining = remaining;
                best = Some((wp.as_str(), wp_xy));
            }
        }

        let Some((next_wp, next_xy)) = best else {
            return RoutePlan::infeasible(format!(
                "no reachable fuel waypoint makes progress from {} toward {}",
                current, destination
            ));
        };

        segments.push(plan_segment(current_xy, next_xy, &current, next_wp, speed, mode));
        visited.insert(next_wp.to_string());
        current = next_wp.to_string();
    }

    RoutePlan::infeasible(format!("exceeded max hops ({}) - route infeasible", max_hops))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(points: &[(&str, i32, i32)]) -> HashMap<String, (i32, i32)> {
        points.iter().map(|(s, x, y)| (s.to_string(), (*x, *y))).collect()
    }

    #[test]
    fn fuel_costs_by_mode() {
        assert_eq!(fuel_cost(40.0, FlightMode::Cruise), 40);
        assert_eq!(fuel_cost(40.2, FlightMode::Cruise), 41);
        assert_eq!(fuel_cost(40.0, FlightMode::Drift), 1);
        assert_eq!(fuel_cost(40.0, FlightMode::Burn), 80);
        assert_eq!(fuel_cost(0.2, FlightMode::Cruise), 1);
    }

    #[test]
    fn travel_times_by_mode() {
        // round(15 + 40 * 25 / 30) = round(48.33) = 48
        assert_eq!(travel_time(40.0, 30, FlightMode::Cruise), 48);
        assert_eq!(travel_time(40.0, 30, FlightMode::Drift), 348);
        assert_eq!(travel_time(40.0, 30, FlightMode::Burn), 32);
        assert_eq!(travel_time(10.0, 0, FlightMode::Cruise), 265);
    }

    #[test]
    fn one_way_fuel_estimates() {
        let map = coords(&[("A", 0, 0), ("B", 5, 0), ("C", 60, 70)]);
        assert_eq!(estimate_fuel_one_way(&map, "A", "A"), 0);
        assert_eq!(estimate_fuel_one_way(&map, "A", "B"), 5);
        // sqrt(60^2 + 70^2) = 92.19... -> ceil 93
        assert_eq!(estimate_fuel_one_way(&map, "A", "C"), 93);
        assert_eq!(estimate_fuel_one_way(&map, "A", "UNKNOWN"), 9999);
        assert_eq!(estimate_fuel_one_way(&map, "UNKNOWN", "A"), 9999);
    }

    #[test]
    fn trivial_route_is_empty_and_feasible() {
        let map = coords(&[("A", 0, 0)]);
        let fuel: HashSet<String> = HashSet::new();
        let plan = plan_multihop(&map, &fuel, "A", "A", 100, 30, FlightMode::Cruise);
        assert!(plan.feasible);
        assert!(plan.segments.is_empty());
        assert_eq!(plan.total_fuel, 0);
        assert_eq!(plan.total_seconds, 0);
    }

    #[test]
    fn direct_route_when_in_range() {
        let map = coords(&[("A", 0, 0), ("B", 40, 0)]);
        let fuel: HashSet<String> = HashSet::new();
        let plan = plan_multihop(&map, &fuel, "A", "B", 50, 30, FlightMode::Cruise);
        assert!(plan.feasible);
        assert_eq!(plan.segments.len(), 1);
        assert_eq!(plan.total_fuel, 40);
        assert_eq!(plan.num_stops(), 0);
        assert_eq!(plan.total_seconds, travel_time(40.0, 30, FlightMode::Cruise));
    }

    #[test]
    fn two_hop_route_through_fuel_stop() {
        let map = coords(&[("A", 0, 0), ("B", 40, 0), ("C", 80, 0)]);
        let fuel: HashSet<String> = ["B".to_string()].into_iter().collect();
        let plan = plan_multihop(&map, &fuel, "A", "C", 50, 30, FlightMode::Cruise);

        assert!(plan.feasible, "{}", plan.reason);
        assert_eq!(plan.segments.len(), 2);
        assert_eq!(plan.segments[0].destination, "B");
        assert_eq!(plan.segments[1].destination, "C");
        assert_eq!(plan.segments[0].fuel_cost, 40);
        assert_eq!(plan.segments[1].fuel_cost, 40);
        assert_eq!(plan.total_fuel, 80);
        assert_eq!(plan.num_stops(), 1);
        let leg = travel_time(40.0, 30, FlightMode::Cruise);
        assert_eq!(plan.total_seconds, leg * 2 + REFUEL_STOP_OVERHEAD_SECS);
    }

    #[test]
    fn fuel_stop_that_makes_no_progress_is_infeasible() {
        // D is reachable but farther from the destination than A is
        let map = coords(&[("A", 0, 0), ("D", -30, 0), ("C", 200, 0)]);
        let fuel: HashSet<String> = ["D".to_string()].into_iter().collect();
        let plan = plan_multihop(&map, &fuel, "A", "C", 50, 30, FlightMode::Cruise);
        assert!(!plan.feasible);
        assert!(plan.reason.contains("no reachable fuel waypoint"));
    }

    #[test]
    fn unknown_waypoint_is_infeasible() {
        let map = coords(&[("A", 0, 0)]);
        let fuel: HashSet<String> = HashSet::new();
        let plan = plan_multihop(&map, &fuel, "A", "NOWHERE", 100, 30, FlightMode::Cruise);
        assert!(!plan.feasible);
    }
}
