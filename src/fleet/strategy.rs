// Fleet strategy - pure decision engine for ship assignment.
//
// No I/O, no async. World state in, FleetPlan out. The commander calls this
// on startup and after every strategic event. Priority order:
// gate building > contracts > trading > idle.
use crate::config::CapitalConfig;
use crate::fleet::registry::{MissionKind, MissionParams};
use crate::models::Ship;
use crate::{o_debug, o_info};
use std::collections::{HashMap, HashSet};

/// Thresholds that gate capital-intensive decisions.
#[derive(Debug, Clone, Copy)]
pub struct CapitalPolicy {
    pub gate_floor: i64,
    pub trade_min: i64,
    pub idle_threshold: i64,
}

impl Default for CapitalPolicy {
    fn default() -> Self {
        Self { gate_floor: 300_000, trade_min: 50_000, idle_threshold: 30_000 }
    }
}

impl From<&CapitalConfig> for CapitalPolicy {
    fn from(config: &CapitalConfig) -> Self {
        Self {
            gate_floor: config.gate_floor,
            trade_min: config.trade_min,
            idle_threshold: config.idle_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShipCategory {
    Probe,
    Ship,
    Sentinel,
    Disabled,
}

/// Derive the strategy category from ship data. Sentinels (mining drones,
/// surveyors) are managed by external tooling, never by the commander.
pub fn categorize(ship: &Ship, disabled_ships: &[String]) -> ShipCategory {
    if disabled_ships.iter().any(|s| s == &ship.symbol) {
        return ShipCategory::Disabled;
    }
    if ship.registration.role == "SATELLITE" || ship.frame.symbol.contains("PROBE") {
        return ShipCategory::Probe;
    }
    let has_sentinel_mount = ship.mounts.iter().any(|mount| {
        mount.symbol.contains("MINING_LASER")
            || mount.symbol.contains("GAS_SIPHON")
            || mount.symbol.contains("SURVEYOR")
    });
    if has_sentinel_mount || ship.frame.symbol.contains("DRONE") {
        return ShipCategory::Sentinel;
    }
    ShipCategory::Ship
}

/// Simplified ship info for strategy decisions.
#[derive(Debug, Clone)]
pub struct ShipCapability {
    pub symbol: String,
    pub cargo_capacity: i32,
    pub fuel_capacity: i32,
    pub category: ShipCategory,
    pub current_mission: MissionKind,
}

/// A mission assignment for a single ship.
#[derive(Debug, Clone, PartialEq)]
pub struct ShipAssignment {
    pub mission: MissionKind,
    pub params: MissionParams,
}

impl ShipAssignment {
    fn idle() -> Self {
        Self { mission: MissionKind::Idle, params: MissionParams::default() }
    }

    fn plain(mission: MissionKind) -> Self {
        Self { mission, params: MissionParams::default() }
    }
}

/// The output of strategy evaluation - one assignment per known ship.
#[derive(Debug, Default, Clone)]
pub struct FleetPlan {
    pub assignments: HashMap<String, ShipAssignment>,
}

impl FleetPlan {
    /// Ships whose mission differs from what they are doing now.
    pub fn changes_from(
        &self,
        current: &HashMap<String, MissionKind>,
    ) -> Vec<(String, MissionKind, ShipAssignment)> {
        let mut changes: Vec<(String, MissionKind, ShipAssignment)> = self
            .assignments
            .iter()
            .filter_map(|(symbol, assignment)| {
                let old = current.get(symbol).copied().unwrap_or(MissionKind::Idle);
                (assignment.mission != old).then(|| (symbol.clone(), old, assignment.clone()))
            })
            .collect();
        changes.sort_by(|a, b| a.0.cmp(&b.0));
        changes
    }
}

/// World state inputs for one evaluation.
#[derive(Debug)]
pub struct StrategyInputs<'a> {
    pub credits: i64,
    pub ships: &'a [ShipCapability],
    pub current_assignments: &'a HashMap<String, MissionKind>,
    pub has_active_contract: bool,
    pub contract_profitable: bool,
    pub gate_needs_supplies: bool,
    pub market_routes_available: bool,
    pub skip_ships: &'a HashSet<String>,
    pub overrides: &'a HashMap<String, String>,
}

pub struct FleetStrategy {
    capital: CapitalPolicy,
    max_contract_ships: usize,
}

impl FleetStrategy {
    pub fn new(capital: CapitalPolicy, max_contract_ships: usize) -> Self {
        Self { capital, max_contract_ships }
    }

    /// Decide what each ship should do. Deterministic, no side effects.
    pub fn evaluate(&self, inputs: &StrategyInputs<'_>) -> FleetPlan {
        let mut plan = FleetPlan::default();
        let mut probes: Vec<&ShipCapability> = Vec::new();
        let mut cargo_ships: Vec<&ShipCapability> = Vec::new();

        for ship in inputs.ships {
            if inputs.skip_ships.contains(&ship.symbol) {
                plan.assignments.insert(ship.symbol.clone(), ShipAssignment::idle());
                continue;
            }

            // Manual override takes absolute priority
            if let Some(raw) = inputs.overrides.get(&ship.symbol) {
                let mission = MissionKind::parse(raw).unwrap_or(MissionKind::Idle);
                plan.assignments.insert(ship.symbol.clone(), ShipAssignment::plain(mission));
                continue;
            }

            match ship.category {
                ShipCategory::Disabled | ShipCategory::Sentinel => {
                    plan.assignments.insert(ship.symbol.clone(), ShipAssignment::idle());
                }
                ShipCategory::Probe => probes.push(ship),
                ShipCategory::Ship => cargo_ships.push(ship),
            }
        }

        // Probes always scan
        for probe in probes {
            plan.assignments
                .insert(probe.symbol.clone(), ShipAssignment::plain(MissionKind::Scan));
        }

        // Critically low credits: park every cargo ship
        if inputs.credits < self.capital.idle_threshold {
            o_info!(
                "💸 Credits {} below idle threshold {} - parking all cargo ships",
                inputs.credits, self.capital.idle_threshold
            );
            for ship in cargo_ships {
                plan.assignments.insert(ship.symbol.clone(), ShipAssignment::idle());
            }
            return plan;
        }

        // Biggest haulers get the most capital-efficient work
        cargo_ships.sort_by(|a, b| b.cargo_capacity.cmp(&a.cargo_capacity));
        let mut unassigned: Vec<&ShipCapability> = cargo_ships;

        // 1. Gate building - the largest hauler
        if inputs.gate_needs_supplies
            && inputs.credits >= self.capital.gate_floor
            && !unassigned.is_empty()
        {
            let gate_ship = unassigned.remove(0);
            o_debug!(
                "🧭 Strategy: {} -> gate_build (largest cargo: {})",
                gate_ship.symbol, gate_ship.cargo_capacity
            );
            plan.assignments.insert(
                gate_ship.symbol.clone(),
                ShipAssignment {
                    mission: MissionKind::GateBuild,
                    params: MissionParams {
                        capital_floor: Some(self.capital.gate_floor),
                        ..MissionParams::default()
                    },
                },
            );
        }

        // 2. Contracts - a couple of ships while it pays
        if inputs.has_active_contract && inputs.contract_profitable {
            for _ in 0..self.max_contract_ships.min(unassigned.len()) {
                let ship = unassigned.remove(0);
                o_debug!("🧭 Strategy: {} -> contract", ship.symbol);
                plan.assignments
                    .insert(ship.symbol.clone(), ShipAssignment::plain(MissionKind::Contract));
            }
        }

        // 3. Trading - everything left, if routes exist and capital allows
        if inputs.market_routes_available && inputs.credits >= self.capital.trade_min {
            for ship in unassigned.drain(..) {
                o_debug!("🧭 Strategy: {} -> trade", ship.symbol);
                plan.assignments
                    .insert(ship.symbol.clone(), ShipAssignment::plain(MissionKind::Trade));
            }
        } else if !unassigned.is_empty() {
            let reason = if inputs.credits < self.capital.trade_min {
                "low credits"
            } else {
                "no routes"
            };
            o_info!("🧭 Strategy: parking {} ships ({})", unassigned.len(), reason);
        }

        // 4. Idle - anything left over
        for ship in unassigned {
            plan.assignments.insert(ship.symbol.clone(), ShipAssignment::idle());
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability(symbol: &str, cargo: i32, category: ShipCategory) -> ShipCapability {
        ShipCapability {
            symbol: symbol.to_string(),
            cargo_capacity: cargo,
            fuel_capacity: 400,
            category,
            current_mission: MissionKind::Idle,
        }
    }

    fn strategy() -> FleetStrategy {
        FleetStrategy::new(CapitalPolicy::default(), 2)
    }

    fn evaluate(
        strategy: &FleetStrategy,
        credits: i64,
        ships: &[ShipCapability],
        has_contract: bool,
        gate_needs: bool,
        routes: bool,
    ) -> FleetPlan {
        let current = HashMap::new();
        let skip = HashSet::new();
        let overrides = HashMap::new();
        strategy.evaluate(&StrategyInputs {
            credits,
            ships,
            current_assignments: &current,
            has_active_contract: has_contract,
            contract_profitable: has_contract,
            gate_needs_supplies: gate_needs,
            market_routes_available: routes,
            skip_ships: &skip,
            overrides: &overrides,
        })
    }

    #[test]
    fn assigns_trade_to_cargo_and_scan_to_probes() {
        let ships = vec![
            capability("S-1", 80, ShipCategory::Ship),
            capability("S-2", 40, ShipCategory::Ship),
            capability("P-1", 0, ShipCategory::Probe),
        ];
        let plan = evaluate(&strategy(), 250_000, &ships, false, false, true);

        assert_eq!(plan.assignments["S-1"].mission, MissionKind::Trade);
        assert_eq!(plan.assignments["S-2"].mission, MissionKind::Trade);
        assert_eq!(plan.assignments["P-1"].mission, MissionKind::Scan);
        assert_eq!(plan.assignments.len(), 3);
    }

    #[test]
    fn gate_build_goes_to_biggest_hauler() {
        let ships = vec![
            capability("S-1", 40, ShipCategory::Ship),
            capability("S-2", 80, ShipCategory::Ship),
            capability("S-3", 80, ShipCategory::Ship),
        ];
        let plan = evaluate(&strategy(), 500_000, &ships, true, true, true);

        // First 80-cargo ship by stable sort gets the gate
        assert_eq!(plan.assignments["S-2"].mission, MissionKind::GateBuild);
        assert_eq!(plan.assignments["S-2"].params.capital_floor, Some(300_000));
        // Up to two more get the contract, the rest trade
        assert_eq!(plan.assignments["S-3"].mission, MissionKind::Contract);
        assert_eq!(plan.assignments["S-1"].mission, MissionKind::Contract);
        assert!(plan.assignments.values().all(|a| a.mission != MissionKind::Idle));
    }

    #[test]
    fn credits_floor_parks_cargo_ships_but_not_probes() {
        let ships = vec![
            capability("S-1", 80, ShipCategory::Ship),
            capability("S-2", 40, ShipCategory::Ship),
            capability("P-1", 0, ShipCategory::Probe),
        ];
        let plan = evaluate(&strategy(), 10_000, &ships, true, true, true);

        assert_eq!(plan.assignments["S-1"].mission, MissionKind::Idle);
        assert_eq!(plan.assignments["S-2"].mission, MissionKind::Idle);
        assert_eq!(plan.assignments["P-1"].mission, MissionKind::Scan);
    }

    #[test]
    fn no_routes_means_idle_cargo() {
        let ships = vec![capability("S-1", 80, ShipCategory::Ship)];
        let plan = evaluate(&strategy(), 250_000, &ships, false, false, false);
        assert_eq!(plan.assignments["S-1"].mission, MissionKind::Idle);
    }

    #[test]
    fn low_credits_blocks_gate_build() {
        let ships = vec![capability("S-1", 80, ShipCategory::Ship)];
        let plan = evaluate(&strategy(), 100_000, &ships, false, true, true);
        assert_eq!(plan.assignments["S-1"].mission, MissionKind::Trade);
    }

    #[test]
    fn overrides_and_skips_win() {
        let ships = vec![
            capability("S-1", 80, ShipCategory::Ship),
            capability("S-2", 40, ShipCategory::Ship),
            capability("S-3", 40, ShipCategory::Sentinel),
        ];
        let current = HashMap::new();
        let skip: HashSet<String> = ["S-2".to_string()].into_iter().collect();
        let overrides: HashMap<String, String> =
            [("S-1".to_string(), "scan".to_string())].into_iter().collect();
        let plan = strategy().evaluate(&StrategyInputs {
            credits: 250_000,
            ships: &ships,
            current_assignments: &current,
            has_active_contract: false,
            contract_profitable: false,
            gate_needs_supplies: false,
            market_routes_available: true,
            skip_ships: &skip,
            overrides: &overrides,
        });

        assert_eq!(plan.assignments["S-1"].mission, MissionKind::Scan);
        assert_eq!(plan.assignments["S-2"].mission, MissionKind::Idle);
        assert_eq!(plan.assignments["S-3"].mission, MissionKind::Idle);
    }

    #[test]
    fn bad_override_string_parks_the_ship() {
        let ships = vec![capability("S-1", 80, ShipCategory::Ship)];
        let current = HashMap::new();
        let skip = HashSet::new();
        let overrides: HashMap<String, String> =
            [("S-1".to_string(), "mining".to_string())].into_iter().collect();
        let plan = strategy().evaluate(&StrategyInputs {
            credits: 250_000,
            ships: &ships,
            current_assignments: &current,
            has_active_contract: false,
            contract_profitable: false,
            gate_needs_supplies: false,
            market_routes_available: true,
            skip_ships: &skip,
            overrides: &overrides,
        });
        assert_eq!(plan.assignments["S-1"].mission, MissionKind::Idle);
    }

    #[test]
    fn changes_from_reports_only_differences() {
        let ships = vec![
            capability("S-1", 80, ShipCategory::Ship),
            capability("P-1", 0, ShipCategory::Probe),
        ];
        let plan = evaluate(&strategy(), 250_000, &ships, false, false, true);

        let current: HashMap<String, MissionKind> = [
            ("S-1".to_string(), MissionKind::Trade),
            ("P-1".to_string(), MissionKind::Idle),
        ]
        .into_iter()
        .collect();

        let changes = plan.changes_from(&current);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, "P-1");
        assert_eq!(changes[0].1, MissionKind::Idle);
        assert_eq!(changes[0].2.mission, MissionKind::Scan);
    }

    #[test]
    fn plan_covers_every_input_ship() {
        let ships = vec![
            capability("S-1", 80, ShipCategory::Ship),
            capability("S-2", 40, ShipCategory::Ship),
            capability("S-3", 15, ShipCategory::Sentinel),
            capability("P-1", 0, ShipCategory::Probe),
            capability("D-1", 40, ShipCategory::Disabled),
        ];
        let plan = evaluate(&strategy(), 500_000, &ships, true, true, true);
        for ship in &ships {
            assert!(plan.assignments.contains_key(&ship.symbol), "{} missing", ship.symbol);
        }
    }
}
