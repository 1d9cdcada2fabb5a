// FleetCommander - event-driven orchestrator for the entire fleet.
//
// One process, one client, one rate limiter, all ships as tokio tasks.
// The strategy engine decides assignments; events drive re-evaluation.
use crate::client::{ApiClient, ApiError, RateLimit, RequestScheduler};
use crate::config::{FleetConfig, Settings};
use crate::fleet::events::{EventType, FleetEvent};
use crate::fleet::registry::MissionKind;
use crate::fleet::ship_agent::ShipAgent;
use crate::fleet::state::{FleetState, Shutdown, load_system_intel};
use crate::fleet::strategy::{
    CapitalPolicy, FleetPlan, FleetStrategy, ShipCapability, StrategyInputs, categorize,
};
use crate::models::Ship;
use crate::storage::{MarketStore, OpsStore};
use crate::{o_error, o_info, o_summary};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use std::sync::Arc;
use tokio::time::Duration;

/// Max restarts before a ship is parked for good.
const MAX_RESTARTS: u32 = 5;

/// Backoff seconds by restart count.
const RESTART_BACKOFF: [u64; 5] = [10, 30, 60, 120, 300];

/// Event loop timeout - fallback health check interval.
const EVENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Snapshot agent credits every N event-loop cycles.
const SNAPSHOT_EVERY_N_CYCLES: u64 = 10;

/// Grace period for a cancelled task to wind down on reassignment.
const REASSIGN_GRACE: Duration = Duration::from_secs(5);

pub struct FleetCommander {
    settings: Settings,
    config: FleetConfig,
    overrides: HashMap<String, String>,
    strategy: FleetStrategy,
}

impl FleetCommander {
    pub fn new(settings: Settings, config: FleetConfig, overrides: HashMap<String, String>) -> Self {
        let strategy = FleetStrategy::new(
            CapitalPolicy::from(&config.capital),
            config.fleet.max_contract_ships,
        );
        Self { settings, config, overrides, strategy }
    }

    /// Main entry point - run until shutdown signal.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::create_dir_all(&self.settings.data_dir)?;
        let market_store = MarketStore::new(self.settings.data_dir.join("markets.json"));
        let ops_store = OpsStore::new(self.settings.data_dir.join("operations.jsonl"));
        let shutdown = Shutdown::new();
        let (state, mut events_rx) = FleetState::new(market_store, Some(ops_store), shutdown.clone());

        spawn_signal_watcher(shutdown.clone());

        let scheduler = Arc::new(RequestScheduler::new(
            self.config.scheduler.rate,
            self.config.scheduler.burst,
        ));
        scheduler.start();
        let api = Arc::new(ApiClient::new(
            &self.settings.base_url,
            &self.settings.token,
            Arc::clone(&scheduler) as Arc<dyn RateLimit>,
        ));

        let agent_info = api.get_agent().await?;
        o_summary!("{}", "=".repeat(70));
        o_summary!("🎖️  FLEET COMMANDER ONLINE - {}", agent_info.symbol);
        o_summary!(
            "💰 Credits: {} | 🚢 Ships: {}",
            agent_info.credits, agent_info.ship_count
        );
        o_summary!("{}", "=".repeat(70));
        if let Some(ops) = &state.ops_store {
            ops.snapshot_agent(agent_info.credits, agent_info.ship_count);
        }

        let ships = self.discover_fleet(&api).await?;
        if ships.is_empty() {
            o_error!("❌ No ships found - nothing to command");
            scheduler.stop();
            return Ok(());
        }

        // Load intel for every system any ship is in
        let mut systems_seen: HashSet<String> = HashSet::new();
        for ship in &ships {
            if systems_seen.insert(ship.nav.system_symbol.clone()) {
                load_system_intel(&api, &ship.nav.system_symbol, &state).await?;
            }
        }

        let mut agents: HashMap<String, ShipAgent> = HashMap::new();
        let plan = self.evaluate_strategy(&api, &ships, &state, &agents).await?;
        self.apply_plan(&api, &state, &mut agents, &ships, plan);

        if !agents.values().any(ShipAgent::is_running) {
            o_summary!("⚠️ No active missions to run - exiting");
            scheduler.stop();
            return Ok(());
        }
        log_fleet_status(&agents);

        self.run_event_loop(&api, &state, &mut agents, &mut events_rx, &shutdown).await;

        // Shutdown: stop everything, absorb stragglers, report
        o_summary!("");
        o_summary!("🛬 Shutting down fleet...");
        shutdown.set();
        cancel_all(&mut agents).await;
        scheduler.stop();

        match api.get_agent().await {
            Ok(final_agent) => {
                o_summary!("{}", "=".repeat(70));
                o_summary!("🎖️  FLEET COMMANDER OFFLINE");
                o_summary!("💰 Final balance: {}", final_agent.credits);
                for agent in agents.values() {
                    if agent.mission == MissionKind::Idle {
                        continue;
                    }
                    let status = if agent.restart_count >= MAX_RESTARTS { "crashed" } else { "stopped" };
                    o_summary!(
                        "  [{}] {} - {} (restarts: {})",
                        agent.symbol, agent.mission, status, agent.restart_count
                    );
                }
                o_summary!("{}", "=".repeat(70));
            }
            Err(e) => o_error!("⚠️ Could not fetch final balance: {}", e),
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    async fn discover_fleet(&self, api: &ApiClient) -> Result<Vec<Ship>, ApiError> {
        o_info!("🔭 Discovering fleet...");
        let all_ships = api.list_ships().await?;
        let total = all_ships.len();

        let mut ships = Vec::new();
        for ship in all_ships {
            if self.config.fleet.skip_ships.iter().any(|s| s == &ship.symbol) {
                o_info!("  [{}] SKIPPED (configured skip list)", ship.symbol);
                continue;
            }
            o_info!(
                "  [{}] at {} ({})",
                ship.symbol, ship.nav.waypoint_symbol, ship.nav.status
            );
            ships.push(ship);
        }
        o_info!("🔭 Discovered {}/{} ships", ships.len(), total);
        Ok(ships)
    }

    // ------------------------------------------------------------------
    // Strategy
    // ------------------------------------------------------------------

    async fn evaluate_strategy(
        &self,
        api: &ApiClient,
        ships: &[Ship],
        state: &Arc<FleetState>,
        agents: &HashMap<String, ShipAgent>,
    ) -> Result<FleetPlan, ApiError> {
        let agent_info = api.get_agent().await?;

        let (has_contract, contract_profitable) = match api.list_contracts().await {
            Ok(contracts) => contracts
                .iter()
                .find(|c| c.accepted && !c.fulfilled && c.contract_type == "PROCUREMENT")
                .map(|c| (true, c.total_payment() > 0))
                .unwrap_or((false, false)),
            Err(_) => (false, false),
        };

        let gate_needs = self.check_gate_status(api, state).await;
        let market_routes = state.market_store.has_profitable_routes();

        let mut capabilities: Vec<ShipCapability> = Vec::new();
        let mut current: HashMap<String, MissionKind> = HashMap::new();
        for ship in ships {
            let mission = agents
                .get(&ship.symbol)
                .map(|a| a.mission)
                .unwrap_or(MissionKind::Idle);
            capabilities.push(ShipCapability {
                symbol: ship.symbol.clone(),
                cargo_capacity: ship.cargo.capacity,
                fuel_capacity: ship.fuel.capacity,
                category: categorize(ship, &self.config.fleet.disabled_ships),
                current_mission: mission,
            });
            current.insert(ship.symbol.clone(), mission);
        }

        o_info!(
            "🧭 Strategy inputs: credits={} contract={} gate={} routes={}",
            agent_info.credits, has_contract, gate_needs, market_routes
        );

        let skip_ships: HashSet<String> = self.config.fleet.skip_ships.iter().cloned().collect();
        Ok(self.strategy.evaluate(&StrategyInputs {
            credits: agent_info.credits,
            ships: &capabilities,
            current_assignments: &current,
            has_active_contract: has_contract,
            contract_profitable,
            gate_needs_supplies: gate_needs,
            market_routes_available: market_routes,
            skip_ships: &skip_ships,
            overrides: &self.overrides,
        }))
    }

    /// Does any loaded system have a gate build that still needs materials?
    async fn check_gate_status(&self, api: &ApiClient, state: &Arc<FleetState>) -> bool {
        for system in state.loaded_systems() {
            let Some(gate) = system.gate_under_construction().cloned() else {
                continue;
            };
            match api.get_construction(&system.symbol, &gate.symbol).await {
                Ok(construction) => {
                    if !construction.is_complete && !construction.unmet_materials().is_empty() {
                        return true;
                    }
                }
                Err(e) => {
                    o_info!("⚠️ Construction check failed for {}: {}", gate.symbol, e);
                }
            }
        }
        false
    }

    fn apply_plan(
        &self,
        api: &Arc<ApiClient>,
        state: &Arc<FleetState>,
        agents: &mut HashMap<String, ShipAgent>,
        ships: &[Ship],
        plan: FleetPlan,
    ) {
        for ship in ships {
            let Some(assignment) = plan.assignments.get(&ship.symbol) else {
                continue;
            };
            let mut agent = ShipAgent::new(
                &ship.symbol,
                assignment.mission,
                assignment.params.clone(),
                &ship.nav.system_symbol,
            );
            agent.launch(api, state);
            agents.insert(ship.symbol.clone(), agent);
        }
    }

    // ------------------------------------------------------------------
    // Event loop
    // ------------------------------------------------------------------

    async fn run_event_loop(
        &self,
        api: &Arc<ApiClient>,
        state: &Arc<FleetState>,
        agents: &mut HashMap<String, ShipAgent>,
        events_rx: &mut mpsc::UnboundedReceiver<FleetEvent>,
        shutdown: &Shutdown,
    ) {
        let mut cycles: u64 = 0;

        while !shutdown.is_set() && agents.values().any(ShipAgent::is_running) {
            let mut batch: Vec<FleetEvent> = Vec::new();
            if let Ok(Some(event)) = tokio::time::timeout(EVENT_TIMEOUT, events_rx.recv()).await {
                batch.push(event);
            }
            while let Ok(event) = events_rx.try_recv() {
                batch.push(event);
            }
            cycles += 1;

            for event in &batch {
                o_info!("📨 EVENT: {}", event);
            }

            for event in &batch {
                match event.event_type {
                    EventType::MissionCrashed => {
                        self.handle_crash(api, state, agents, event).await;
                    }
                    EventType::MissionEnded => {
                        if let Some(agent) = agents.get_mut(&event.ship_symbol) {
                            o_info!("[{}] Mission {} completed normally", agent.symbol, agent.mission);
                            agent.clear_task();
                        }
                    }
                    _ => {}
                }
            }

            if cycles % SNAPSHOT_EVERY_N_CYCLES == 0 {
                if let Some(ops) = &state.ops_store {
                    if let Ok(agent_info) = api.get_agent().await {
                        ops.snapshot_agent(agent_info.credits, agent_info.ship_count);
                    }
                }
            }

            if batch.iter().any(|e| e.event_type.is_strategic()) {
                o_info!(
                    "🧭 Re-evaluating strategy ({} strategic events)...",
                    batch.iter().filter(|e| e.event_type.is_strategic()).count()
                );
                self.reassign_if_needed(api, state, agents).await;
            }
        }
    }

    /// Restart a crashed mission with backoff, or park the ship.
    async fn handle_crash(
        &self,
        api: &Arc<ApiClient>,
        state: &Arc<FleetState>,
        agents: &mut HashMap<String, ShipAgent>,
        event: &FleetEvent,
    ) {
        let Some(agent) = agents.get_mut(&event.ship_symbol) else {
            return;
        };
        let error = event.data.get("error").and_then(|v| v.as_str()).unwrap_or("unknown");
        let error_type = event.data.get("error_type").and_then(|v| v.as_str()).unwrap_or("");
        o_error!("❌ [{}] Mission crashed: {} ({})", agent.symbol, error, error_type);

        if agent.restart_count >= MAX_RESTARTS {
            o_error!(
                "🛑 [{}] Max restarts ({}) exceeded - parking ship",
                agent.symbol, MAX_RESTARTS
            );
            agent.mission = MissionKind::Idle;
            agent.clear_task();
            return;
        }

        let backoff = restart_backoff(agent.restart_count);
        o_info!("⏳ [{}] Restarting in {}s...", agent.symbol, backoff);
        if state.shutdown.sleep(Duration::from_secs(backoff)).await {
            agent.clear_task();
            return;
        }
        agent.relaunch(api, state);
    }

    /// Re-run strategy against a fresh ship list and apply any changes.
    async fn reassign_if_needed(
        &self,
        api: &Arc<ApiClient>,
        state: &Arc<FleetState>,
        agents: &mut HashMap<String, ShipAgent>,
    ) {
        let ships: Vec<Ship> = match api.list_ships().await {
            Ok(ships) => ships
                .into_iter()
                .filter(|s| agents.contains_key(&s.symbol))
                .collect(),
            Err(e) => {
                o_error!("⚠️ Ship refresh failed, keeping current assignments: {}", e);
                return;
            }
        };
        if ships.is_empty() {
            return;
        }

        let plan = match self.evaluate_strategy(api, &ships, state, agents).await {
            Ok(plan) => plan,
            Err(e) => {
                o_error!("⚠️ Strategy evaluation failed: {}", e);
                return;
            }
        };

        let current: HashMap<String, MissionKind> =
            agents.iter().map(|(symbol, agent)| (symbol.clone(), agent.mission)).collect();
        let changes = plan.changes_from(&current);
        if changes.is_empty() {
            o_info!("🧭 Strategy: no changes needed");
            return;
        }

        for (symbol, old_mission, assignment) in changes {
            o_summary!("🧭 Strategy: {} {} -> {}", symbol, old_mission, assignment.mission);
            let Some(agent) = agents.get_mut(&symbol) else {
                continue;
            };
            // Cancel the old task with a short grace period
            if let Some(handle) = agent.take_task() {
                handle.abort();
                let _ = tokio::time::timeout(REASSIGN_GRACE, handle).await;
            }
            agent.mission = assignment.mission;
            agent.params = assignment.params;
            agent.restart_count = 0;
            agent.launch(api, state);
        }
    }
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

fn restart_backoff(restart_count: u32) -> u64 {
    RESTART_BACKOFF[(restart_count as usize).min(RESTART_BACKOFF.len() - 1)]
}

fn spawn_signal_watcher(shutdown: Shutdown) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut terminate) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = terminate.recv() => {}
                    }
                }
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        o_summary!("🛑 Shutdown signal received - winding down fleet");
        shutdown.set();
    });
}

fn log_fleet_status(agents: &HashMap<String, ShipAgent>) {
    let running = agents.values().filter(|a| a.is_running()).count();
    o_summary!("");
    o_summary!("--- {} missions active ---", running);
    for agent in agents.values() {
        if agent.is_running() {
            o_summary!("  [{}] {} in {}", agent.symbol, agent.mission, agent.system);
        }
    }
    let idle = agents.values().filter(|a| a.mission == MissionKind::Idle).count();
    if idle > 0 {
        o_summary!("  + {} ships idle", idle);
    }
    o_summary!("");
}

async fn cancel_all(agents: &mut HashMap<String, ShipAgent>) {
    let mut handles = Vec::new();
    for agent in agents.values_mut() {
        if let Some(handle) = agent.take_task() {
            handle.abort();
            handles.push(handle);
        }
    }
    for handle in handles {
        // JoinError from an aborted task is expected here
        let _ = handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_backoff_schedule() {
        assert_eq!(restart_backoff(0), 10);
        assert_eq!(restart_backoff(1), 30);
        assert_eq!(restart_backoff(2), 60);
        assert_eq!(restart_backoff(3), 120);
        assert_eq!(restart_backoff(4), 300);
        // Counts past the schedule stay capped at the last entry
        assert_eq!(restart_backoff(10), 300);
    }

    #[test]
    fn restart_budget_is_five() {
        assert_eq!(MAX_RESTARTS, 5);
        assert_eq!(RESTART_BACKOFF.len(), 5);
    }
}
