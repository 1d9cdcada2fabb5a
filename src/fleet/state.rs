// Shared fleet state - the single source of truth for every mission task.
use crate::client::{ApiClient, ApiError};
use crate::fleet::events::FleetEvent;
use crate::missions::contractor::ContractState;
use crate::models::Waypoint;
use crate::o_info;
use crate::storage::{MarketStore, OpsStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;

/// Broadcast shutdown signal observed by every task.
///
/// Sleeps become "sleep up to N seconds or until shutdown", so missions
/// wind down promptly without exception-based cancellation.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn set(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        // A dropped sender also counts as shutdown
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }

    /// Interruptible sleep. Returns true if shutdown fired before the
    /// duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::time::timeout(duration, self.wait()).await.is_ok()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-system knowledge cache, created on first use and kept for the
/// process lifetime.
#[derive(Debug, Clone)]
pub struct SystemState {
    pub symbol: String,
    pub waypoints: Vec<Waypoint>,
    pub coords: HashMap<String, (i32, i32)>,
    pub markets: Vec<Waypoint>,
    pub shipyards: Vec<Waypoint>,
    /// ship_symbol -> (good, source, destination) for route collision avoidance
    pub claimed_routes: HashMap<String, (String, String, String)>,
}

impl SystemState {
    pub fn from_waypoints(system_symbol: &str, waypoints: Vec<Waypoint>) -> Self {
        let coords = waypoints.iter().map(|wp| (wp.symbol.clone(), (wp.x, wp.y))).collect();
        let markets = waypoints.iter().filter(|wp| wp.has_trait("MARKETPLACE")).cloned().collect();
        let shipyards = waypoints.iter().filter(|wp| wp.has_trait("SHIPYARD")).cloned().collect();
        Self {
            symbol: system_symbol.to_string(),
            waypoints,
            coords,
            markets,
            shipyards,
            claimed_routes: HashMap::new(),
        }
    }

    /// The jump gate build site in this system, if any.
    pub fn gate_under_construction(&self) -> Option<&Waypoint> {
        self.waypoints
            .iter()
            .find(|wp| wp.waypoint_type == "JUMP_GATE" && wp.is_under_construction)
    }
}

/// Global fleet state shared by all mission tasks.
pub struct FleetState {
    pub market_store: MarketStore,
    pub ops_store: Option<OpsStore>,
    pub shutdown: Shutdown,
    pub contract_state: ContractState,
    events_tx: mpsc::UnboundedSender<FleetEvent>,
    systems: Mutex<HashMap<String, SystemState>>,
}

impl FleetState {
    pub fn new(
        market_store: MarketStore,
        ops_store: Option<OpsStore>,
        shutdown: Shutdown,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<FleetEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Self {
            market_store,
            ops_store,
            shutdown,
            contract_state: ContractState::new(),
            events_tx,
            systems: Mutex::new(HashMap::new()),
        });
        (state, events_rx)
    }

    pub fn get_system(&self, system_symbol: &str) -> Option<SystemState> {
        self.lock_systems().get(system_symbol).cloned()
    }

    /// Get or create system state from a waypoint listing.
    pub fn ensure_system(&self, system_symbol: &str, waypoints: Vec<Waypoint>) -> SystemState {
        let mut systems = self.lock_systems();
        systems
            .entry(system_symbol.to_string())
            .or_insert_with(|| SystemState::from_waypoints(system_symbol, waypoints))
            .clone()
    }

    pub fn loaded_systems(&self) -> Vec<SystemState> {
        self.lock_systems().values().cloned().collect()
    }

    pub fn system_coords(&self, system_symbol: &str) -> HashMap<String, (i32, i32)> {
        self.lock_systems()
            .get(system_symbol)
            .map(|s| s.coords.clone())
            .unwrap_or_default()
    }

    /// Register a trade route claim for a ship. Also written through to the
    /// market store so standalone mission processes can see it.
    pub fn claim_route(
        &self,
        system_symbol: &str,
        ship_symbol: &str,
        good: &str,
        source: &str,
        destination: &str,
    ) {
        if let Some(system) = self.lock_systems().get_mut(system_symbol) {
            system.claimed_routes.insert(
                ship_symbol.to_string(),
                (good.to_string(), source.to_string(), destination.to_string()),
            );
        }
        self.market_store.claim_route(ship_symbol, good, source, destination);
    }

    pub fn release_route(&self, system_symbol: &str, ship_symbol: &str) {
        if let Some(system) = self.lock_systems().get_mut(system_symbol) {
            system.claimed_routes.remove(ship_symbol);
        }
        self.market_store.release_route(ship_symbol);
    }

    /// All claimed routes in a system, excluding one ship's own claim.
    pub fn get_excluded_routes(
        &self,
        system_symbol: &str,
        exclude_ship: &str,
    ) -> Vec<(String, String, String)> {
        self.lock_systems()
            .get(system_symbol)
            .map(|system| {
                system
                    .claimed_routes
                    .iter()
                    .filter(|(ship, _)| ship.as_str() != exclude_ship)
                    .map(|(_, route)| route.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Push an event for the commander. Never blocks.
    pub fn emit(&self, event: FleetEvent) {
        let _ = self.events_tx.send(event);
    }

    fn lock_systems(&self) -> std::sync::MutexGuard<'_, HashMap<String, SystemState>> {
        match self.systems.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Load waypoints for a system and cache them in fleet state.
pub async fn load_system_intel(
    api: &ApiClient,
    system_symbol: &str,
    state: &FleetState,
) -> Result<SystemState, ApiError> {
    if let Some(existing) = state.get_system(system_symbol) {
        if !existing.waypoints.is_empty() {
            return Ok(existing);
        }
    }

    o_info!("🗺️  Loading system intel for {}...", system_symbol);
    let waypoints = api.list_waypoints(system_symbol).await?;
    let system = state.ensure_system(system_symbol, waypoints);
    o_info!(
        "🗺️  System {}: {} waypoints, {} markets, {} shipyards",
        system.symbol,
        system.waypoints.len(),
        system.markets.len(),
        system.shipyards.len()
    );
    Ok(system)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::events::EventType;
    use crate::models::WaypointTrait;

    fn waypoint(symbol: &str, x: i32, y: i32, traits: &[&str]) -> Waypoint {
        Waypoint {
            symbol: symbol.to_string(),
            waypoint_type: "PLANET".to_string(),
            system_symbol: "X1-AB12".to_string(),
            x,
            y,
            traits: traits
                .iter()
                .map(|t| WaypointTrait {
                    symbol: t.to_string(),
                    name: t.to_string(),
                    description: String::new(),
                })
                .collect(),
            is_under_construction: false,
        }
    }

    fn test_state() -> (Arc<FleetState>, mpsc::UnboundedReceiver<FleetEvent>) {
        FleetState::new(MarketStore::in_memory(), None, Shutdown::new())
    }

    #[tokio::test]
    async fn system_state_partitions_waypoints() {
        let system = SystemState::from_waypoints(
            "X1-AB12",
            vec![
                waypoint("X1-AB12-A1", 0, 0, &["MARKETPLACE", "SHIPYARD"]),
                waypoint("X1-AB12-B2", 10, 0, &["MARKETPLACE"]),
                waypoint("X1-AB12-C3", 20, 0, &[]),
            ],
        );
        assert_eq!(system.markets.len(), 2);
        assert_eq!(system.shipyards.len(), 1);
        assert_eq!(system.coords["X1-AB12-B2"], (10, 0));
    }

    #[tokio::test]
    async fn claim_release_roundtrip() {
        let (state, _rx) = test_state();
        state.ensure_system("X1-AB12", vec![waypoint("X1-AB12-A1", 0, 0, &[])]);

        state.claim_route("X1-AB12", "SHIP-1", "FOOD", "X1-AB12-K89", "X1-AB12-A1");
        let route = (
            "FOOD".to_string(),
            "X1-AB12-K89".to_string(),
            "X1-AB12-A1".to_string(),
        );

        // Another ship sees the claim; the owner does not
        assert_eq!(state.get_excluded_routes("X1-AB12", "SHIP-2"), vec![route.clone()]);
        assert!(state.get_excluded_routes("X1-AB12", "SHIP-1").is_empty());

        state.release_route("X1-AB12", "SHIP-1");
        assert!(state.get_excluded_routes("X1-AB12", "SHIP-2").is_empty());
    }

    #[tokio::test]
    async fn emitted_events_arrive_exactly_once() {
        let (state, mut rx) = test_state();
        state.emit(FleetEvent::new(EventType::TradeCompleted, "SHIP-1"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::TradeCompleted);
        assert_eq!(event.ship_symbol, "SHIP-1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn shutdown_sleep_returns_early() {
        let shutdown = Shutdown::new();
        shutdown.set();
        assert!(shutdown.is_set());
        assert!(shutdown.sleep(Duration::from_secs(60)).await);
    }
}
