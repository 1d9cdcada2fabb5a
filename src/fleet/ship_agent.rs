// ShipAgent - per-ship task wrapper for the fleet commander.
use crate::client::ApiClient;
use crate::fleet::events::{EventType, FleetEvent};
use crate::fleet::registry::{MissionKind, MissionParams, mission_entry};
use crate::fleet::state::FleetState;
use crate::{o_error, o_info};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Thin wrapper around a ship's mission task.
pub struct ShipAgent {
    pub symbol: String,
    pub mission: MissionKind,
    pub params: MissionParams,
    pub system: String,
    pub restart_count: u32,
    task: Option<JoinHandle<()>>,
}

impl ShipAgent {
    pub fn new(symbol: &str, mission: MissionKind, params: MissionParams, system: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            mission,
            params,
            system: system.to_string(),
            restart_count: 0,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Spawn the mission task. Returns false (and spawns nothing) for IDLE
    /// or an unregistered mission kind.
    ///
    /// The wrapper task emits MISSION_CRASHED or MISSION_ENDED when the
    /// mission finishes. An aborted task (reassignment, shutdown) emits
    /// nothing - the wrapper dies with the mission future.
    pub fn launch(&mut self, api: &Arc<ApiClient>, state: &Arc<FleetState>) -> bool {
        if self.mission == MissionKind::Idle {
            o_info!("[{}] Mission: idle - not launching", self.symbol);
            return false;
        }
        let Some(entry) = mission_entry(self.mission) else {
            o_error!("[{}] No entry point registered for mission {}", self.symbol, self.mission);
            return false;
        };

        let future = entry(
            Arc::clone(api),
            self.symbol.clone(),
            Arc::clone(state),
            self.params.clone(),
        );
        let symbol = self.symbol.clone();
        let state = Arc::clone(state);
        self.task = Some(tokio::spawn(async move {
            match future.await {
                Ok(()) => state.emit(FleetEvent::new(EventType::MissionEnded, &symbol)),
                Err(e) => state.emit(FleetEvent::with_data(
                    EventType::MissionCrashed,
                    &symbol,
                    json!({ "error": e.to_string(), "error_type": e.kind() }),
                )),
            }
        }));

        o_info!("[{}] Launched {} mission", self.symbol, self.mission);
        true
    }

    /// Restart the mission after a crash.
    pub fn relaunch(&mut self, api: &Arc<ApiClient>, state: &Arc<FleetState>) -> bool {
        self.restart_count += 1;
        o_info!(
            "[{}] Restarting {} mission (attempt {})",
            self.symbol, self.mission, self.restart_count
        );
        self.launch(api, state)
    }

    /// Detach the task handle, e.g. before cancelling it.
    pub fn take_task(&mut self) -> Option<JoinHandle<()>> {
        self.task.take()
    }

    pub fn clear_task(&mut self) {
        self.task = None;
    }
}
