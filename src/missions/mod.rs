// Missions module - the long-lived per-ship behaviors

pub mod contractor;
pub mod gate_builder;
pub mod navigation;
pub mod router;
pub mod scanner;
pub mod trader;

use crate::client::ApiError;
use std::fmt;

/// Failure that escapes a mission's top-level loop. The agent wrapper turns
/// it into a MISSION_CRASHED event for the commander's restart policy.
#[derive(Debug)]
pub enum MissionError {
    Api(ApiError),
    Other(String),
}

impl MissionError {
    pub fn other(message: impl Into<String>) -> Self {
        MissionError::Other(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MissionError::Api(_) => "api_error",
            MissionError::Other(_) => "mission_error",
        }
    }
}

impl fmt::Display for MissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissionError::Api(e) => write!(f, "{} (code {})", e, e.code),
            MissionError::Other(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for MissionError {}

impl From<ApiError> for MissionError {
    fn from(e: ApiError) -> Self {
        MissionError::Api(e)
    }
}
