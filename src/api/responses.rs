//! API request and response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    protocol::{CommandOutcome, LifecycleEvent, ObserverKind},
    state::TimerState,
};

/// Answer to every command, including unknown ones
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub status: String,
    pub applied: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timer_state: Option<TimerState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn from_outcome(outcome: CommandOutcome) -> Self {
        Self {
            status: outcome.status,
            applied: outcome.applied,
            timestamp: Utc::now(),
            timer_state: outcome.timer_state,
            error: None,
        }
    }

    pub fn unknown_action() -> Self {
        Self {
            status: "Unknown action".to_string(),
            applied: false,
            timestamp: Utc::now(),
            timer_state: None,
            error: None,
        }
    }

    /// A known action whose fields could not be read
    pub fn malformed(action: &str, reason: String) -> Self {
        Self {
            status: format!("Invalid {} command", action),
            applied: false,
            timestamp: Utc::now(),
            timer_state: None,
            error: Some(reason),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            status: "error".to_string(),
            applied: false,
            timestamp: Utc::now(),
            timer_state: None,
            error: Some(message),
        }
    }
}

/// Current timer record plus what an observer would display right now
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    pub timer_state: TimerState,
    pub remaining_seconds: Option<u64>,
    pub display_text: String,
    pub observers: usize,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_command: Option<String>,
    pub last_command_time: Option<DateTime<Utc>>,
}

/// Query parameters of the event stream
#[derive(Debug, Clone, Deserialize)]
pub struct EventsQuery {
    pub observer: String,
    #[serde(default)]
    pub kind: ObserverKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub foreground: bool,
}

/// Query parameters of the command endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandQuery {
    #[serde(default)]
    pub observer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleRequest {
    pub event: LifecycleEvent,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleResponse {
    pub observer: String,
    /// Whether the observer is still attached and was refreshed
    pub attached: bool,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    /// Create a new health response
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
