//! Commands sent by observers to the engine

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::{TimerMode, TimerState};

/// Every command an observer can issue, discriminated by `action`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    /// Start a session. Missing or zero `interval` and a missing `mode` fall
    /// back to the configured settings.
    StartTimer {
        #[serde(default)]
        interval: Option<u32>,
        #[serde(default)]
        mode: Option<TimerMode>,
    },
    PauseTimer {},
    ResumeTimer {},
    ResetTimer {},
    SnoozeTimer {},
    GlobalRestart {},
    /// Remove the sender's own widget; the timer is left alone
    CloseOverlay {},
}

impl Command {
    /// Parse an untyped message. Returns `None` for unknown or malformed actions.
    pub fn from_value(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }

    /// Whether `action` names a command, regardless of its payload
    pub fn is_known_action(action: &str) -> bool {
        Self::ACTIONS.contains(&action)
    }

    pub const ACTIONS: [&'static str; 7] = [
        "startTimer",
        "pauseTimer",
        "resumeTimer",
        "resetTimer",
        "snoozeTimer",
        "globalRestart",
        "closeOverlay",
    ];

    pub fn action(&self) -> &'static str {
        match self {
            Command::StartTimer { .. } => "startTimer",
            Command::PauseTimer {} => "pauseTimer",
            Command::ResumeTimer {} => "resumeTimer",
            Command::ResetTimer {} => "resetTimer",
            Command::SnoozeTimer {} => "snoozeTimer",
            Command::GlobalRestart {} => "globalRestart",
            Command::CloseOverlay {} => "closeOverlay",
        }
    }
}

/// What the engine did with a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub status: String,
    /// False when the command was a no-op against the current state
    pub applied: bool,
    pub timer_state: Option<TimerState>,
}

impl CommandOutcome {
    pub fn applied(status: &str, timer_state: TimerState) -> Self {
        Self {
            status: status.to_string(),
            applied: true,
            timer_state: Some(timer_state),
        }
    }

    pub fn unchanged(status: &str, timer_state: TimerState) -> Self {
        Self {
            status: status.to_string(),
            applied: false,
            timer_state: Some(timer_state),
        }
    }

    pub fn view_only(status: &str, applied: bool) -> Self {
        Self {
            status: status.to_string(),
            applied,
            timer_state: None,
        }
    }
}
