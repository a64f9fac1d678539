//! User settings the engine consults when starting or completing a session

use serde::{Deserialize, Serialize};

use super::timer_state::{TimerMode, DEFAULT_INTERVAL_MINUTES};

/// Settings record persisted next to the timer state.
///
/// Only seeded on install; editing preferences happens elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Session length in minutes used by restart and by starts without an interval
    pub interval: u32,
    pub timer_mode: TimerMode,
    pub sound_enabled: bool,
    pub selected_sound: String,
    pub show_quotes: bool,
    /// Quote category filter, `all` disables filtering
    pub quote_category: String,
}

impl Settings {
    pub fn new() -> Self {
        Self {
            interval: DEFAULT_INTERVAL_MINUTES,
            timer_mode: TimerMode::Custom,
            sound_enabled: true,
            selected_sound: "gentle-bell".to_string(),
            show_quotes: true,
            quote_category: "all".to_string(),
        }
    }

    /// Session length to use when a start request carries none
    pub fn session_minutes(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(minutes) if minutes > 0 => minutes,
            _ => self.interval.max(1),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}
