//! Timer state record and its transitions

use serde::{Deserialize, Serialize};

/// Length of a snooze in minutes
pub const SNOOZE_MINUTES: u32 = 5;

/// Session length used by the default (reset) record
pub const DEFAULT_INTERVAL_MINUTES: u32 = 15;

/// Semantic label of a session, drives default durations and UI copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerMode {
    Focus,
    ShortBreak,
    LongBreak,
    #[default]
    Custom,
}

impl TimerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerMode::Focus => "focus",
            TimerMode::ShortBreak => "shortBreak",
            TimerMode::LongBreak => "longBreak",
            TimerMode::Custom => "custom",
        }
    }
}

/// The single persisted record describing the countdown.
///
/// Timestamps are milliseconds since the Unix epoch. While running, `end_time`
/// is the source of truth and `time_left` is only the value captured when the
/// segment started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub is_active: bool,
    pub is_paused: bool,
    pub time_left: u64,
    pub mode: TimerMode,
    pub interval: u32,
    pub is_blinking: bool,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl TimerState {
    /// Create the default inactive record
    pub fn new() -> Self {
        Self {
            is_active: false,
            is_paused: false,
            time_left: u64::from(DEFAULT_INTERVAL_MINUTES) * 60,
            mode: TimerMode::Custom,
            interval: DEFAULT_INTERVAL_MINUTES,
            is_blinking: false,
            start_time: None,
            end_time: None,
        }
    }

    /// A freshly started countdown of `minutes` beginning at `now_ms`
    pub fn running(minutes: u32, mode: TimerMode, now_ms: i64) -> Self {
        let seconds = u64::from(minutes) * 60;
        Self {
            is_active: true,
            is_paused: false,
            time_left: seconds,
            mode,
            interval: minutes,
            is_blinking: false,
            start_time: Some(now_ms),
            end_time: Some(now_ms + seconds as i64 * 1000),
        }
    }

    /// True while a deadline is ticking
    pub fn is_running(&self) -> bool {
        self.is_active && !self.is_paused && self.end_time.is_some()
    }

    /// True when nothing is counting down, which makes the record eligible
    /// for the idle sweep
    pub fn is_idle(&self) -> bool {
        !self.is_active || self.is_paused
    }

    /// Remaining whole seconds at `now_ms`.
    ///
    /// Running timers derive it from the deadline; paused timers report the
    /// frozen `time_left`; inactive timers report nothing.
    pub fn remaining_seconds(&self, now_ms: i64) -> Option<u64> {
        if !self.is_active {
            return None;
        }
        if self.is_paused {
            return Some(self.time_left);
        }
        self.end_time
            .map(|end| (end.saturating_sub(now_ms).max(0) / 1000) as u64)
    }

    /// Freeze the countdown at `now_ms`. Returns `None` when not running.
    pub fn paused_at(&self, now_ms: i64) -> Option<Self> {
        let end = self.end_time.filter(|_| self.is_active && !self.is_paused)?;
        let remaining_ms = end.saturating_sub(now_ms).max(0);
        Some(Self {
            is_paused: true,
            time_left: (remaining_ms / 1000) as u64,
            end_time: None,
            ..self.clone()
        })
    }

    /// Restart the frozen countdown at `now_ms`. Returns `None` unless paused
    /// with time remaining.
    pub fn resumed_at(&self, now_ms: i64) -> Option<Self> {
        if !(self.is_active && self.is_paused && self.time_left > 0) {
            return None;
        }
        Some(Self {
            is_paused: false,
            start_time: Some(now_ms),
            end_time: Some(now_ms.saturating_add(seconds_to_ms(self.time_left))),
            ..self.clone()
        })
    }

    /// Check the structural invariants of the record
    pub fn is_consistent(&self) -> bool {
        let deadline_matches = self.end_time.is_some() == (self.is_active && !self.is_paused);
        let pause_implies_active = !self.is_paused || self.is_active;
        deadline_matches && pause_implies_active
    }
}

/// Saturates instead of wrapping for records holding absurd durations
fn seconds_to_ms(seconds: u64) -> i64 {
    i64::try_from(seconds).unwrap_or(i64::MAX).saturating_mul(1000)
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new()
    }
}
