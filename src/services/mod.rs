//! External collaborators of the engine
//!
//! The alarm facility that completes sessions and the content (quotes,
//! sounds) attached to a completion.

pub mod alarm;
pub mod content;

// Re-export main types
pub use alarm::{AlarmScheduler, TokioAlarmScheduler, TIMER_ALARM_TAG};
pub use content::{ContentResolver, Quote};
