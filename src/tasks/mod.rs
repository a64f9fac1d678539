//! Background tasks module
//!
//! This module contains background tasks that run alongside the HTTP server.

pub mod alarm_dispatch;
pub mod console_observer;
pub mod idle_reset;

// Re-export main functions
pub use alarm_dispatch::alarm_dispatch_task;
pub use console_observer::console_observer_task;
pub use idle_reset::idle_reset_task;
