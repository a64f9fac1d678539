//! Mindful Timer - keeps one break countdown in sync across many observers
//!
//! A single engine owns the persisted timer record. Popups and page overlays
//! send it commands and receive its events, deriving what they display from
//! the shared record rather than from their own clocks.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod observer;
pub mod protocol;
pub mod services;
pub mod state;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use api::create_router;
pub use config::Config;
pub use engine::{spawn_engine, EngineHandle, TimerEngine};
pub use error::{EngineError, StoreError};
pub use state::{AppState, TimerState};
pub use utils::signals::shutdown_signal;
