//! State management module
//!
//! This module contains the persisted timer record, the settings the engine
//! consults, the durable store they live in, and the shared application state.

pub mod app_state;
pub mod settings;
pub mod store;
pub mod timer_state;

// Re-export main types
pub use app_state::AppState;
pub use settings::Settings;
pub use store::{JsonFileStore, MemoryStore, StateStore, StoreChange};
pub use timer_state::{TimerMode, TimerState};
