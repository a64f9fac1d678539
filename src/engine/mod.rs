//! Timer engine module
//!
//! The engine owns every mutation of the persisted timer record. It runs on
//! a single task behind [`EngineHandle`].

pub mod clock;
pub mod handle;
pub mod timer_engine;

pub use clock::{Clock, ManualClock, SystemClock};
pub use handle::{spawn_engine, EngineHandle};
pub use timer_engine::{TimerEngine, DEFAULT_IDLE_THRESHOLD};
