//! Small helpers shared by the server and the observers

pub mod format;
pub mod signals;

pub use format::{format_mmss, format_uptime};
pub use signals::shutdown_signal;
