//! Observer side of the protocol
//!
//! The same reconciliation runs in the popup and in every page overlay: read
//! the store once, then follow pushes, store notifications and a local tick.

pub mod reconciler;
pub mod runner;

pub use reconciler::{
    ButtonLabel, Completion, ObserverAction, ObserverReconciler, Projection, IDLE_PLACEHOLDER,
};
pub use runner::{run_observer, ObserverExit, TICK};
