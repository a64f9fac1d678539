//! Message contract between the engine and its observers
//!
//! Commands flow from observers to the engine, events flow back. Both are
//! closed sum types discriminated by an `action` field on the wire.

pub mod commands;
pub mod events;
pub mod observers;

pub use commands::{Command, CommandOutcome};
pub use events::{Event, Transition};
pub use observers::{Attachment, ObserverKind, ObserverRegistry};

use serde::{Deserialize, Serialize};

/// Tab or popup lifecycle events that trigger re-attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleEvent {
    /// The observer's tab became the active one
    Activated,
    /// The observer's page loaded or navigated
    Updated,
    /// The observer's tab or popup went away
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSignal {
    pub observer_id: String,
    pub event: LifecycleEvent,
    pub url: Option<String>,
}
