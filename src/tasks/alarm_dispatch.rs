//! Alarm dispatch background task

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::{engine::EngineHandle, error::EngineError};

/// Background task that forwards fired alarms into the engine's mailbox
pub async fn alarm_dispatch_task(engine: EngineHandle, mut fired: mpsc::UnboundedReceiver<String>) {
    info!("Starting alarm dispatch task");

    while let Some(tag) = fired.recv().await {
        match engine.alarm_fired(tag.clone()).await {
            Ok(Some(_)) => info!("Alarm {} completed the session", tag),
            Ok(None) => info!("Alarm {} had nothing to complete", tag),
            Err(EngineError::Stopped) => {
                info!("Engine stopped, ending alarm dispatch task");
                break;
            }
            Err(e) => error!("Failed to complete session on alarm {}: {}", tag, e),
        }
    }
}
