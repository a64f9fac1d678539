//! Idle reset background task

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{engine::EngineHandle, error::EngineError};

/// Background task that periodically asks the engine to reset a stale timer
pub async fn idle_reset_task(engine: EngineHandle, period: Duration) {
    info!("Starting idle reset task (every {}s)", period.as_secs());

    let mut interval = interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately, nobody can be idle yet
    interval.tick().await;

    loop {
        interval.tick().await;

        match engine.idle_check().await {
            Ok(true) => debug!("Idle check reset the timer"),
            Ok(false) => {}
            Err(EngineError::Stopped) => {
                info!("Engine stopped, ending idle reset task");
                break;
            }
            Err(e) => warn!("Idle check failed: {}", e),
        }
    }
}
