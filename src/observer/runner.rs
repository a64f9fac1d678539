//! Event loop of a single observer

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast::error::RecvError, mpsc, watch},
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use super::{Completion, ObserverAction, ObserverReconciler, Projection};
use crate::{
    engine::Clock,
    error::StoreResult,
    protocol::Event,
    state::{
        store::{read_timer_state, timer_state_from_change},
        StateStore,
    },
};

/// Local re-derivation period
pub const TICK: Duration = Duration::from_secs(1);

/// Why an observer loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverExit {
    /// The engine asked the widget to go away
    Removed,
    /// The engine dropped this observer's channel
    Detached,
}

/// Keep one observer's projection current.
///
/// Renders from the store before anything else, then follows pushes, store
/// notifications, and its own tick, whichever comes first.
pub async fn run_observer(
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    mut events: mpsc::UnboundedReceiver<Event>,
    projection_tx: watch::Sender<Projection>,
    completion_tx: mpsc::UnboundedSender<Completion>,
) -> StoreResult<ObserverExit> {
    // Subscribe first so a write racing the initial read is not lost
    let mut changes = store.subscribe();
    let mut reconciler = ObserverReconciler::new(read_timer_state(store.as_ref()).await?);
    publish(&projection_tx, reconciler.projection(clock.now_ms()));

    let mut ticker = interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut store_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            event = events.recv() => {
                let Some(event) = event else {
                    info!("Observer channel closed");
                    return Ok(ObserverExit::Detached);
                };
                debug!("Observer received {}", event.name());
                match reconciler.apply_event(event) {
                    ObserverAction::None => {}
                    ObserverAction::Notify(completion) => {
                        let _ = completion_tx.send(completion);
                    }
                    ObserverAction::Remove => return Ok(ObserverExit::Removed),
                }
            }
            change = changes.recv(), if store_open => match change {
                Ok(change) => {
                    if let Some(state) = timer_state_from_change(&change) {
                        reconciler.apply_state(state);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Observer missed {} store notifications, re-reading", missed);
                    match read_timer_state(store.as_ref()).await {
                        Ok(Some(state)) => reconciler.apply_state(state),
                        Ok(None) => {}
                        Err(e) => error!("Re-read after missed notifications failed: {}", e),
                    }
                }
                Err(RecvError::Closed) => {
                    // Ticks and pushes still keep the display right
                    warn!("Store notifications closed");
                    store_open = false;
                }
            },
        }

        publish(&projection_tx, reconciler.projection(clock.now_ms()));
    }
}

fn publish(projection_tx: &watch::Sender<Projection>, projection: Projection) {
    projection_tx.send_if_modified(|current| {
        if *current == projection {
            false
        } else {
            *current = projection;
            true
        }
    });
}
