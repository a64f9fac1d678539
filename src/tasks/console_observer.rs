//! Observer that lives inside the daemon and logs what it would display

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::{
    engine::{Clock, EngineHandle},
    observer::{run_observer, ButtonLabel, Projection, IDLE_PLACEHOLDER},
    protocol::{Attachment, ObserverKind},
    state::StateStore,
};

const CONSOLE_OBSERVER_ID: &str = "console";

/// Attach a popup-style observer and log its projection as it changes
pub async fn console_observer_task(
    engine: EngineHandle,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
) {
    let attachment = Attachment {
        observer_id: CONSOLE_OBSERVER_ID.to_string(),
        kind: ObserverKind::Popup,
        url: None,
        foreground: false,
    };
    let events = match engine.attach(attachment).await {
        Ok(Some(events)) => events,
        Ok(None) => {
            warn!("Console observer was not accepted");
            return;
        }
        Err(e) => {
            error!("Failed to attach console observer: {}", e);
            return;
        }
    };

    let (projection_tx, mut projection_rx) = watch::channel(Projection {
        display_text: IDLE_PLACEHOLDER.to_string(),
        button_label: ButtonLabel::Start,
        seconds: None,
    });
    let (completion_tx, mut completion_rx) = mpsc::unbounded_channel();

    let observer = tokio::spawn(run_observer(store, clock, events, projection_tx, completion_tx));
    info!("Console observer attached");

    let mut last_label = None;
    loop {
        tokio::select! {
            changed = projection_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let projection = projection_rx.borrow_and_update().clone();
                if last_label != Some(projection.button_label) {
                    info!(
                        "[console] {} [{}]",
                        projection.display_text,
                        projection.button_label.as_str()
                    );
                    last_label = Some(projection.button_label);
                } else {
                    debug!("[console] {}", projection.display_text);
                }
            }
            Some(completion) = completion_rx.recv() => {
                match &completion.quote {
                    Some(quote) => {
                        info!("[console] Session complete: \"{}\" - {}", quote.text, quote.author)
                    }
                    None => info!("[console] Session complete"),
                }
            }
        }
    }

    match observer.await {
        Ok(Ok(exit)) => info!("Console observer ended: {:?}", exit),
        Ok(Err(e)) => error!("Console observer failed: {}", e),
        Err(e) => error!("Console observer task panicked: {}", e),
    }
}
