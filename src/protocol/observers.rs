//! Registry of observers the engine can push events to

use std::{collections::HashMap, sync::Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::Event;
use crate::services::Quote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObserverKind {
    #[default]
    Popup,
    /// Widget injected into a web page
    Overlay,
}

/// Request to attach (or re-attach) an observer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub observer_id: String,
    pub kind: ObserverKind,
    pub url: Option<String>,
    pub foreground: bool,
}

impl Attachment {
    /// Overlays only live on regular web pages
    pub fn is_eligible(&self) -> bool {
        match self.kind {
            ObserverKind::Popup => true,
            ObserverKind::Overlay => self
                .url
                .as_deref()
                .is_some_and(|url| url.starts_with("http://") || url.starts_with("https://")),
        }
    }
}

#[derive(Debug)]
struct ObserverSlot {
    kind: ObserverKind,
    url: Option<String>,
    foreground: bool,
    tx: mpsc::UnboundedSender<Event>,
}

/// Best-effort delivery to every attached observer.
///
/// Observers whose receiving side is gone are dropped on the next send;
/// they recover by attaching again and reading the store.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    slots: Mutex<HashMap<String, ObserverSlot>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observer, replacing any previous attachment with the same id.
    /// Returns `None` when the observer is not eligible.
    pub fn attach(&self, attachment: Attachment) -> Option<mpsc::UnboundedReceiver<Event>> {
        if !attachment.is_eligible() {
            debug!(
                "Observer {} not eligible for attachment (url: {:?})",
                attachment.observer_id, attachment.url
            );
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut slots = self.lock()?;
        if attachment.foreground {
            for slot in slots.values_mut() {
                slot.foreground = false;
            }
        }
        let replaced = slots
            .insert(
                attachment.observer_id.clone(),
                ObserverSlot {
                    kind: attachment.kind,
                    url: attachment.url,
                    foreground: attachment.foreground,
                    tx,
                },
            )
            .is_some();

        info!(
            "Observer {} {} ({} attached)",
            attachment.observer_id,
            if replaced { "re-attached" } else { "attached" },
            slots.len()
        );
        Some(rx)
    }

    pub fn detach(&self, observer_id: &str) -> bool {
        let Some(mut slots) = self.lock() else {
            return false;
        };
        let removed = slots.remove(observer_id).is_some();
        if removed {
            info!("Observer {} detached", observer_id);
        }
        removed
    }

    pub fn is_attached(&self, observer_id: &str) -> bool {
        self.lock().is_some_and(|slots| slots.contains_key(observer_id))
    }

    /// Mark one observer as the foreground context and every other as background
    pub fn set_foreground(&self, observer_id: &str) -> bool {
        let Some(mut slots) = self.lock() else {
            return false;
        };
        if !slots.contains_key(observer_id) {
            return false;
        }
        for (id, slot) in slots.iter_mut() {
            slot.foreground = id == observer_id;
        }
        true
    }

    pub fn is_foreground(&self, observer_id: &str) -> bool {
        self.lock()
            .and_then(|slots| slots.get(observer_id).map(|slot| slot.foreground))
            .unwrap_or(false)
    }

    /// Record a navigation. Returns false if the new page is not eligible.
    pub fn update_url(&self, observer_id: &str, url: Option<String>) -> bool {
        let Some(mut slots) = self.lock() else {
            return false;
        };
        let Some(slot) = slots.get_mut(observer_id) else {
            return false;
        };
        let attachment = Attachment {
            observer_id: observer_id.to_string(),
            kind: slot.kind,
            url: url.clone(),
            foreground: slot.foreground,
        };
        debug!("Observer {} navigated from {:?} to {:?}", observer_id, slot.url, url);
        slot.url = url;
        attachment.is_eligible()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push an event to one observer
    pub fn send_to(&self, observer_id: &str, event: Event) -> bool {
        let Some(mut slots) = self.lock() else {
            return false;
        };
        let delivered = match slots.get(observer_id) {
            Some(slot) => slot.tx.send(event).is_ok(),
            None => return false,
        };
        if !delivered {
            debug!("Observer {} unreachable, dropping it", observer_id);
            slots.remove(observer_id);
        }
        delivered
    }

    /// Push the same event to every observer. Returns how many received it.
    pub fn broadcast(&self, event: &Event) -> usize {
        self.deliver(|_| event.clone())
    }

    /// Push a completion, telling each recipient whether it is in the foreground
    pub fn broadcast_completed(&self, quote: Option<Quote>, sound_ref: Option<String>) -> usize {
        self.deliver(|foreground| Event::TimerCompleted {
            quote: quote.clone(),
            sound_ref: sound_ref.clone(),
            is_recipient_foreground: foreground,
        })
    }

    fn deliver(&self, event_for: impl Fn(bool) -> Event) -> usize {
        let Some(mut slots) = self.lock() else {
            return 0;
        };

        let mut delivered = 0;
        slots.retain(|id, slot| {
            let event = event_for(slot.foreground);
            let name = event.name();
            if slot.tx.send(event).is_ok() {
                delivered += 1;
                true
            } else {
                debug!("Observer {} unreachable for {}, dropping it", id, name);
                false
            }
        });
        debug!("Delivered event to {} observer(s)", delivered);
        delivered
    }

    fn lock(&self) -> Option<std::sync::MutexGuard<'_, HashMap<String, ObserverSlot>>> {
        match self.slots.lock() {
            Ok(slots) => Some(slots),
            Err(e) => {
                warn!("Failed to lock observer registry: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TimerState;

    fn overlay(id: &str, url: &str, foreground: bool) -> Attachment {
        Attachment {
            observer_id: id.to_string(),
            kind: ObserverKind::Overlay,
            url: Some(url.to_string()),
            foreground,
        }
    }

    #[test]
    fn overlays_need_web_pages() {
        let registry = ObserverRegistry::new();
        assert!(registry.attach(overlay("tab-1", "chrome://extensions", false)).is_none());
        assert!(registry.attach(overlay("tab-2", "https://example.com", false)).is_some());
        assert!(registry
            .attach(Attachment {
                observer_id: "popup".to_string(),
                kind: ObserverKind::Popup,
                url: None,
                foreground: false,
            })
            .is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn reattaching_replaces_the_channel() {
        let registry = ObserverRegistry::new();
        let mut first = registry.attach(overlay("tab-1", "https://a.test", false)).unwrap();
        let mut second = registry.attach(overlay("tab-1", "https://a.test", false)).unwrap();
        assert_eq!(registry.len(), 1);

        registry.broadcast(&Event::TimerUpdated { timer_state: TimerState::default() });
        assert!(first.try_recv().is_err());
        assert_eq!(second.try_recv().unwrap().name(), "timerUpdated");
    }

    #[test]
    fn unreachable_observers_are_dropped_silently() {
        let registry = ObserverRegistry::new();
        let gone = registry.attach(overlay("tab-1", "https://a.test", false)).unwrap();
        let mut alive = registry.attach(overlay("tab-2", "https://b.test", false)).unwrap();
        drop(gone);

        let delivered = registry.broadcast(&Event::RemoveOverlay {});
        assert_eq!(delivered, 1);
        assert!(!registry.is_attached("tab-1"));
        assert!(alive.try_recv().is_ok());
    }

    #[test]
    fn completion_is_annotated_per_recipient() {
        let registry = ObserverRegistry::new();
        let mut back = registry.attach(overlay("tab-1", "https://a.test", true)).unwrap();
        let mut front = registry.attach(overlay("tab-2", "https://b.test", false)).unwrap();
        assert!(registry.set_foreground("tab-2"));
        assert!(!registry.is_foreground("tab-1"));

        registry.broadcast_completed(None, None);
        let foreground_of = |event: Event| match event {
            Event::TimerCompleted { is_recipient_foreground, .. } => is_recipient_foreground,
            other => panic!("unexpected event {:?}", other),
        };
        assert!(!foreground_of(back.try_recv().unwrap()));
        assert!(foreground_of(front.try_recv().unwrap()));
    }

    #[test]
    fn navigation_to_ineligible_page_is_reported() {
        let registry = ObserverRegistry::new();
        let _rx = registry.attach(overlay("tab-1", "https://a.test", false)).unwrap();
        assert!(registry.update_url("tab-1", Some("https://b.test".to_string())));
        assert!(!registry.update_url("tab-1", Some("about:blank".to_string())));
        assert!(!registry.update_url("tab-9", None));
    }
}
