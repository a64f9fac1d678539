//! Shared application state handed to the HTTP handlers

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use chrono::{DateTime, Utc};
use tracing::warn;

use super::{store::read_timer_state, StateStore, TimerState};
use crate::{
    engine::{Clock, EngineHandle},
    error::StoreResult,
    protocol::ObserverRegistry,
    utils::format_uptime,
};

/// Everything a request handler needs: the engine mailbox for commands, the
/// store for reads, and server metadata
pub struct AppState {
    pub engine: EngineHandle,
    pub store: Arc<dyn StateStore>,
    pub observers: Arc<ObserverRegistry>,
    pub clock: Arc<dyn Clock>,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last command tracking
    pub last_command: Mutex<Option<String>>,
    pub last_command_time: Mutex<Option<DateTime<Utc>>>,
}

impl AppState {
    pub fn new(
        engine: EngineHandle,
        store: Arc<dyn StateStore>,
        observers: Arc<ObserverRegistry>,
        clock: Arc<dyn Clock>,
        port: u16,
        host: String,
    ) -> Self {
        Self {
            engine,
            store,
            observers,
            clock,
            start_time: Instant::now(),
            port,
            host,
            last_command: Mutex::new(None),
            last_command_time: Mutex::new(None),
        }
    }

    /// Read the persisted timer record, defaulting when none exists yet
    pub async fn timer_state(&self) -> StoreResult<TimerState> {
        Ok(read_timer_state(self.store.as_ref()).await?.unwrap_or_default())
    }

    pub fn record_command(&self, action: &str) {
        match self.last_command.lock() {
            Ok(mut last) => *last = Some(action.to_string()),
            Err(e) => warn!("Failed to lock last command: {}", e),
        }
        if let Ok(mut last_time) = self.last_command_time.lock() {
            *last_time = Some(Utc::now());
        }
    }

    /// Get last command information
    pub fn last_command(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_command = self.last_command.lock().ok().and_then(|a| a.clone());
        let last_command_time = self.last_command_time.lock().ok().and_then(|t| *t);
        (last_command, last_command_time)
    }

    pub fn uptime(&self) -> String {
        format_uptime(self.start_time.elapsed())
    }
}
