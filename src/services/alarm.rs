//! Wall-clock one-shot alarms keyed by tag

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::engine::Clock;

/// Tag of the single alarm that completes the mindfulness timer
pub const TIMER_ALARM_TAG: &str = "mindfulnessTimer";

/// Longest single sleep before the wall clock is consulted again. Monotonic
/// timers stall while the host is suspended, the wall clock does not.
const MAX_SLEEP: Duration = Duration::from_secs(15);

/// One-shot alarm facility. Arming a tag replaces any alarm already armed
/// under that tag.
#[async_trait]
pub trait AlarmScheduler: Send + Sync {
    async fn arm(&self, tag: &str, fire_at_ms: i64);

    /// Returns true if an alarm was armed under `tag`
    async fn disarm(&self, tag: &str) -> bool;

    /// Fire time of the alarm armed under `tag`, if any
    async fn armed(&self, tag: &str) -> Option<i64>;
}

#[derive(Debug)]
struct ArmedAlarm {
    fire_at_ms: i64,
    generation: u64,
    task: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct AlarmTable {
    alarms: HashMap<String, ArmedAlarm>,
    next_generation: u64,
}

/// Alarm scheduler backed by tokio tasks.
///
/// Fired tags are delivered on the receiver returned by [`TokioAlarmScheduler::new`].
pub struct TokioAlarmScheduler {
    clock: Arc<dyn Clock>,
    table: Arc<Mutex<AlarmTable>>,
    fired_tx: mpsc::UnboundedSender<String>,
}

impl TokioAlarmScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            clock,
            table: Arc::new(Mutex::new(AlarmTable::default())),
            fired_tx,
        };
        (scheduler, fired_rx)
    }

    fn spawn_alarm(&self, tag: String, fire_at_ms: i64, generation: u64) -> JoinHandle<()> {
        let clock = Arc::clone(&self.clock);
        let table = Arc::clone(&self.table);
        let fired_tx = self.fired_tx.clone();

        tokio::spawn(async move {
            loop {
                let remaining_ms = fire_at_ms.saturating_sub(clock.now_ms());
                if remaining_ms <= 0 {
                    break;
                }
                sleep(Duration::from_millis(remaining_ms as u64).min(MAX_SLEEP)).await;
            }

            // A newer alarm may have replaced this one while we were waking up
            let current = match table.lock() {
                Ok(mut table) => {
                    let current = table
                        .alarms
                        .get(&tag)
                        .is_some_and(|alarm| alarm.generation == generation);
                    if current {
                        table.alarms.remove(&tag);
                    }
                    current
                }
                Err(e) => {
                    warn!("Failed to lock alarm table: {}", e);
                    false
                }
            };

            if current {
                info!("Alarm {} fired", tag);
                if fired_tx.send(tag).is_err() {
                    warn!("Alarm fired but nobody is listening");
                }
            }
        })
    }
}

#[async_trait]
impl AlarmScheduler for TokioAlarmScheduler {
    async fn arm(&self, tag: &str, fire_at_ms: i64) {
        let Ok(mut table) = self.table.lock() else {
            warn!("Failed to lock alarm table, alarm {} not armed", tag);
            return;
        };

        table.next_generation += 1;
        let generation = table.next_generation;
        let task = self.spawn_alarm(tag.to_string(), fire_at_ms, generation);

        if let Some(previous) = table.alarms.insert(
            tag.to_string(),
            ArmedAlarm { fire_at_ms, generation, task },
        ) {
            previous.task.abort();
            debug!("Alarm {} superseded (was due at {})", tag, previous.fire_at_ms);
        }
        debug!("Alarm {} armed for {}", tag, fire_at_ms);
    }

    async fn disarm(&self, tag: &str) -> bool {
        let Ok(mut table) = self.table.lock() else {
            warn!("Failed to lock alarm table, alarm {} not disarmed", tag);
            return false;
        };

        match table.alarms.remove(tag) {
            Some(alarm) => {
                alarm.task.abort();
                debug!("Alarm {} disarmed", tag);
                true
            }
            None => false,
        }
    }

    async fn armed(&self, tag: &str) -> Option<i64> {
        self.table
            .lock()
            .ok()
            .and_then(|table| table.alarms.get(tag).map(|alarm| alarm.fire_at_ms))
    }
}
