//! The authoritative timer state machine

use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::Clock;
use crate::{
    error::EngineResult,
    protocol::{
        Attachment, Command, CommandOutcome, Event, LifecycleEvent, LifecycleSignal,
        ObserverRegistry, Transition,
    },
    services::{AlarmScheduler, ContentResolver, TIMER_ALARM_TAG},
    state::{
        store::{read_settings, read_timer_state, write_settings, write_timer_state},
        timer_state::SNOOZE_MINUTES,
        StateStore, TimerMode, TimerState,
    },
};

/// Idle time after which a timer that is not counting down gets reset
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Delay before a deadline that already passed is retried after a failed write
const OVERDUE_RETRY_MS: i64 = 5_000;

/// Sole writer of the persisted [`TimerState`].
///
/// Every transition follows the same order: disarm when leaving the running
/// state, persist, arm when entering it, then push the new state to observers.
/// Calls that do not apply to the current state are no-ops.
pub struct TimerEngine {
    store: Arc<dyn StateStore>,
    alarms: Arc<dyn AlarmScheduler>,
    observers: Arc<ObserverRegistry>,
    clock: Arc<dyn Clock>,
    content: ContentResolver,
    idle_threshold_ms: i64,
    last_activity_ms: i64,
}

impl TimerEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        alarms: Arc<dyn AlarmScheduler>,
        observers: Arc<ObserverRegistry>,
        clock: Arc<dyn Clock>,
        content: ContentResolver,
    ) -> Self {
        let last_activity_ms = clock.now_ms();
        Self {
            store,
            alarms,
            observers,
            clock,
            content,
            idle_threshold_ms: DEFAULT_IDLE_THRESHOLD.as_millis() as i64,
            last_activity_ms,
        }
    }

    pub fn with_idle_threshold(mut self, threshold: Duration) -> Self {
        self.idle_threshold_ms = threshold.as_millis() as i64;
        self
    }

    /// Seed the store with defaults when it holds no timer yet
    pub async fn install(&self) -> EngineResult<bool> {
        if read_timer_state(self.store.as_ref()).await?.is_some() {
            return Ok(false);
        }
        write_settings(self.store.as_ref(), &read_settings(self.store.as_ref()).await?).await?;
        write_timer_state(self.store.as_ref(), &TimerState::default()).await?;
        info!("Installed default timer state and settings");
        Ok(true)
    }

    /// Bring the alarm back in line with the persisted record after a restart
    pub async fn recover(&mut self) -> EngineResult<TimerState> {
        let state = self.current().await?;

        if !state.is_consistent() {
            warn!("Persisted timer state is inconsistent, resetting: {:?}", state);
            return self.reset_state().await;
        }

        match state.end_time.filter(|_| state.is_running()) {
            Some(end_time) => {
                let remaining = state.remaining_seconds(self.clock.now_ms()).unwrap_or(0);
                info!("Recovered running timer, {}s left", remaining);
                self.alarms.arm(TIMER_ALARM_TAG, end_time).await;
            }
            None => {
                self.alarms.disarm(TIMER_ALARM_TAG).await;
                debug!("Recovered timer is not counting down");
            }
        }
        Ok(state)
    }

    /// Current persisted state, or the default if nothing was written yet
    pub async fn current(&self) -> EngineResult<TimerState> {
        Ok(read_timer_state(self.store.as_ref()).await?.unwrap_or_default())
    }

    /// Record observer activity for the idle policy
    pub fn touch(&mut self) {
        self.last_activity_ms = self.clock.now_ms();
    }

    /// Apply a command from an observer
    pub async fn handle(
        &mut self,
        command: Command,
        sender: Option<&str>,
    ) -> EngineResult<CommandOutcome> {
        self.touch();
        debug!("Handling {} from {:?}", command.action(), sender);

        match command {
            Command::StartTimer { interval, mode } => {
                let settings = read_settings(self.store.as_ref()).await?;
                let minutes = settings.session_minutes(interval);
                let state = self.start(minutes, mode.unwrap_or(settings.timer_mode)).await?;
                Ok(CommandOutcome::applied("Timer started", state))
            }
            Command::PauseTimer {} => {
                let (state, applied) = self.pause().await?;
                Ok(if applied {
                    CommandOutcome::applied("Timer paused", state)
                } else {
                    CommandOutcome::unchanged("Timer not running", state)
                })
            }
            Command::ResumeTimer {} => {
                let (state, applied) = self.resume().await?;
                Ok(if applied {
                    CommandOutcome::applied("Timer resumed", state)
                } else {
                    CommandOutcome::unchanged("Timer not paused", state)
                })
            }
            Command::ResetTimer {} => {
                let state = self.reset().await?;
                Ok(CommandOutcome::applied("Timer reset", state))
            }
            Command::SnoozeTimer {} => {
                let state = self.snooze().await?;
                Ok(CommandOutcome::applied("Timer snoozed", state))
            }
            Command::GlobalRestart {} => {
                let state = self.restart().await?;
                Ok(CommandOutcome::applied("Timer restarted", state))
            }
            Command::CloseOverlay {} => {
                let closed = sender.is_some_and(|id| self.close_overlay(id));
                Ok(CommandOutcome::view_only(
                    if closed { "Overlay closed" } else { "No overlay to close" },
                    closed,
                ))
            }
        }
    }

    /// Start a countdown of `minutes`. Always permitted.
    pub async fn start(&mut self, minutes: u32, mode: TimerMode) -> EngineResult<TimerState> {
        let state = TimerState::running(minutes, mode, self.clock.now_ms());
        self.persist(&state).await?;
        if let Some(end_time) = state.end_time {
            self.alarms.arm(TIMER_ALARM_TAG, end_time).await;
        }
        info!("Timer started: {} minutes ({})", minutes, mode.as_str());
        self.announce(Transition::Started, &state);
        Ok(state)
    }

    /// Freeze a running countdown. Returns the state and whether it changed.
    pub async fn pause(&mut self) -> EngineResult<(TimerState, bool)> {
        let current = self.current().await?;
        let Some(paused) = current.paused_at(self.clock.now_ms()) else {
            debug!("Pause ignored, timer not running");
            return Ok((current, false));
        };

        self.alarms.disarm(TIMER_ALARM_TAG).await;
        if let Err(e) = self.persist(&paused).await {
            self.restore_alarm(&current).await;
            return Err(e);
        }

        info!("Timer paused with {}s left", paused.time_left);
        self.announce(Transition::Paused, &paused);
        Ok((paused, true))
    }

    /// Continue a paused countdown. Returns the state and whether it changed.
    pub async fn resume(&mut self) -> EngineResult<(TimerState, bool)> {
        let current = self.current().await?;
        let Some(resumed) = current.resumed_at(self.clock.now_ms()) else {
            debug!("Resume ignored, timer not paused or nothing left");
            return Ok((current, false));
        };

        self.persist(&resumed).await?;
        if let Some(end_time) = resumed.end_time {
            self.alarms.arm(TIMER_ALARM_TAG, end_time).await;
        }

        info!("Timer resumed with {}s left", resumed.time_left);
        self.announce(Transition::Resumed, &resumed);
        Ok((resumed, true))
    }

    /// Overwrite the record with the default inactive state
    pub async fn reset(&mut self) -> EngineResult<TimerState> {
        let state = self.reset_state().await?;
        info!("Timer reset");
        self.announce(Transition::Reset, &state);
        Ok(state)
    }

    /// Five-minute short break, whatever ran before
    pub async fn snooze(&mut self) -> EngineResult<TimerState> {
        info!("Timer snoozed");
        self.start(SNOOZE_MINUTES, TimerMode::ShortBreak).await
    }

    /// Reset, then start again with the configured interval and mode
    pub async fn restart(&mut self) -> EngineResult<TimerState> {
        self.reset().await?;
        let settings = read_settings(self.store.as_ref()).await?;
        self.start(settings.session_minutes(None), settings.timer_mode).await
    }

    /// Handle a fired alarm. Returns the post-completion state when the alarm
    /// completed a session, `None` when it was stale or not ours.
    pub async fn on_alarm(&mut self, tag: &str) -> EngineResult<Option<TimerState>> {
        if tag != TIMER_ALARM_TAG {
            debug!("Ignoring alarm {}", tag);
            return Ok(None);
        }

        let current = self.current().await?;
        if !(current.is_active && !current.is_paused) {
            debug!("Stale alarm ignored, timer no longer running");
            return Ok(None);
        }

        // Observers learn about the reset from timerCompleted and the store change
        let state = self.reset_state().await?;
        let settings = read_settings(self.store.as_ref()).await?;
        let quote = self.content.pick_quote(&settings);
        let sound_ref = self.content.sound_ref(&settings);

        let delivered = self.observers.broadcast_completed(quote, sound_ref);
        info!(
            "Timer completed ({} mode), notified {} observer(s)",
            current.mode.as_str(),
            delivered
        );
        Ok(Some(state))
    }

    /// Reset a timer that is not counting down once nobody has been active
    /// for longer than the idle threshold. Returns true if it reset.
    pub async fn idle_check(&mut self) -> EngineResult<bool> {
        let idle_ms = self.clock.now_ms() - self.last_activity_ms;
        if idle_ms <= self.idle_threshold_ms {
            return Ok(false);
        }

        let current = self.current().await?;
        if !current.is_idle() || current == TimerState::default() {
            return Ok(false);
        }

        self.reset().await?;
        info!("Auto-reset after {}s idle", idle_ms / 1000);
        Ok(true)
    }

    /// Attach an observer and hand it the current state straight away
    pub async fn attach(
        &mut self,
        attachment: Attachment,
    ) -> EngineResult<Option<mpsc::UnboundedReceiver<Event>>> {
        let observer_id = attachment.observer_id.clone();
        if attachment.foreground {
            self.touch();
        }

        let Some(rx) = self.observers.attach(attachment) else {
            return Ok(None);
        };
        let state = self.current().await?;
        self.observers
            .send_to(&observer_id, Event::transition(Transition::Updated, state));
        Ok(Some(rx))
    }

    /// React to a tab or popup lifecycle signal
    pub async fn lifecycle(&mut self, signal: LifecycleSignal) -> EngineResult<bool> {
        let id = signal.observer_id.as_str();
        match signal.event {
            LifecycleEvent::Activated => {
                self.touch();
                if !self.observers.set_foreground(id) {
                    debug!("Activated observer {} is not attached", id);
                    return Ok(false);
                }
                self.refresh_observer(id).await
            }
            LifecycleEvent::Updated => {
                if !self.observers.is_attached(id) {
                    return Ok(false);
                }
                if !self.observers.update_url(id, signal.url) {
                    self.observers.send_to(id, Event::RemoveOverlay {});
                    self.observers.detach(id);
                    return Ok(false);
                }
                self.refresh_observer(id).await
            }
            LifecycleEvent::Removed => Ok(self.observers.detach(id)),
        }
    }

    async fn refresh_observer(&self, observer_id: &str) -> EngineResult<bool> {
        let state = self.current().await?;
        Ok(self
            .observers
            .send_to(observer_id, Event::transition(Transition::Updated, state)))
    }

    fn close_overlay(&self, observer_id: &str) -> bool {
        let delivered = self.observers.send_to(observer_id, Event::RemoveOverlay {});
        self.observers.detach(observer_id);
        if delivered {
            info!("Overlay {} closed", observer_id);
        }
        delivered
    }

    async fn reset_state(&mut self) -> EngineResult<TimerState> {
        let previous = self.current().await?;
        let state = TimerState::default();
        self.alarms.disarm(TIMER_ALARM_TAG).await;
        if let Err(e) = self.persist(&state).await {
            self.restore_alarm(&previous).await;
            return Err(e);
        }
        Ok(state)
    }

    /// Re-arm the alarm of a record that is still persisted as running after
    /// a failed write. A deadline already behind us is retried shortly, so a
    /// fired alarm whose completion could not be written fires again.
    async fn restore_alarm(&self, persisted: &TimerState) {
        let Some(end_time) = persisted.end_time.filter(|_| persisted.is_running()) else {
            return;
        };
        let now = self.clock.now_ms();
        let fire_at = if end_time > now { end_time } else { now + OVERDUE_RETRY_MS };
        warn!("Write failed, keeping alarm for running timer (fires at {})", fire_at);
        self.alarms.arm(TIMER_ALARM_TAG, fire_at).await;
    }

    async fn persist(&self, state: &TimerState) -> EngineResult<()> {
        write_timer_state(self.store.as_ref(), state).await.map_err(|e| {
            error!("Failed to persist timer state: {}", e);
            e.into()
        })
    }

    fn announce(&self, transition: Transition, state: &TimerState) {
        let event = Event::transition(transition, state.clone());
        let name = event.name();
        let delivered = self.observers.broadcast(&event);
        debug!("Broadcast {} to {} observer(s)", name, delivered);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, Ordering},
            Mutex,
        },
    };

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::broadcast;

    use super::*;
    use crate::{
        engine::ManualClock,
        error::{EngineError, StoreError, StoreResult},
        protocol::ObserverKind,
        state::{MemoryStore, Settings, StoreChange},
    };

    /// Alarm table without tasks; tests fire alarms by hand
    #[derive(Default)]
    struct RecordingAlarms {
        armed: Mutex<HashMap<String, i64>>,
    }

    #[async_trait]
    impl AlarmScheduler for RecordingAlarms {
        async fn arm(&self, tag: &str, fire_at_ms: i64) {
            self.armed.lock().unwrap().insert(tag.to_string(), fire_at_ms);
        }

        async fn disarm(&self, tag: &str) -> bool {
            self.armed.lock().unwrap().remove(tag).is_some()
        }

        async fn armed(&self, tag: &str) -> Option<i64> {
            self.armed.lock().unwrap().get(tag).copied()
        }
    }

    /// Store whose writes can be made to fail
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    #[async_trait]
    impl StateStore for FlakyStore {
        async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Io {
                    path: "flaky".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            self.inner.set(key, value).await
        }

        fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
            self.inner.subscribe()
        }
    }

    struct Harness {
        engine: TimerEngine,
        clock: Arc<ManualClock>,
        alarms: Arc<RecordingAlarms>,
        observers: Arc<ObserverRegistry>,
        store: Arc<dyn StateStore>,
    }

    impl Harness {
        fn with_store(store: Arc<dyn StateStore>) -> Self {
            let clock = Arc::new(ManualClock::new(0));
            let alarms = Arc::new(RecordingAlarms::default());
            let observers = Arc::new(ObserverRegistry::new());
            let engine = TimerEngine::new(
                Arc::clone(&store),
                alarms.clone(),
                Arc::clone(&observers),
                clock.clone(),
                ContentResolver::default(),
            );
            Self { engine, clock, alarms, observers, store }
        }

        fn new() -> Self {
            Self::with_store(Arc::new(MemoryStore::new()))
        }

        async fn armed(&self) -> Option<i64> {
            self.alarms.armed(TIMER_ALARM_TAG).await
        }

        async fn persisted(&self) -> TimerState {
            read_timer_state(self.store.as_ref()).await.unwrap().unwrap()
        }

        fn popup(&self, id: &str) -> mpsc::UnboundedReceiver<Event> {
            self.observers
                .attach(Attachment {
                    observer_id: id.to_string(),
                    kind: ObserverKind::Popup,
                    url: None,
                    foreground: false,
                })
                .unwrap()
        }
    }

    #[tokio::test]
    async fn start_sets_deadline_and_arms_alarm() {
        let mut h = Harness::new();
        h.clock.set(1_000);
        let mut popup = h.popup("popup");

        let state = h.engine.start(25, TimerMode::Focus).await.unwrap();
        assert_eq!(state.end_time.unwrap() - state.start_time.unwrap(), 25 * 60 * 1000);
        assert_eq!(state.time_left, 1500);
        assert_eq!(h.persisted().await, state);
        assert_eq!(h.armed().await, state.end_time);
        assert_eq!(popup.try_recv().unwrap(), Event::TimerStarted { timer_state: state });
    }

    #[tokio::test]
    async fn pause_then_resume_preserves_remaining_time() {
        let mut h = Harness::new();
        h.engine.start(25, TimerMode::Focus).await.unwrap();

        h.clock.set(10_400);
        let (paused, applied) = h.engine.pause().await.unwrap();
        assert!(applied);
        assert_eq!(paused.time_left, 1489);
        assert!(paused.end_time.is_none());
        assert_eq!(h.armed().await, None);

        h.clock.set(70_000);
        let (resumed, applied) = h.engine.resume().await.unwrap();
        assert!(applied);
        assert_eq!(resumed.end_time.unwrap() - 70_000, 1489 * 1000);
        assert_eq!(h.armed().await, resumed.end_time);
    }

    #[tokio::test]
    async fn guarded_commands_are_idempotent() {
        let mut h = Harness::new();

        let (idle, applied) = h.engine.resume().await.unwrap();
        assert!(!applied);
        assert_eq!(idle, TimerState::default());

        h.engine.start(5, TimerMode::Custom).await.unwrap();
        let (_, applied) = h.engine.resume().await.unwrap();
        assert!(!applied);

        h.clock.advance_secs(60);
        let (first, _) = h.engine.pause().await.unwrap();
        h.clock.advance_secs(60);
        let (second, applied) = h.engine.pause().await.unwrap();
        assert!(!applied);
        assert_eq!(first, second);
        assert_eq!(h.persisted().await, first);
    }

    #[tokio::test]
    async fn snooze_always_uses_short_break() {
        let mut h = Harness::new();
        h.engine.start(50, TimerMode::LongBreak).await.unwrap();

        let state = h.engine.snooze().await.unwrap();
        assert_eq!(state.mode, TimerMode::ShortBreak);
        assert_eq!(state.interval, 5);
        assert_eq!(state.time_left, 300);
        assert_eq!(h.armed().await, state.end_time);
    }

    #[tokio::test]
    async fn restart_uses_configured_settings() {
        let mut h = Harness::new();
        let settings = Settings { interval: 25, timer_mode: TimerMode::Focus, ..Settings::default() };
        write_settings(h.store.as_ref(), &settings).await.unwrap();
        h.engine.start(5, TimerMode::ShortBreak).await.unwrap();

        let mut popup = h.popup("popup");
        let state = h.engine.restart().await.unwrap();
        assert_eq!(state.interval, 25);
        assert_eq!(state.mode, TimerMode::Focus);
        assert_eq!(popup.try_recv().unwrap().name(), "timerReset");
        assert_eq!(popup.try_recv().unwrap().name(), "timerStarted");
    }

    #[tokio::test]
    async fn start_command_without_interval_uses_settings() {
        let mut h = Harness::new();
        let outcome = h
            .engine
            .handle(Command::StartTimer { interval: None, mode: None }, None)
            .await
            .unwrap();
        let state = outcome.timer_state.unwrap();
        assert_eq!(state.interval, 15);
        assert_eq!(state.mode, TimerMode::Custom);
        assert!(outcome.applied);
    }

    #[tokio::test]
    async fn alarm_completes_running_timer_once() {
        let mut h = Harness::new();
        let mut popup = h.popup("popup");
        h.observers.set_foreground("popup");
        let started = h.engine.start(1, TimerMode::Focus).await.unwrap();
        popup.try_recv().unwrap();

        h.clock.set(started.end_time.unwrap());
        let done = h.engine.on_alarm(TIMER_ALARM_TAG).await.unwrap();
        assert_eq!(done, Some(TimerState::default()));
        assert_eq!(h.persisted().await, TimerState::default());
        assert_eq!(h.armed().await, None);

        match popup.try_recv().unwrap() {
            Event::TimerCompleted { quote, sound_ref, is_recipient_foreground } => {
                assert!(quote.is_some());
                assert_eq!(sound_ref.as_deref(), Some("sounds/gentle-bell.mp3"));
                assert!(is_recipient_foreground);
            }
            other => panic!("unexpected event {:?}", other),
        }

        // A second delivery of the same alarm finds nothing running
        assert_eq!(h.engine.on_alarm(TIMER_ALARM_TAG).await.unwrap(), None);
        assert!(popup.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_or_foreign_alarms_are_ignored() {
        let mut h = Harness::new();
        h.engine.start(1, TimerMode::Focus).await.unwrap();
        assert_eq!(h.engine.on_alarm("someOtherAlarm").await.unwrap(), None);

        h.clock.advance_secs(10);
        h.engine.pause().await.unwrap();
        assert_eq!(h.engine.on_alarm(TIMER_ALARM_TAG).await.unwrap(), None);
        assert!(h.persisted().await.is_paused);
    }

    #[tokio::test]
    async fn idle_check_resets_paused_timer_after_threshold() {
        let mut h = Harness::new();
        h.engine.start(25, TimerMode::Focus).await.unwrap();
        h.clock.advance_secs(60);
        h.engine.pause().await.unwrap();
        h.engine.touch();

        h.clock.advance_secs(299);
        assert!(!h.engine.idle_check().await.unwrap());
        assert!(h.persisted().await.is_paused);

        h.clock.advance_secs(2);
        assert!(h.engine.idle_check().await.unwrap());
        assert_eq!(h.persisted().await, TimerState::default());
    }

    #[tokio::test]
    async fn idle_check_leaves_running_timer_alone() {
        let mut h = Harness::new();
        h.engine.start(60, TimerMode::Focus).await.unwrap();
        h.clock.advance_secs(10 * 60);

        assert!(!h.engine.idle_check().await.unwrap());
        assert!(h.persisted().await.is_running());
    }

    #[tokio::test]
    async fn at_most_one_alarm_tracks_running_state() {
        let mut h = Harness::new();
        let steps: Vec<Command> = vec![
            Command::StartTimer { interval: Some(10), mode: None },
            Command::PauseTimer {},
            Command::PauseTimer {},
            Command::ResumeTimer {},
            Command::SnoozeTimer {},
            Command::ResetTimer {},
            Command::ResumeTimer {},
            Command::StartTimer { interval: Some(3), mode: Some(TimerMode::Focus) },
            Command::GlobalRestart {},
            Command::PauseTimer {},
        ];

        for command in steps {
            h.clock.advance_secs(7);
            h.engine.handle(command, None).await.unwrap();
            let state = h.persisted().await;
            assert!(state.is_consistent());
            assert_eq!(h.armed().await, state.end_time);
            assert!(h.alarms.armed.lock().unwrap().len() <= 1);
        }
    }

    #[tokio::test]
    async fn store_failure_rejects_command_and_keeps_alarm() {
        let store = Arc::new(FlakyStore { inner: MemoryStore::new(), failing: AtomicBool::new(false) });
        let mut h = Harness::with_store(store.clone());
        let started = h.engine.start(25, TimerMode::Focus).await.unwrap();

        store.failing.store(true, Ordering::SeqCst);
        h.clock.advance_secs(30);
        let err = h.engine.handle(Command::PauseTimer {}, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
        assert_eq!(h.armed().await, started.end_time);

        // Resending once the store recovers is safe
        store.failing.store(false, Ordering::SeqCst);
        let outcome = h.engine.handle(Command::PauseTimer {}, None).await.unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.timer_state.unwrap().time_left, 1470);
    }

    #[tokio::test]
    async fn failed_reset_keeps_running_alarm() {
        let store = Arc::new(FlakyStore { inner: MemoryStore::new(), failing: AtomicBool::new(false) });
        let mut h = Harness::with_store(store.clone());
        let started = h.engine.start(25, TimerMode::Focus).await.unwrap();

        store.failing.store(true, Ordering::SeqCst);
        let err = h.engine.handle(Command::ResetTimer {}, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
        assert_eq!(h.persisted().await, started);
        assert_eq!(h.armed().await, started.end_time);

        let err = h.engine.handle(Command::GlobalRestart {}, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
        assert_eq!(h.armed().await, started.end_time);
    }

    #[tokio::test]
    async fn failed_completion_write_retries_alarm() {
        let store = Arc::new(FlakyStore { inner: MemoryStore::new(), failing: AtomicBool::new(false) });
        let mut h = Harness::with_store(store.clone());
        let mut popup = h.popup("popup");
        let started = h.engine.start(1, TimerMode::Focus).await.unwrap();
        popup.try_recv().unwrap();

        // The scheduler drops an alarm from its table once it fires
        let deadline = started.end_time.unwrap();
        h.clock.set(deadline);
        h.alarms.disarm(TIMER_ALARM_TAG).await;

        store.failing.store(true, Ordering::SeqCst);
        assert!(h.engine.on_alarm(TIMER_ALARM_TAG).await.is_err());
        assert!(h.persisted().await.is_running());
        assert_eq!(h.armed().await, Some(deadline + OVERDUE_RETRY_MS));
        assert!(popup.try_recv().is_err());

        store.failing.store(false, Ordering::SeqCst);
        h.clock.set(deadline + OVERDUE_RETRY_MS);
        h.alarms.disarm(TIMER_ALARM_TAG).await;
        assert_eq!(
            h.engine.on_alarm(TIMER_ALARM_TAG).await.unwrap(),
            Some(TimerState::default())
        );
        assert_eq!(h.armed().await, None);
        assert_eq!(popup.try_recv().unwrap().name(), "timerCompleted");
    }

    #[tokio::test]
    async fn alarm_tracks_record_when_writes_fail() {
        let store = Arc::new(FlakyStore { inner: MemoryStore::new(), failing: AtomicBool::new(false) });
        let mut h = Harness::with_store(store.clone());
        let steps: Vec<(Command, bool)> = vec![
            (Command::StartTimer { interval: Some(10), mode: None }, false),
            (Command::PauseTimer {}, true),
            (Command::ResetTimer {}, true),
            (Command::SnoozeTimer {}, true),
            (Command::GlobalRestart {}, true),
            (Command::PauseTimer {}, false),
            (Command::ResumeTimer {}, true),
            (Command::ResetTimer {}, true),
            (Command::ResumeTimer {}, false),
            (Command::SnoozeTimer {}, false),
            (Command::GlobalRestart {}, true),
            (Command::StartTimer { interval: Some(3), mode: None }, true),
            (Command::ResetTimer {}, false),
        ];

        for (command, failing) in steps {
            h.clock.advance_secs(7);
            store.failing.store(failing, Ordering::SeqCst);
            let action = command.action();
            let result = h.engine.handle(command, None).await;
            store.failing.store(false, Ordering::SeqCst);

            let state = h.persisted().await;
            assert!(state.is_consistent(), "{} left {:?}", action, state);
            assert_eq!(h.armed().await, state.end_time, "after {}", action);
            if !failing {
                assert!(result.is_ok());
            }
        }
    }

    #[tokio::test]
    async fn close_overlay_is_view_only() {
        let mut h = Harness::new();
        h.engine.start(25, TimerMode::Focus).await.unwrap();
        let mut overlay = h
            .observers
            .attach(Attachment {
                observer_id: "tab-7".to_string(),
                kind: ObserverKind::Overlay,
                url: Some("https://example.com".to_string()),
                foreground: true,
            })
            .unwrap();

        let outcome = h.engine.handle(Command::CloseOverlay {}, Some("tab-7")).await.unwrap();
        assert!(outcome.applied);
        assert_eq!(overlay.try_recv().unwrap(), Event::RemoveOverlay {});
        assert!(!h.observers.is_attached("tab-7"));
        assert!(h.persisted().await.is_running());

        let outcome = h.engine.handle(Command::CloseOverlay {}, None).await.unwrap();
        assert!(!outcome.applied);
    }

    #[tokio::test]
    async fn install_and_recover_rearm_persisted_deadline() {
        let mut h = Harness::new();
        assert!(h.engine.install().await.unwrap());
        assert!(!h.engine.install().await.unwrap());
        assert_eq!(read_settings(h.store.as_ref()).await.unwrap(), Settings::default());

        let running = TimerState::running(25, TimerMode::Focus, 0);
        write_timer_state(h.store.as_ref(), &running).await.unwrap();
        let recovered = h.engine.recover().await.unwrap();
        assert_eq!(recovered, running);
        assert_eq!(h.armed().await, running.end_time);
    }

    #[tokio::test]
    async fn recover_repairs_inconsistent_record() {
        let mut h = Harness::new();
        let broken = TimerState { is_paused: true, ..TimerState::default() };
        write_timer_state(h.store.as_ref(), &broken).await.unwrap();

        assert_eq!(h.engine.recover().await.unwrap(), TimerState::default());
        assert_eq!(h.persisted().await, TimerState::default());
        assert_eq!(h.armed().await, None);
    }

    #[tokio::test]
    async fn attach_pushes_current_state_and_lifecycle_reattaches() {
        let mut h = Harness::new();
        let started = h.engine.start(25, TimerMode::Focus).await.unwrap();

        let mut rx = h
            .engine
            .attach(Attachment {
                observer_id: "tab-1".to_string(),
                kind: ObserverKind::Overlay,
                url: Some("https://a.test".to_string()),
                foreground: false,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), Event::TimerUpdated { timer_state: started.clone() });

        let signal = |event, url: Option<&str>| LifecycleSignal {
            observer_id: "tab-1".to_string(),
            event,
            url: url.map(str::to_string),
        };

        assert!(h.engine.lifecycle(signal(LifecycleEvent::Activated, None)).await.unwrap());
        assert!(h.observers.is_foreground("tab-1"));
        assert_eq!(rx.try_recv().unwrap().name(), "timerUpdated");

        let navigated = signal(LifecycleEvent::Updated, Some("chrome://newtab"));
        assert!(!h.engine.lifecycle(navigated).await.unwrap());
        assert_eq!(rx.try_recv().unwrap(), Event::RemoveOverlay {});
        assert!(!h.observers.is_attached("tab-1"));
    }
}
