use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, time::timeout};

use mindful_timer::{
    engine::{spawn_engine, Clock, EngineHandle, ManualClock, TimerEngine},
    protocol::{Attachment, Command, Event, ObserverKind, ObserverRegistry},
    services::{ContentResolver, TokioAlarmScheduler},
    state::{
        store::{read_timer_state, write_timer_state},
        JsonFileStore, MemoryStore, StateStore, TimerMode, TimerState,
    },
    tasks::alarm_dispatch_task,
};

const START_MS: i64 = 1_700_000_000_000;

struct Session {
    engine: EngineHandle,
    store: Arc<dyn StateStore>,
    clock: Arc<ManualClock>,
}

async fn session_with(store: Arc<dyn StateStore>, clock: Arc<ManualClock>) -> Session {
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let (alarms, fired) = TokioAlarmScheduler::new(Arc::clone(&dyn_clock));

    let mut engine = TimerEngine::new(
        Arc::clone(&store),
        Arc::new(alarms),
        Arc::new(ObserverRegistry::new()),
        dyn_clock,
        ContentResolver::new("sounds"),
    );
    engine.install().await.unwrap();
    engine.recover().await.unwrap();

    let (handle, _task) = spawn_engine(engine);
    tokio::spawn(alarm_dispatch_task(handle.clone(), fired));

    Session { engine: handle, store, clock }
}

async fn session() -> Session {
    session_with(Arc::new(MemoryStore::new()), Arc::new(ManualClock::new(START_MS))).await
}

async fn attach_popup(engine: &EngineHandle, id: &str) -> mpsc::UnboundedReceiver<Event> {
    let mut events = engine
        .attach(Attachment {
            observer_id: id.to_string(),
            kind: ObserverKind::Popup,
            url: None,
            foreground: true,
        })
        .await
        .unwrap()
        .unwrap();
    let first = events.recv().await.unwrap();
    assert_eq!(first.name(), "timerUpdated");
    events
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    timeout(Duration::from_secs(120), events.recv())
        .await
        .expect("no event arrived")
        .expect("observer channel closed")
}

async fn persisted(store: &Arc<dyn StateStore>) -> TimerState {
    read_timer_state(store.as_ref()).await.unwrap().unwrap()
}

#[tokio::test(start_paused = true)]
async fn paused_session_completes_at_shifted_deadline() {
    let s = session().await;
    let mut events = attach_popup(&s.engine, "popup").await;

    let start = Command::StartTimer { interval: Some(25), mode: Some(TimerMode::Focus) };
    s.engine.command(start, Some("popup".into())).await.unwrap();
    assert_eq!(next_event(&mut events).await.name(), "timerStarted");

    s.clock.advance_secs(10);
    s.engine.command(Command::PauseTimer {}, None).await.unwrap();
    let paused = next_event(&mut events).await;
    assert_eq!(paused.timer_state().unwrap().time_left, 1490);

    s.clock.advance_secs(30);
    s.engine.command(Command::ResumeTimer {}, None).await.unwrap();
    let resumed = next_event(&mut events).await;
    let deadline = START_MS + 40_000 + 1_490_000;
    assert_eq!(resumed.timer_state().unwrap().end_time, Some(deadline));

    s.clock.set(deadline);
    match next_event(&mut events).await {
        Event::TimerCompleted { quote, sound_ref, is_recipient_foreground } => {
            assert!(quote.is_some());
            assert_eq!(sound_ref.as_deref(), Some("sounds/gentle-bell.mp3"));
            assert!(is_recipient_foreground);
        }
        other => panic!("expected completion, got {:?}", other),
    }

    assert_eq!(persisted(&s.store).await, TimerState::default());
}

#[tokio::test(start_paused = true)]
async fn snooze_after_completion_starts_short_break() {
    let s = session().await;
    let mut events = attach_popup(&s.engine, "popup").await;

    let start = Command::StartTimer { interval: Some(1), mode: None };
    s.engine.command(start, None).await.unwrap();
    next_event(&mut events).await;

    s.clock.advance_secs(60);
    assert_eq!(next_event(&mut events).await.name(), "timerCompleted");

    let outcome = s.engine.command(Command::SnoozeTimer {}, None).await.unwrap();
    assert_eq!(outcome.status, "Timer snoozed");

    let snoozed = next_event(&mut events).await;
    assert_eq!(snoozed.name(), "timerStarted");
    let state = snoozed.timer_state().unwrap();
    assert_eq!(state.mode, TimerMode::ShortBreak);
    assert_eq!(state.interval, 5);
    assert_eq!(state.end_time, Some(s.clock.now_ms() + 300_000));
}

#[tokio::test(start_paused = true)]
async fn reset_before_deadline_never_completes() {
    let s = session().await;
    let mut events = attach_popup(&s.engine, "popup").await;

    let start = Command::StartTimer { interval: Some(1), mode: None };
    s.engine.command(start, None).await.unwrap();
    next_event(&mut events).await;

    s.engine.command(Command::ResetTimer {}, None).await.unwrap();
    assert_eq!(next_event(&mut events).await.name(), "timerReset");

    s.clock.advance_secs(120);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(events.try_recv().is_err());
    assert!(!persisted(&s.store).await.is_active);
}

#[tokio::test]
async fn overdue_session_completes_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timer.json");

    {
        let store = JsonFileStore::open(&path).await.unwrap();
        let running = TimerState::running(15, TimerMode::Custom, START_MS);
        write_timer_state(&store, &running).await.unwrap();
    }

    // The host was down past the deadline
    let clock = Arc::new(ManualClock::new(START_MS + 20 * 60_000));
    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::open(&path).await.unwrap());
    let s = session_with(store, clock).await;

    let mut completed = false;
    for _ in 0..200 {
        if !persisted(&s.store).await.is_active {
            completed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(completed, "overdue alarm never fired");
    assert_eq!(persisted(&s.store).await, TimerState::default());

    let reopened = JsonFileStore::open(&path).await.unwrap();
    let on_disk = read_timer_state(&reopened).await.unwrap().unwrap();
    assert!(!on_disk.is_active);
}
