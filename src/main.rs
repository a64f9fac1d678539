//! Mindful Timer - a break countdown shared by every open popup and page
//!
//! This is the main entry point for the mindful-timer daemon.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use mindful_timer::{
    api::create_router,
    config::Config,
    engine::{spawn_engine, Clock, SystemClock, TimerEngine},
    protocol::ObserverRegistry,
    services::{ContentResolver, TokioAlarmScheduler},
    state::{AppState, JsonFileStore, StateStore},
    tasks::{alarm_dispatch_task, console_observer_task, idle_reset_task},
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("mindful_timer={},tower_http=info", config.log_level()))
        .init();

    info!("Starting mindful-timer server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: host={}, port={}, state={}, idle={}s",
        config.host,
        config.port,
        config.state_file.display(),
        config.idle_threshold_secs
    );

    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::open(&config.state_file).await?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (alarms, fired_rx) = TokioAlarmScheduler::new(Arc::clone(&clock));
    let observers = Arc::new(ObserverRegistry::new());

    let mut engine = TimerEngine::new(
        Arc::clone(&store),
        Arc::new(alarms),
        Arc::clone(&observers),
        Arc::clone(&clock),
        ContentResolver::new(config.sound_base.clone()),
    )
    .with_idle_threshold(config.idle_threshold());

    engine.install().await?;
    let recovered = engine.recover().await?;
    info!(
        "Timer state: active={}, paused={}, timeLeft={}s",
        recovered.is_active, recovered.is_paused, recovered.time_left
    );

    let (handle, engine_task) = spawn_engine(engine);

    tokio::spawn(alarm_dispatch_task(handle.clone(), fired_rx));
    tokio::spawn(idle_reset_task(handle.clone(), config.idle_check_period()));
    if config.console_observer {
        tokio::spawn(console_observer_task(
            handle.clone(),
            Arc::clone(&store),
            Arc::clone(&clock),
        ));
    }

    let state = Arc::new(AppState::new(
        handle,
        store,
        observers,
        clock,
        config.port,
        config.host.clone(),
    ));
    let app = create_router(state);

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /command                   - Send a timer command");
    info!("  GET  /state                     - Current timer record and display");
    info!("  GET  /events?observer=ID        - Attach an observer (event stream)");
    info!("  POST /observers/ID/lifecycle    - Tab activated, updated or removed");
    info!("  GET  /health                    - Health check");

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    engine_task.abort();
    info!("Server shutdown complete");
    Ok(())
}
