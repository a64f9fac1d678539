//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        Json,
    },
};
use futures::stream::{self, Stream};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::responses::{
    CommandQuery, CommandResponse, EventsQuery, HealthResponse, LifecycleRequest,
    LifecycleResponse, StateResponse,
};
use crate::{
    observer::IDLE_PLACEHOLDER,
    protocol::{Attachment, Command, LifecycleSignal},
    state::AppState,
    utils::format_mmss,
};

/// Handle POST /command - Apply a command from an observer
///
/// Always answers. Unparseable bodies and unknown actions get `Unknown action`,
/// a known action with bad fields gets `Invalid <action> command`, and store
/// failures get a 500 with the error attached.
pub async fn command_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CommandQuery>,
    body: Bytes,
) -> Result<Json<CommandResponse>, (StatusCode, Json<CommandResponse>)> {
    let value: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let command = match serde_json::from_value::<Command>(value.clone()) {
        Ok(command) => command,
        Err(e) => {
            let known = value
                .get("action")
                .and_then(Value::as_str)
                .filter(|action| Command::is_known_action(action));
            return Ok(Json(match known {
                Some(action) => {
                    warn!("Malformed {} command: {}", action, e);
                    CommandResponse::malformed(action, e.to_string())
                }
                None => {
                    warn!("Received unknown action: {}", String::from_utf8_lossy(&body));
                    CommandResponse::unknown_action()
                }
            }));
        }
    };

    let action = command.action();
    state.record_command(action);

    match state.engine.command(command, query.observer).await {
        Ok(outcome) => {
            info!("Command {}: {}", action, outcome.status);
            Ok(Json(CommandResponse::from_outcome(outcome)))
        }
        Err(e) => {
            error!("Command {} rejected: {}", action, e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CommandResponse::error(e.to_string())),
            ))
        }
    }
}

/// Handle GET /state - Return the persisted timer and its derived display
pub async fn state_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StateResponse>, StatusCode> {
    let timer_state = match state.timer_state().await {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to read timer state: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let remaining_seconds = timer_state.remaining_seconds(state.clock.now_ms());
    let display_text = remaining_seconds
        .map(format_mmss)
        .unwrap_or_else(|| IDLE_PLACEHOLDER.to_string());
    let (last_command, last_command_time) = state.last_command();

    Ok(Json(StateResponse {
        timer_state,
        remaining_seconds,
        display_text,
        observers: state.observers.len(),
        uptime: state.uptime(),
        port: state.port,
        host: state.host.clone(),
        last_command,
        last_command_time,
    }))
}

/// Handle GET /events - Attach an observer and stream its events
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, axum::Error>>>, StatusCode> {
    let attachment = Attachment {
        observer_id: query.observer,
        kind: query.kind,
        url: query.url,
        foreground: query.foreground,
    };
    let observer_id = attachment.observer_id.clone();

    let events = match state.engine.attach(attachment).await {
        Ok(Some(events)) => events,
        Ok(None) => {
            debug!("Observer {} is not eligible for events", observer_id);
            return Err(StatusCode::UNPROCESSABLE_ENTITY);
        }
        Err(e) => {
            error!("Failed to attach observer {}: {}", observer_id, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let stream = stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        let sse = SseEvent::default().event(event.name()).json_data(&event);
        Some((sse, events))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Handle POST /observers/:id/lifecycle - Tab or popup lifecycle signal
pub async fn lifecycle_handler(
    State(state): State<Arc<AppState>>,
    Path(observer_id): Path<String>,
    Json(request): Json<LifecycleRequest>,
) -> Result<Json<LifecycleResponse>, StatusCode> {
    let signal = LifecycleSignal {
        observer_id: observer_id.clone(),
        event: request.event,
        url: request.url,
    };

    match state.engine.lifecycle(signal).await {
        Ok(attached) => Ok(Json(LifecycleResponse { observer: observer_id, attached })),
        Err(e) => {
            error!("Lifecycle signal for {} failed: {}", observer_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
