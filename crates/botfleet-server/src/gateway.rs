//! Route handlers.

use std::convert::Infallible;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use botfleet_core::InstanceId;
use botfleet_hub::{Frame, InstanceSummary, SubscriberHandle};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::health::{HealthResponse, health_check};
use crate::server::AppState;

/// `GET /instances`
pub async fn list_instances(State(state): State<AppState>) -> Json<Vec<InstanceSummary>> {
    Json(state.hub.list_instances())
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health_check(
        state.start_time,
        state.hub.instance_count(),
        state.hub.subscriber_count(),
    ))
}

/// `GET /events/{id}`: `meta`, then `status`, then unnamed log events and
/// later `status` events. The subscription is released when the client
/// goes away or the server shuts down.
pub async fn events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, GatewayError> {
    let id = InstanceId::from(id);
    let handle = state
        .hub
        .subscribe(&id)
        .map_err(|_| GatewayError::InstanceNotFound(id.clone()))?;
    info!(instance_id = %id, subscriber_id = %handle.id(), "event stream opened");

    let stream = frames(handle)
        .map(|frame| Ok(to_event(&frame)))
        .take_until(state.shutdown.token().cancelled_owned());
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(state.keep_alive)))
}

fn frames(handle: SubscriberHandle) -> impl Stream<Item = Frame> {
    futures::stream::unfold(handle, |handle| async move {
        match handle.recv().await {
            Some(frame) => Some((frame, handle)),
            None => {
                debug!(subscriber_id = %handle.id(), "subscription closed by hub");
                None
            }
        }
    })
}

fn to_event(frame: &Frame) -> Event {
    match frame.to_json() {
        Ok(data) => {
            let event = Event::default().data(data);
            match frame.event_name() {
                Some(name) => event.event(name),
                None => event,
            }
        }
        Err(e) => {
            warn!(error = %e, "frame serialization failed");
            Event::default().comment("frame dropped")
        }
    }
}

#[derive(Deserialize)]
struct SendBody {
    #[serde(default)]
    message: Option<String>,
}

/// `POST /send/{id}` with `{"message": "..."}`.
///
/// 404 unless the hub knows `id`, 400 if it has no sender, 500 `{error}`
/// for an unreadable body or a failed send.
pub async fn send(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    let id = InstanceId::from(id);
    if !state.hub.contains(&id) {
        return Err(GatewayError::InstanceNotFound(id));
    }

    let parsed: SendBody = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::SendFailed(format!("invalid request body: {e}")))?;
    let Some(sender) = state.directory.get(&id) else {
        return Err(GatewayError::SendUnavailable(id));
    };
    let message = parsed.message.unwrap_or_default();
    if message.is_empty() {
        return Err(GatewayError::SendFailed("message must not be empty".into()));
    }

    match sender.send_message(&message).await {
        Ok(()) => {
            debug!(instance_id = %id, "message sent");
            Ok(Json(json!({ "ok": true })))
        }
        Err(e) => {
            warn!(instance_id = %id, error = %e, "send failed");
            Err(GatewayError::SendFailed(e))
        }
    }
}
