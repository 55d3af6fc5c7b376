//! Server-Sent Events stream and the bridge forwarder.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::stream::Stream;
use serde::Serialize;
use skeld::bridge::BridgeEvent;
use skeld::core::types::GameId;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::state::{AppState, ChangeEvent};

#[derive(Debug, PartialEq, Serialize)]
struct SsePayload {
    #[serde(rename = "type")]
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    game_id: Option<GameId>,
}

impl From<&ChangeEvent> for SsePayload {
    fn from(event: &ChangeEvent) -> Self {
        let (event_type, game_id) = match event {
            ChangeEvent::Bridge(BridgeEvent::Pending { game_id }) => ("human_pending", Some(*game_id)),
            ChangeEvent::Bridge(BridgeEvent::Resolved { game_id }) => {
                ("human_resolved", Some(*game_id))
            }
            ChangeEvent::Bridge(BridgeEvent::Cancelled { game_id }) => {
                ("human_cancelled", Some(*game_id))
            }
            ChangeEvent::GameFinished { game_id } => ("game_finished", Some(*game_id)),
            ChangeEvent::RunFinished => ("run_finished", None),
        };
        SsePayload {
            event_type,
            game_id,
        }
    }
}

/// SSE endpoint handler.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));

        loop {
            match rx.recv().await {
                Ok(change_event) => {
                    let payload = SsePayload::from(&change_event);
                    if let Ok(json) = serde_json::to_string(&payload) {
                        yield Ok(Event::default().event("change").data(json));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// Relay human-bridge events to SSE clients in a background task.
///
/// Subscribes before returning, so no event sent afterwards is missed.
pub fn start_bridge_forwarder(state: AppState) {
    let mut events = state.bridge.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    debug!(?event, "broadcasting bridge event");
                    let _ = state.event_tx.send(ChangeEvent::Bridge(event));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "bridge forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
