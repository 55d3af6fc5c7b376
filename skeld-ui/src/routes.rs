//! HTTP route handlers for the UI API.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::Serialize;
use skeld::bridge::{BridgeError, HumanChoice, HumanRequest};
use skeld::core::types::GameId;
use tracing::info;

use crate::state::{AppState, FinishedGame};

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/games", get(list_games))
        .route("/games/{game_id}", get(get_game))
        .route("/games/{game_id}/action", post(submit_action))
        .route("/games/{game_id}/cancel", post(cancel_game))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct GamesResponse {
    /// Games waiting for human input.
    pending: Vec<GameId>,
    running: Vec<GameId>,
    finished: Vec<FinishedGame>,
}

/// GET /api/games - pending, running and finished games.
async fn list_games(State(state): State<AppState>) -> Json<GamesResponse> {
    Json(GamesResponse {
        pending: state.bridge.pending_games(),
        running: state.cancel.running(),
        finished: state.finished(),
    })
}

/// GET /api/games/{game_id} - the pending human request of a game.
async fn get_game(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> Result<Json<HumanRequest>, StatusCode> {
    state
        .bridge
        .pending(game_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// POST /api/games/{game_id}/action - answer the pending request.
async fn submit_action(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
    Json(choice): Json<HumanChoice>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .bridge
        .submit(game_id, choice)
        .map_err(|err| (error_status(&err), err.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/games/{game_id}/cancel - abort a running game.
async fn cancel_game(
    State(state): State<AppState>,
    Path(game_id): Path<GameId>,
) -> StatusCode {
    if state.cancel.cancel(game_id) {
        info!(game_id, "game cancelled from the UI");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

fn error_status(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::NoPendingRequest(_) => StatusCode::NOT_FOUND,
        BridgeError::InvalidIndex { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        BridgeError::AlreadyPending(_) => StatusCode::CONFLICT,
        BridgeError::Closed(_) => StatusCode::GONE,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use skeld::bridge::HumanBridge;
    use skeld::core::view::PlayerView;
    use skeld::orchestrator::CancelHandles;
    use skeld::test_support::{small_state, small_world};

    use super::*;

    fn state() -> AppState {
        AppState::new(HumanBridge::new(), CancelHandles::default())
    }

    fn request(game_id: GameId) -> HumanRequest {
        let view = PlayerView::project(&small_world(), &small_state(), 2).expect("view");
        HumanRequest {
            game_id,
            player: view.name.clone(),
            timestep: 1,
            view,
            legal_actions: vec!["SKIP VOTE".to_string(), "VOTE Player 1: red".to_string()],
            requested_at: Utc::now(),
        }
    }

    async fn wait_pending(state: &AppState, game_id: GameId) {
        while state.bridge.pending(game_id).is_none() {
            tokio::task::yield_now().await;
        }
    }

    fn choice(action_index: usize) -> Json<HumanChoice> {
        Json(HumanChoice {
            action_index,
            ..HumanChoice::default()
        })
    }

    #[tokio::test]
    async fn pending_request_is_served_and_answered() {
        let state = state();
        let waiting = tokio::spawn({
            let bridge = state.bridge.clone();
            async move { bridge.request(request(5)).await }
        });
        wait_pending(&state, 5).await;

        let Json(games) = list_games(State(state.clone())).await;
        assert_eq!(games.pending, vec![5]);

        let Json(pending) = get_game(State(state.clone()), Path(5)).await.expect("pending");
        assert_eq!(pending.legal_actions.len(), 2);
        assert_eq!(pending.timestep, 1);

        let status = submit_action(State(state.clone()), Path(5), choice(1))
            .await
            .expect("submit");
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(waiting.await.expect("join").expect("choice").action_index, 1);
        assert_eq!(
            get_game(State(state), Path(5)).await.unwrap_err(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn bad_submissions_map_to_client_errors() {
        let state = state();
        let (status, _) = submit_action(State(state.clone()), Path(9), choice(0))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let _waiting = tokio::spawn({
            let bridge = state.bridge.clone();
            async move { bridge.request(request(9)).await }
        });
        wait_pending(&state, 9).await;
        let (status, message) = submit_action(State(state.clone()), Path(9), choice(7))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(message.contains("out of range"));
        assert!(state.bridge.pending(9).is_some());
    }

    #[tokio::test]
    async fn cancelling_an_unknown_game_is_not_found() {
        assert_eq!(cancel_game(State(state()), Path(1)).await, StatusCode::NOT_FOUND);
    }
}
