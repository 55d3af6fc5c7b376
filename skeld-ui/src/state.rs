//! Shared application state for the UI server.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use skeld::bridge::{BridgeEvent, HumanBridge};
use skeld::core::types::{GameId, Outcome, Role};
use skeld::orchestrator::{CancelHandles, GameReport, Orchestrator};
use tokio::sync::broadcast;
use tracing::info;

/// Events broadcast to SSE clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A human request appeared, was answered or was cancelled.
    Bridge(BridgeEvent),
    GameFinished { game_id: GameId },
    RunFinished,
}

/// How a game ended, as listed by `GET /api/games`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinishedGame {
    pub game_id: GameId,
    pub outcome: Option<Outcome>,
    pub winner: Option<Role>,
    pub timesteps: Option<u32>,
    pub error: Option<String>,
}

impl From<&GameReport> for FinishedGame {
    fn from(report: &GameReport) -> Self {
        match &report.result {
            Ok(summary) => FinishedGame {
                game_id: report.game_id,
                outcome: summary.outcome,
                winner: summary.winner,
                timesteps: Some(summary.timesteps),
                error: None,
            },
            Err(err) => FinishedGame {
                game_id: report.game_id,
                outcome: None,
                winner: None,
                timesteps: None,
                error: Some(format!("{err:#}")),
            },
        }
    }
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub bridge: HumanBridge,
    pub cancel: CancelHandles,
    finished: Arc<Mutex<Vec<FinishedGame>>>,
    /// Broadcast sender for change events.
    pub event_tx: Arc<broadcast::Sender<ChangeEvent>>,
}

impl AppState {
    pub fn new(bridge: HumanBridge, cancel: CancelHandles) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            bridge,
            cancel,
            finished: Arc::new(Mutex::new(Vec::new())),
            event_tx: Arc::new(event_tx),
        }
    }

    pub fn finished(&self) -> Vec<FinishedGame> {
        self.finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn record_finished(&self, report: &GameReport) {
        let game = FinishedGame::from(report);
        let game_id = game.game_id;
        {
            let mut finished = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
            finished.push(game);
            finished.sort_by_key(|g| g.game_id);
        }
        let _ = self.event_tx.send(ChangeEvent::GameFinished { game_id });
    }
}

/// Collect reports as games finish, then announce the end of the run.
pub async fn drive(mut pool: Orchestrator, state: AppState) {
    while let Some(report) = pool.join_next().await {
        state.record_finished(&report);
    }
    info!("all games finished");
    let _ = state.event_tx.send(ChangeEvent::RunFinished);
}
