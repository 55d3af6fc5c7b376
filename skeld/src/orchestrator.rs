//! Bounded pool of concurrent games.
//!
//! Each game runs as its own tokio task and must hold a semaphore permit while
//! it plays. A game that fails or is cancelled only affects its own
//! [`GameReport`]; siblings keep running.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, anyhow};
use futures::future::{AbortHandle, Abortable};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::core::types::GameId;
use crate::game::GameEngine;
use crate::io::event_log::{EventSink, GameSummary};
use crate::setup::{GameFactory, GameSetup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("game {0} was cancelled")]
pub struct GameCancelled(pub GameId);

/// Result of one game. `Err` for aborted, cancelled or panicked games.
#[derive(Debug)]
pub struct GameReport {
    pub game_id: GameId,
    pub result: Result<GameSummary>,
}

impl GameReport {
    pub fn is_cancelled(&self) -> bool {
        self.result
            .as_ref()
            .err()
            .and_then(|err| err.downcast_ref::<GameCancelled>())
            .is_some()
    }
}

/// Cancels running games by id. Cheap to clone; usable from other tasks.
#[derive(Clone, Default)]
pub struct CancelHandles {
    handles: Arc<Mutex<HashMap<GameId, AbortHandle>>>,
}

impl CancelHandles {
    /// Abort `game_id`. Returns `false` if it already finished or never ran.
    pub fn cancel(&self, game_id: GameId) -> bool {
        let handle = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&game_id);
        match handle {
            Some(handle) => {
                info!(game_id, "cancelling game");
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn running(&self) -> Vec<GameId> {
        let mut ids: Vec<GameId> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    fn insert(&self, game_id: GameId, handle: AbortHandle) {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(game_id, handle);
    }

    fn remove(&self, game_id: GameId) {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&game_id);
    }
}

pub struct Orchestrator {
    permits: Arc<Semaphore>,
    sink: Arc<dyn EventSink>,
    tasks: JoinSet<GameReport>,
    cancel: CancelHandles,
}

impl Orchestrator {
    pub fn new(concurrency: usize, sink: Arc<dyn EventSink>) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            sink,
            tasks: JoinSet::new(),
            cancel: CancelHandles::default(),
        }
    }

    pub fn cancel_handles(&self) -> CancelHandles {
        self.cancel.clone()
    }

    /// Queue a game. It starts once a permit is free.
    pub fn spawn(&mut self, setup: GameSetup) {
        let game_id = setup.game_id;
        let engine = GameEngine::new(setup, self.sink.clone());
        let permits = self.permits.clone();
        let (handle, registration) = AbortHandle::new_pair();
        self.cancel.insert(game_id, handle);
        let cancel = self.cancel.clone();

        let game = async move {
            let _permit = permits
                .acquire_owned()
                .await
                .context("game pool is closed")?;
            engine.run().await
        };
        self.tasks.spawn(async move {
            let result = match Abortable::new(game, registration).await {
                Ok(result) => result,
                Err(_aborted) => Err(anyhow!(GameCancelled(game_id))),
            };
            cancel.remove(game_id);
            GameReport { game_id, result }
        });
    }

    /// Next game to finish, in completion order. `None` once all are done.
    pub async fn join_next(&mut self) -> Option<GameReport> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(report) => return Some(report),
                Err(err) => warn!(error = %err, "game task panicked"),
            }
        }
        None
    }

    /// Wait for every queued game. Reports are ordered by game id.
    pub async fn join_all(mut self) -> Vec<GameReport> {
        let mut reports = Vec::with_capacity(self.tasks.len());
        while let Some(report) = self.join_next().await {
            reports.push(report);
        }
        reports.sort_by_key(|r| r.game_id);
        reports
    }
}

/// Build and run `games` games from `factory`, at most `concurrency` at once.
#[instrument(skip_all, fields(games = games, concurrency = concurrency))]
pub async fn run_games(
    factory: &GameFactory,
    games: u32,
    concurrency: usize,
    sink: Arc<dyn EventSink>,
) -> Result<Vec<GameReport>> {
    let mut pool = Orchestrator::new(concurrency, sink);
    for game_id in 0..games {
        let setup = factory
            .build(game_id)
            .with_context(|| format!("set up game {game_id}"))?;
        pool.spawn(setup);
    }
    let reports = pool.join_all().await;
    let failed = reports.iter().filter(|r| r.result.is_err()).count();
    info!(finished = reports.len() - failed, failed, "all games done");
    Ok(reports)
}
