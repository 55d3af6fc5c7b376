//! Human input channel.
//!
//! Each game may have at most one outstanding human request. The suspended
//! game holds the receiving half of a oneshot channel; the external actor
//! (the `skeld-ui` server) completes it through [`HumanBridge::submit`].
//! The slot is removed when the request completes or when the waiting future
//! is dropped, so an aborted game never leaves a stale request behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info};

use crate::core::types::GameId;
use crate::core::view::PlayerView;

/// What the external actor needs to decide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanRequest {
    pub game_id: GameId,
    pub player: String,
    pub timestep: u32,
    pub view: PlayerView,
    pub legal_actions: Vec<String>,
    pub requested_at: DateTime<Utc>,
}

/// The external actor's answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanChoice {
    /// Index into `legal_actions`.
    pub action_index: usize,
    /// Message for SPEAK.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub condensed_memory: Option<String>,
    #[serde(default)]
    pub thinking_process: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    Pending { game_id: GameId },
    Resolved { game_id: GameId },
    Cancelled { game_id: GameId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("game {0} is not waiting for human input")]
    NoPendingRequest(GameId),
    #[error("action index {index} is out of range (0..{len})")]
    InvalidIndex { index: usize, len: usize },
    #[error("game {0} already has a pending human request")]
    AlreadyPending(GameId),
    #[error("human request for game {0} was dropped")]
    Closed(GameId),
}

struct Slot {
    request: HumanRequest,
    reply: oneshot::Sender<HumanChoice>,
}

/// Registry of pending human requests, keyed by game.
#[derive(Clone)]
pub struct HumanBridge {
    slots: Arc<Mutex<HashMap<GameId, Slot>>>,
    events: broadcast::Sender<BridgeEvent>,
}

impl Default for HumanBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanBridge {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<GameId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: BridgeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Register `request` and wait for the external actor's choice.
    pub async fn request(&self, request: HumanRequest) -> Result<HumanChoice, BridgeError> {
        let game_id = request.game_id;
        let (reply, answer) = oneshot::channel();
        {
            let mut slots = self.lock();
            if slots.contains_key(&game_id) {
                return Err(BridgeError::AlreadyPending(game_id));
            }
            slots.insert(game_id, Slot { request, reply });
        }
        let _guard = SlotGuard {
            bridge: self,
            game_id,
        };
        info!(game_id, "waiting for human input");
        self.notify(BridgeEvent::Pending { game_id });
        answer.await.map_err(|_| BridgeError::Closed(game_id))
    }

    pub fn pending(&self, game_id: GameId) -> Option<HumanRequest> {
        self.lock().get(&game_id).map(|slot| slot.request.clone())
    }

    pub fn pending_games(&self) -> Vec<GameId> {
        let mut games: Vec<GameId> = self.lock().keys().copied().collect();
        games.sort_unstable();
        games
    }

    /// Complete the pending request of `game_id`.
    ///
    /// An out-of-range index is rejected and the request stays pending.
    pub fn submit(&self, game_id: GameId, choice: HumanChoice) -> Result<(), BridgeError> {
        let slot = {
            let mut slots = self.lock();
            let Some(slot) = slots.get(&game_id) else {
                return Err(BridgeError::NoPendingRequest(game_id));
            };
            let len = slot.request.legal_actions.len();
            if choice.action_index >= len {
                return Err(BridgeError::InvalidIndex {
                    index: choice.action_index,
                    len,
                });
            }
            slots
                .remove(&game_id)
                .ok_or(BridgeError::NoPendingRequest(game_id))?
        };
        slot.reply
            .send(choice)
            .map_err(|_| BridgeError::Closed(game_id))?;
        debug!(game_id, "human choice delivered");
        self.notify(BridgeEvent::Resolved { game_id });
        Ok(())
    }
}

/// Clears the slot when the waiting future goes away first.
struct SlotGuard<'a> {
    bridge: &'a HumanBridge,
    game_id: GameId,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let removed = self.bridge.lock().remove(&self.game_id).is_some();
        if removed {
            debug!(game_id = self.game_id, "human request cancelled");
            self.bridge.notify(BridgeEvent::Cancelled {
                game_id: self.game_id,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{small_state, small_world};

    fn request(game_id: GameId) -> HumanRequest {
        let view = PlayerView::project(&small_world(), &small_state(), 1).expect("view");
        HumanRequest {
            game_id,
            player: view.name.clone(),
            timestep: 0,
            view,
            legal_actions: vec!["SKIP VOTE".to_string(), "VOTE Player 1: red".to_string()],
            requested_at: Utc::now(),
        }
    }

    async fn wait_pending(bridge: &HumanBridge, game_id: GameId) {
        while bridge.pending(game_id).is_none() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn submit_resumes_the_waiting_game() {
        let bridge = HumanBridge::new();
        let mut events = bridge.subscribe();
        let waiting = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.request(request(3)).await }
        });
        wait_pending(&bridge, 3).await;
        assert_eq!(bridge.pending_games(), vec![3]);

        bridge
            .submit(
                3,
                HumanChoice {
                    action_index: 1,
                    ..HumanChoice::default()
                },
            )
            .expect("submit");
        let choice = waiting.await.expect("join").expect("choice");
        assert_eq!(choice.action_index, 1);
        assert!(bridge.pending_games().is_empty());
        assert_eq!(events.recv().await.expect("event"), BridgeEvent::Pending { game_id: 3 });
        assert_eq!(events.recv().await.expect("event"), BridgeEvent::Resolved { game_id: 3 });
    }

    #[tokio::test]
    async fn invalid_index_keeps_the_slot() {
        let bridge = HumanBridge::new();
        let waiting = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.request(request(1)).await }
        });
        wait_pending(&bridge, 1).await;

        let err = bridge
            .submit(
                1,
                HumanChoice {
                    action_index: 5,
                    ..HumanChoice::default()
                },
            )
            .unwrap_err();
        assert_eq!(err, BridgeError::InvalidIndex { index: 5, len: 2 });
        assert!(bridge.pending(1).is_some());

        bridge.submit(1, HumanChoice::default()).expect("submit");
        assert_eq!(waiting.await.expect("join").expect("choice").action_index, 0);
    }

    #[tokio::test]
    async fn aborting_the_waiter_clears_the_slot() {
        let bridge = HumanBridge::new();
        let mut events = bridge.subscribe();
        let waiting = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.request(request(2)).await }
        });
        wait_pending(&bridge, 2).await;
        waiting.abort();
        assert!(waiting.await.unwrap_err().is_cancelled());

        assert!(bridge.pending(2).is_none());
        assert_eq!(
            bridge.submit(2, HumanChoice::default()),
            Err(BridgeError::NoPendingRequest(2))
        );
        assert_eq!(events.recv().await.expect("event"), BridgeEvent::Pending { game_id: 2 });
        assert_eq!(events.recv().await.expect("event"), BridgeEvent::Cancelled { game_id: 2 });
    }

    #[tokio::test]
    async fn second_request_for_same_game_is_rejected() {
        let bridge = HumanBridge::new();
        let _waiting = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.request(request(4)).await }
        });
        wait_pending(&bridge, 4).await;
        assert_eq!(
            bridge.request(request(4)).await,
            Err(BridgeError::AlreadyPending(4))
        );
        assert!(bridge.pending(4).is_some());
    }
}
