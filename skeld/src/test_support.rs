//! Test-only fixtures: small worlds, scripted decision-makers and an
//! in-memory event sink.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use futures::future::BoxFuture;

use crate::agents::{Agent, Decision};
use crate::core::action::LegalAction;
use crate::core::map::{RoomId, ShipMap, TaskKind};
use crate::core::state::GameState;
use crate::core::types::Role;
use crate::core::view::PlayerView;
use crate::core::world::{Player, Task, World};
use crate::io::endpoint::{ChatMessage, DecisionEndpoint, TransportError};
use crate::io::event_log::{DecisionRecord, EventSink, GameSummary};

/// Three players in the Cafeteria: seat 0 red Impostor, seats 1 and 2 blue
/// and green Crewmates. Kill cooldown 3, observation window 10, one button
/// press each, no tasks.
pub fn small_world() -> World {
    let map = Arc::new(ShipMap::skeld());
    let start = map.button_room();
    let players = [("red", Role::Impostor), ("blue", Role::Crewmate), ("green", Role::Crewmate)]
        .into_iter()
        .enumerate()
        .map(|(seat, (color, role))| {
            let mut player = Player::new(seat, color, role, start);
            player.buttons_left = 1;
            player.model = "test".to_string();
            player
        })
        .collect();
    World::new(map, players, 3, 10)
}

/// Task phase at timestep 0, three discussion rounds, 50 timesteps.
pub fn small_state() -> GameState {
    GameState::new(3, 50)
}

/// Room id by name; panics on unknown names.
pub fn room(world: &World, name: &str) -> RoomId {
    world
        .map()
        .find(name)
        .unwrap_or_else(|| panic!("unknown room {name}"))
}

/// [`small_world`] where seat 1 owns one real task and seat 2 owns none.
pub fn crewmate_with_task(name: &str, room_name: &str, kind: TaskKind) -> World {
    let map = Arc::new(ShipMap::skeld());
    let target = map
        .find(room_name)
        .unwrap_or_else(|| panic!("unknown room {room_name}"));
    let mut players: Vec<Player> = small_world().players().to_vec();
    players[1].tasks.push(Task::new(name, target, kind, false));
    World::new(map, players, 3, 10)
}

/// Decision endpoint that replays canned replies in order and records every
/// conversation it was sent. Running out of replies yields `EmptyContent`.
pub struct ScriptedEndpoint {
    replies: Mutex<VecDeque<Result<String, TransportError>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedEndpoint {
    pub fn new(replies: Vec<Result<String, TransportError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `times` copies of one reply.
    pub fn repeating(reply: &str, times: usize) -> Self {
        Self::new((0..times).map(|_| Ok(reply.to_string())).collect())
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl DecisionEndpoint for ScriptedEndpoint {
    fn complete<'a>(
        &'a self,
        _model: &'a str,
        messages: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<String, TransportError>> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(messages.to_vec());
        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or(Err(TransportError::EmptyContent));
        Box::pin(async move { reply })
    }
}

/// Agent that takes the first legal action whose text starts with one of its
/// preferred prefixes (checked in order), else the first legal action.
/// Optionally fails once its turn budget is used up.
pub struct ScriptedAgent {
    prefer: Vec<String>,
    budget: Option<usize>,
    turns: usize,
}

impl ScriptedAgent {
    pub fn first_legal() -> Self {
        Self::preferring(&[])
    }

    pub fn preferring(prefixes: &[&str]) -> Self {
        Self {
            prefer: prefixes.iter().map(|p| p.to_string()).collect(),
            budget: None,
            turns: 0,
        }
    }

    pub fn failing_after(budget: usize) -> Self {
        Self {
            budget: Some(budget),
            ..Self::first_legal()
        }
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    fn pick(&mut self, view: &PlayerView, legal: &[LegalAction]) -> Result<Decision> {
        if self.budget.is_some_and(|budget| self.turns >= budget) {
            bail!("scripted agent for {} is out of turns", view.name);
        }
        self.turns += 1;
        if legal.is_empty() {
            bail!("no legal actions for {}", view.name);
        }
        let index = self
            .prefer
            .iter()
            .find_map(|prefix| legal.iter().position(|a| a.text.starts_with(prefix.as_str())))
            .unwrap_or(0);
        Ok(Decision::pick(index, legal[index].with_message("scripted")))
    }
}

impl Agent for ScriptedAgent {
    fn choose_action<'a>(
        &'a mut self,
        view: &'a PlayerView,
        legal: &'a [LegalAction],
        _timestep: u32,
    ) -> BoxFuture<'a, Result<Decision>> {
        let decision = self.pick(view, legal);
        Box::pin(async move { decision })
    }
}

/// Event sink that keeps everything in memory.
#[derive(Default)]
pub struct MemorySink {
    decisions: Mutex<Vec<DecisionRecord>>,
    games: Mutex<Vec<GameSummary>>,
}

impl MemorySink {
    pub fn decisions(&self) -> Vec<DecisionRecord> {
        self.decisions.lock().expect("decisions lock").clone()
    }

    pub fn games(&self) -> Vec<GameSummary> {
        self.games.lock().expect("games lock").clone()
    }
}

impl EventSink for MemorySink {
    fn record_decision(&self, record: &DecisionRecord) -> Result<()> {
        self.decisions
            .lock()
            .expect("decisions lock")
            .push(record.clone());
        Ok(())
    }

    fn record_game(&self, summary: &GameSummary) -> Result<()> {
        self.games.lock().expect("games lock").push(summary.clone());
        Ok(())
    }
}
