//! Mutable per-game world state: players, tasks, bodies and cooldowns.
//!
//! Every mutation validates the rule it depends on and fails with a typed
//! [`RuleViolation`]. The catalog only offers legal actions, so a violation
//! here means the engine itself is broken and the game must abort.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::core::map::{RoomId, ShipMap, TaskKind};
use crate::core::types::{DeathCause, PlayerId, Role};

/// Rule failures inside the world model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    #[error("player {0} does not exist")]
    UnknownPlayer(PlayerId),
    #[error("player {0} is not alive")]
    NotAlive(PlayerId),
    #[error("{to} is not reachable from {from} by {via}")]
    NotAdjacent {
        from: String,
        to: String,
        via: &'static str,
    },
    #[error("player {0} is not an Impostor")]
    NotImpostor(PlayerId),
    #[error("player {0} cannot target themselves")]
    SelfTarget(PlayerId),
    #[error("player {victim} is not a valid kill target")]
    InvalidVictim { victim: PlayerId },
    #[error("player {victim} is not in the killer's room")]
    NotCoLocated { victim: PlayerId },
    #[error("kill cooldown active until timestep {ready_at}")]
    Cooldown { ready_at: u32 },
    #[error("player {player} has no task {task}")]
    UnknownTask { player: PlayerId, task: usize },
    #[error("task '{0}' is already complete")]
    TaskComplete(String),
    #[error("task '{task}' must be done in {room}")]
    WrongRoom { task: String, room: String },
    #[error("task '{0}' is of the wrong kind for this action")]
    WrongTaskKind(String),
    #[error("no emergency button here or no presses left")]
    ButtonUnavailable,
    #[error("no unreported body of player {0} here")]
    NoBody(PlayerId),
    #[error("camera monitor is not in this room")]
    NoMonitor,
    #[error("{action} is not allowed during {phase}")]
    WrongPhase { action: String, phase: String },
    #[error("player {0} already voted this round")]
    AlreadyVoted(PlayerId),
    #[error("attempted actions cannot be applied")]
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub name: String,
    pub room: RoomId,
    pub kind: TaskKind,
    /// COMPLETE TASK turns still needed; zero means done.
    pub remaining: u32,
    /// Impostor cover task; never counts toward the task win.
    pub fake: bool,
}

impl Task {
    pub fn new(name: &str, room: RoomId, kind: TaskKind, fake: bool) -> Self {
        Self {
            name: name.to_string(),
            room,
            kind,
            remaining: kind.steps(),
            fake,
        }
    }

    pub fn is_done(&self) -> bool {
        self.remaining == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub seat: PlayerId,
    /// `Player N: color`, the form shown to decision-makers.
    pub name: String,
    pub color: String,
    pub role: Role,
    pub personality: Option<String>,
    /// Decision-maker label (model id, `random`, `human`).
    pub model: String,
    pub location: RoomId,
    pub death: Option<DeathCause>,
    pub last_kill: Option<u32>,
    pub tasks: Vec<Task>,
    pub buttons_left: u32,
    observations: VecDeque<String>,
    history: Vec<String>,
}

impl Player {
    pub fn new(seat: PlayerId, color: &str, role: Role, location: RoomId) -> Self {
        Self {
            seat,
            name: format!("Player {}: {}", seat + 1, color),
            color: color.to_string(),
            role,
            personality: None,
            model: String::new(),
            location,
            death: None,
            last_kill: None,
            tasks: Vec::new(),
            buttons_left: 0,
            observations: VecDeque::new(),
            history: Vec::new(),
        }
    }

    /// `Player N` without the colour.
    pub fn short_name(&self) -> String {
        format!("Player {}", self.seat + 1)
    }

    pub fn is_alive(&self) -> bool {
        self.death.is_none()
    }

    pub fn observations(&self) -> impl Iterator<Item = &str> {
        self.observations.iter().map(String::as_str)
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Body {
    pub victim: PlayerId,
    pub room: RoomId,
    pub reported: bool,
}

/// Per-game world state. Owned by exactly one engine; never shared.
#[derive(Debug, Clone)]
pub struct World {
    map: Arc<ShipMap>,
    players: Vec<Player>,
    bodies: Vec<Body>,
    kill_cooldown: u32,
    observation_window: usize,
    transcript: Vec<String>,
}

impl World {
    pub fn new(
        map: Arc<ShipMap>,
        players: Vec<Player>,
        kill_cooldown: u32,
        observation_window: usize,
    ) -> Self {
        Self {
            map,
            players,
            bodies: Vec::new(),
            kill_cooldown,
            observation_window: observation_window.max(1),
            transcript: Vec::new(),
        }
    }

    pub fn map(&self) -> &ShipMap {
        &self.map
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Result<&Player, RuleViolation> {
        self.players.get(id).ok_or(RuleViolation::UnknownPlayer(id))
    }

    fn player_mut(&mut self, id: PlayerId) -> Result<&mut Player, RuleViolation> {
        self.players
            .get_mut(id)
            .ok_or(RuleViolation::UnknownPlayer(id))
    }

    fn living(&self, id: PlayerId) -> Result<&Player, RuleViolation> {
        let player = self.player(id)?;
        if !player.is_alive() {
            return Err(RuleViolation::NotAlive(id));
        }
        Ok(player)
    }

    pub fn kill_cooldown(&self) -> u32 {
        self.kill_cooldown
    }

    pub fn is_alive(&self, id: PlayerId) -> bool {
        self.players.get(id).is_some_and(Player::is_alive)
    }

    pub fn location_of(&self, id: PlayerId) -> Option<RoomId> {
        self.players.get(id).map(|player| player.location)
    }

    pub fn movement_neighbors(&self, room: RoomId) -> &BTreeSet<RoomId> {
        self.map.movement_neighbors(room)
    }

    /// Vent exits from `room` for `player`; always empty for non-Impostors.
    pub fn vent_neighbors(&self, player: PlayerId, room: RoomId) -> BTreeSet<RoomId> {
        match self.players.get(player) {
            Some(p) if p.role.can_vent() => self.map.vent_graph(room).clone(),
            _ => BTreeSet::new(),
        }
    }

    /// Timestep from which `player` may kill again.
    pub fn kill_ready_at(&self, player: PlayerId) -> u32 {
        self.players
            .get(player)
            .and_then(|p| p.last_kill)
            .map_or(0, |last| last + self.kill_cooldown)
    }

    pub fn kill_ready(&self, player: PlayerId, timestep: u32) -> bool {
        timestep >= self.kill_ready_at(player)
    }

    /// Living players in `room`, in seat order.
    pub fn occupants(&self, room: RoomId) -> impl Iterator<Item = &Player> {
        self.players
            .iter()
            .filter(move |p| p.is_alive() && p.location == room)
    }

    pub fn alive_ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.players.iter().filter(|p| p.is_alive()).map(|p| p.seat)
    }

    /// `(impostors, crewmates)` still alive.
    pub fn alive_counts(&self) -> (usize, usize) {
        self.players
            .iter()
            .filter(|p| p.is_alive())
            .fold((0, 0), |(imp, crew), p| match p.role {
                Role::Impostor => (imp + 1, crew),
                Role::Crewmate => (imp, crew + 1),
            })
    }

    /// True when every real task of every Crewmate, dead or alive, is done.
    ///
    /// A crew with no tasks at all never wins this way.
    pub fn crew_tasks_complete(&self) -> bool {
        let mut tasks = self
            .players
            .iter()
            .filter(|p| p.role.does_real_tasks())
            .flat_map(|p| p.tasks.iter().filter(|t| !t.fake))
            .peekable();
        if tasks.peek().is_none() {
            return false;
        }
        tasks.all(Task::is_done)
    }

    /// `(done, total)` over every Crewmate's real tasks, for reporting.
    pub fn task_progress(&self) -> (usize, usize) {
        let tasks = self
            .players
            .iter()
            .filter(|p| p.role.does_real_tasks())
            .flat_map(|p| p.tasks.iter().filter(|t| !t.fake));
        tasks.fold((0, 0), |(done, total), t| {
            (done + usize::from(t.is_done()), total + 1)
        })
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn unreported_bodies(&self, room: RoomId) -> impl Iterator<Item = &Body> {
        self.bodies
            .iter()
            .filter(move |b| b.room == room && !b.reported)
    }

    pub fn apply_move(&mut self, player: PlayerId, to: RoomId) -> Result<(), RuleViolation> {
        let from = self.living(player)?.location;
        if !self.map.movement_neighbors(from).contains(&to) {
            return Err(self.not_adjacent(from, to, "corridor"));
        }
        self.player_mut(player)?.location = to;
        Ok(())
    }

    pub fn apply_vent(&mut self, player: PlayerId, to: RoomId) -> Result<(), RuleViolation> {
        let actor = self.living(player)?;
        if !actor.role.can_vent() {
            return Err(RuleViolation::NotImpostor(player));
        }
        let from = actor.location;
        if !self.vent_neighbors(player, from).contains(&to) {
            return Err(self.not_adjacent(from, to, "vent"));
        }
        self.player_mut(player)?.location = to;
        Ok(())
    }

    pub fn apply_kill(
        &mut self,
        killer: PlayerId,
        victim: PlayerId,
        timestep: u32,
    ) -> Result<(), RuleViolation> {
        let actor = self.living(killer)?;
        if !actor.role.can_kill() {
            return Err(RuleViolation::NotImpostor(killer));
        }
        if killer == victim {
            return Err(RuleViolation::SelfTarget(killer));
        }
        let room = actor.location;
        let target = self.living(victim)?;
        if target.role == Role::Impostor {
            return Err(RuleViolation::InvalidVictim { victim });
        }
        if target.location != room {
            return Err(RuleViolation::NotCoLocated { victim });
        }
        let ready_at = self.kill_ready_at(killer);
        if timestep < ready_at {
            return Err(RuleViolation::Cooldown { ready_at });
        }

        self.player_mut(killer)?.last_kill = Some(timestep);
        self.mark_dead(victim, DeathCause::Killed)?;
        self.bodies.push(Body {
            victim,
            room,
            reported: false,
        });
        Ok(())
    }

    /// Advance one task by one step. Returns `true` when the task completed.
    pub fn apply_task_step(
        &mut self,
        player: PlayerId,
        task: usize,
        fake: bool,
    ) -> Result<bool, RuleViolation> {
        let actor = self.living(player)?;
        let location = actor.location;
        let entry = actor
            .tasks
            .get(task)
            .ok_or(RuleViolation::UnknownTask { player, task })?;
        if entry.fake != fake {
            return Err(RuleViolation::WrongTaskKind(entry.name.clone()));
        }
        if entry.is_done() {
            return Err(RuleViolation::TaskComplete(entry.name.clone()));
        }
        if entry.room != location {
            return Err(RuleViolation::WrongRoom {
                task: entry.name.clone(),
                room: self.map.name(entry.room).to_string(),
            });
        }
        let entry = &mut self.player_mut(player)?.tasks[task];
        entry.remaining -= 1;
        Ok(entry.is_done())
    }

    pub fn mark_dead(&mut self, player: PlayerId, cause: DeathCause) -> Result<(), RuleViolation> {
        let target = self.player_mut(player)?;
        if target.death.is_some() {
            return Err(RuleViolation::NotAlive(player));
        }
        target.death = Some(cause);
        Ok(())
    }

    pub fn use_button(&mut self, player: PlayerId) -> Result<RoomId, RuleViolation> {
        let actor = self.living(player)?;
        let room = actor.location;
        if room != self.map.button_room() || actor.buttons_left == 0 {
            return Err(RuleViolation::ButtonUnavailable);
        }
        self.player_mut(player)?.buttons_left -= 1;
        Ok(room)
    }

    /// Mark every body as found; called when any meeting starts.
    pub fn clear_bodies(&mut self) {
        for body in &mut self.bodies {
            body.reported = true;
        }
    }

    /// Send every living player back to the button room after a meeting.
    pub fn regroup_at_button(&mut self) {
        let room = self.map.button_room();
        for player in self.players.iter_mut().filter(|p| p.is_alive()) {
            player.location = room;
        }
    }

    /// Append `text` to `player`'s observation log, evicting the oldest entry.
    pub fn observe(&mut self, player: PlayerId, text: &str) {
        let window = self.observation_window;
        if let Some(target) = self.players.get_mut(player) {
            if target.observations.len() == window {
                target.observations.pop_front();
            }
            target.observations.push_back(text.to_string());
        }
    }

    /// Every living player in `room` except `actor` observes `text`.
    pub fn witness(&mut self, room: RoomId, actor: PlayerId, text: &str) {
        let witnesses: Vec<PlayerId> = self
            .occupants(room)
            .map(|p| p.seat)
            .filter(|&seat| seat != actor)
            .collect();
        for seat in witnesses {
            self.observe(seat, text);
        }
    }

    /// Every living player observes `text`.
    pub fn broadcast(&mut self, text: &str) {
        let alive: Vec<PlayerId> = self.alive_ids().collect();
        for seat in alive {
            self.observe(seat, text);
        }
    }

    pub fn record_history(&mut self, player: PlayerId, timestep: u32, text: &str) {
        if let Some(target) = self.players.get_mut(player) {
            target.history.push(format!("Timestep {timestep}: {text}"));
        }
    }

    /// One line per monitored room listing its living occupants.
    pub fn monitor_snapshot(&self) -> Vec<String> {
        self.map
            .monitored_rooms()
            .map(|room| {
                let names: Vec<&str> = self.occupants(room).map(|p| p.name.as_str()).collect();
                let seen = if names.is_empty() {
                    "nobody".to_string()
                } else {
                    names.join(", ")
                };
                format!("{}: {}", self.map.name(room), seen)
            })
            .collect()
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn push_transcript(&mut self, line: String) {
        self.transcript.push(line);
    }

    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
    }

    fn not_adjacent(&self, from: RoomId, to: RoomId, via: &'static str) -> RuleViolation {
        let name = |room: RoomId| {
            if room < self.map.len() {
                self.map.name(room).to_string()
            } else {
                format!("room #{room}")
            }
        };
        RuleViolation::NotAdjacent {
            from: name(from),
            to: name(to),
            via,
        }
    }
}
