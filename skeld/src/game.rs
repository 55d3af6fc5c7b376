//! One game, start to finish.
//!
//! The engine owns the world, the phase state machine and one agent per seat.
//! Turns are strictly sequential: ask the active seat's agent, apply the
//! action, check for a winner. Every decision and the final summary go to the
//! event sink, including games that abort.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::agents::Agent;
use crate::core::action::Action;
use crate::core::catalog::legal_actions;
use crate::core::rules::{apply_action, evaluate, resolve_votes};
use crate::core::state::{GameState, Step};
use crate::core::tally::Ballot;
use crate::core::types::{GameId, Outcome, PlayerId};
use crate::core::view::PlayerView;
use crate::core::world::World;
use crate::io::event_log::{
    BallotRecord, DecisionRecord, DecisionStatus, EventSink, GameSummary, KillRecord,
    PlayerSummary, VoteRecord,
};
use crate::setup::GameSetup;

pub struct GameEngine {
    game_id: GameId,
    seed: u64,
    world: World,
    state: GameState,
    agents: Vec<Box<dyn Agent>>,
    sink: Arc<dyn EventSink>,
    votes: Vec<VoteRecord>,
    kills: Vec<KillRecord>,
    started_at: DateTime<Utc>,
}

impl GameEngine {
    pub fn new(setup: GameSetup, sink: Arc<dyn EventSink>) -> Self {
        Self {
            game_id: setup.game_id,
            seed: setup.seed,
            world: setup.world,
            state: setup.state,
            agents: setup.agents,
            sink,
            votes: Vec::new(),
            kills: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Play to the end and record the summary.
    ///
    /// An aborted game still records a summary (with `error` set) before the
    /// error is returned.
    #[instrument(skip_all, fields(game_id = self.game_id))]
    pub async fn run(mut self) -> Result<GameSummary> {
        if self.agents.len() != self.world.players().len() {
            bail!(
                "{} agents for {} seats",
                self.agents.len(),
                self.world.players().len()
            );
        }
        info!(seed = self.seed, players = self.agents.len(), "game started");
        let played = self.play().await;

        match played {
            Ok(outcome) => {
                let summary = self.summary(Some(outcome), None);
                self.sink
                    .record_game(&summary)
                    .context("record game summary")?;
                info!(?outcome, timesteps = summary.timesteps, "game finished");
                Ok(summary)
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "game aborted");
                let summary = self.summary(None, Some(format!("{err:#}")));
                if let Err(sink_err) = self.sink.record_game(&summary) {
                    warn!(error = %sink_err, "failed to record aborted game");
                }
                Err(err.context(format!("game {} aborted", self.game_id)))
            }
        }
    }

    async fn play(&mut self) -> Result<Outcome> {
        loop {
            match self.state.next_step(&self.world) {
                Step::Finished(outcome) => return Ok(outcome),
                Step::ResolveVotes => self.close_meeting()?,
                Step::Act(player) => self.take_turn(player).await?,
            }
            if !self.state.is_finished()
                && let Some(outcome) = evaluate(&self.world)
            {
                self.state.finish(outcome);
            }
        }
    }

    #[instrument(skip_all, fields(seat = player, timestep = self.state.timestep()))]
    async fn take_turn(&mut self, player: PlayerId) -> Result<()> {
        let legal = legal_actions(&self.world, &self.state, player);
        let view = PlayerView::project(&self.world, &self.state, player)
            .with_context(|| format!("no view for seat {player}"))?;
        if legal.is_empty() {
            bail!("{} has no legal actions ({})", view.name, view.phase);
        }
        let timestep = self.state.timestep();
        let agent = self
            .agents
            .get_mut(player)
            .with_context(|| format!("no agent for seat {player}"))?;
        let decision = agent
            .choose_action(&view, &legal, timestep)
            .await
            .with_context(|| format!("{} failed to decide", view.name))?;

        let summary = apply_action(&mut self.world, &mut self.state, player, &decision.action)
            .with_context(|| format!("{} chose an action the rules reject", view.name))?;
        debug!(player = %view.name, action = %summary, "turn taken");

        if let Action::Kill { victim } = decision.action {
            self.record_kill(timestep, player, victim)?;
        }

        let actor = self.world.player(player)?;
        let status = if matches!(decision.action, Action::Attempted { .. }) {
            DecisionStatus::Attempted
        } else {
            DecisionStatus::Applied
        };
        let record = DecisionRecord {
            game_id: self.game_id,
            timestep,
            phase: view.phase.clone(),
            player: view.name.clone(),
            role: actor.role,
            personality: actor.personality.clone(),
            model: actor.model.clone(),
            location: view.location.clone(),
            prompt: decision.prompt,
            raw_response: decision.raw_response,
            sections: decision.sections,
            legal_actions: legal.iter().map(|a| a.text.clone()).collect(),
            action: summary,
            status,
            attempts: decision.attempts,
            issues: decision.issues,
            timestamp: Utc::now(),
        };
        self.sink.record_decision(&record).context("record decision")
    }

    fn record_kill(&mut self, timestep: u32, killer: PlayerId, victim: PlayerId) -> Result<()> {
        let killer = self.world.player(killer)?;
        let room = killer.location;
        let witnesses = self
            .world
            .occupants(room)
            .filter(|p| p.seat != killer.seat)
            .map(|p| p.name.clone())
            .collect();
        let record = KillRecord {
            timestep,
            killer: killer.name.clone(),
            victim: self.world.player(victim)?.name.clone(),
            room: self.world.map().name(room).to_string(),
            witnesses,
        };
        info!(killer = %record.killer, victim = %record.victim, room = %record.room, "kill");
        self.kills.push(record);
        Ok(())
    }

    fn close_meeting(&mut self) -> Result<()> {
        let timestep = self.state.timestep();
        let result = resolve_votes(&mut self.world, &mut self.state)?;
        let name = |id: PlayerId| self.world.player(id).map(|p| p.name.clone());

        let mut ballots = Vec::with_capacity(result.ballots.len());
        for (voter, ballot) in &result.ballots {
            let target = match ballot {
                Ballot::Player(target) => Some(name(*target)?),
                Ballot::Skip => None,
            };
            ballots.push(BallotRecord {
                voter: name(*voter)?,
                target,
            });
        }
        let ejected = result.ejected.map(name).transpose()?;
        info!(ejected = ?ejected, skips = result.tally.skips, "votes resolved");
        self.votes.push(VoteRecord {
            timestep,
            ballots,
            ejected,
        });
        Ok(())
    }

    fn summary(&self, outcome: Option<Outcome>, error: Option<String>) -> GameSummary {
        let players = self
            .world
            .players()
            .iter()
            .map(|p| PlayerSummary {
                name: p.name.clone(),
                role: p.role,
                model: p.model.clone(),
                personality: p.personality.clone(),
                death: p.death,
                tasks_done: p.tasks.iter().filter(|t| t.is_done()).count(),
                tasks_total: p.tasks.len(),
            })
            .collect();
        GameSummary {
            game_id: self.game_id,
            seed: self.seed,
            outcome,
            winner: outcome.map(Outcome::winner),
            error,
            timesteps: self.state.timestep(),
            players,
            votes: self.votes.clone(),
            kills: self.kills.clone(),
            issues: self
                .agents
                .iter()
                .flat_map(|agent| agent.issues().iter().cloned())
                .collect(),
            started_at: self.started_at,
            ended_at: Utc::now(),
        }
    }
}
