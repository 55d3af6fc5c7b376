//! Building one game instance from the experiment configuration.
//!
//! Every random draw of a game (roles, colours, tasks, personalities, models,
//! random-agent seeds) comes from one RNG seeded with `base_seed + game_id`,
//! so a game can be replayed from its recorded seed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::agents::{Agent, HumanAgent, ModelAgent, RandomAgent, RetryPolicy};
use crate::bridge::HumanBridge;
use crate::core::map::{ShipMap, TaskKind, TaskSpec};
use crate::core::state::GameState;
use crate::core::types::{COLORS, GameId, Role};
use crate::core::world::{Player, Task, World};
use crate::io::config::{AgentKind, AgentsConfig, AssignmentMode, ExperimentConfig, GameConfig};
use crate::io::endpoint::{ChatCompletionsEndpoint, DecisionEndpoint};
use crate::io::prompt::{PromptEngine, map_overview};

/// A ready-to-run game: world, state machine and one agent per seat.
pub struct GameSetup {
    pub game_id: GameId,
    pub seed: u64,
    pub world: World,
    pub state: GameState,
    pub agents: Vec<Box<dyn Agent>>,
}

/// Shared, immutable ingredients for every game of a run.
pub struct GameFactory {
    game: GameConfig,
    agents: AgentsConfig,
    map: Arc<ShipMap>,
    tasks: Vec<TaskSpec>,
    endpoint: Option<Arc<dyn DecisionEndpoint>>,
    bridge: Option<HumanBridge>,
    prompts: Arc<PromptEngine>,
    map_overview: Arc<str>,
    policy: RetryPolicy,
    base_seed: u64,
}

impl GameFactory {
    /// Prepare a factory. Model seats need `endpoint`; a human seat needs
    /// `bridge`.
    pub fn new(
        config: &ExperimentConfig,
        endpoint: Option<Arc<dyn DecisionEndpoint>>,
        bridge: Option<HumanBridge>,
    ) -> Result<Self> {
        config.validate()?;
        if uses_models(config) && endpoint.is_none() {
            bail!("model agents are configured but no decision endpoint is available");
        }
        if config.agents.human_seat.is_some() && bridge.is_none() {
            bail!("a human seat is configured but no human bridge is available");
        }
        let map = config.ship_map()?;
        let overview: Arc<str> = Arc::from(map_overview(&map));
        Ok(Self {
            game: config.game.clone(),
            agents: config.agents.clone(),
            map: Arc::new(map),
            tasks: config.task_pool(),
            endpoint,
            bridge,
            prompts: Arc::new(PromptEngine::new()),
            map_overview: overview,
            policy: RetryPolicy {
                format_retries: config.run.format_retries,
                transport_attempts: config.endpoint.max_transport_attempts,
                backoff: Duration::from_millis(config.endpoint.backoff_ms),
            },
            base_seed: config.run.seed.unwrap_or_else(|| rand::thread_rng().r#gen()),
        })
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    pub fn build(&self, game_id: GameId) -> Result<GameSetup> {
        let seed = self.base_seed.wrapping_add(u64::from(game_id));
        let mut rng = StdRng::seed_from_u64(seed);
        let game = &self.game;
        let start = self.map.button_room();

        let mut roles: Vec<Role> = (0..game.players)
            .map(|seat| {
                if seat < game.impostors {
                    Role::Impostor
                } else {
                    Role::Crewmate
                }
            })
            .collect();
        roles.shuffle(&mut rng);
        let colors: Vec<&str> = COLORS.choose_multiple(&mut rng, game.players).copied().collect();

        let common = self.draw_tasks(&mut rng, TaskKind::Common, game.common_tasks)?;
        let mut players = Vec::with_capacity(game.players);
        for (seat, role) in roles.iter().enumerate() {
            let mut player = Player::new(seat, colors[seat], *role, start);
            player.buttons_left = game.max_button_presses;
            let fake = *role == Role::Impostor;
            let mut tasks = common.clone();
            tasks.extend(self.draw_tasks(&mut rng, TaskKind::Short, game.short_tasks)?);
            tasks.extend(self.draw_tasks(&mut rng, TaskKind::Long, game.long_tasks)?);
            for task in &mut tasks {
                task.fake = fake;
            }
            player.tasks = tasks;
            let personalities = match role {
                Role::Crewmate => &self.agents.crewmate_personalities,
                Role::Impostor => &self.agents.impostor_personalities,
            };
            player.personality = personalities.choose(&mut rng).cloned();
            players.push(player);
        }

        let models = self.assign_models(&mut rng, &roles)?;
        let mut agents: Vec<Box<dyn Agent>> = Vec::with_capacity(players.len());
        for (player, model) in players.iter_mut().zip(models) {
            let agent: Box<dyn Agent> = if self.agents.human_seat == Some(player.seat) {
                let bridge = self.bridge.clone().context("human bridge missing")?;
                player.model = "human".to_string();
                Box::new(HumanAgent::new(game_id, bridge))
            } else if let Some(model) = model {
                let endpoint = self.endpoint.clone().context("decision endpoint missing")?;
                player.model = model.clone();
                Box::new(ModelAgent::new(
                    &player.name,
                    &model,
                    endpoint,
                    self.prompts.clone(),
                    self.map_overview.clone(),
                    self.policy,
                ))
            } else {
                player.model = "random".to_string();
                Box::new(RandomAgent::seeded(rng.r#gen()))
            };
            agents.push(agent);
        }

        Ok(GameSetup {
            game_id,
            seed,
            world: World::new(
                self.map.clone(),
                players,
                game.kill_cooldown,
                game.observation_window,
            ),
            state: GameState::new(game.discussion_rounds, game.max_timesteps),
            agents,
        })
    }

    fn draw_tasks(&self, rng: &mut StdRng, kind: TaskKind, count: usize) -> Result<Vec<Task>> {
        let pool: Vec<&TaskSpec> = self.tasks.iter().filter(|t| t.kind == kind).collect();
        pool.choose_multiple(rng, count)
            .map(|spec| -> Result<Task> {
                let room = self
                    .map
                    .find(&spec.room)
                    .with_context(|| format!("task '{}' room '{}'", spec.name, spec.room))?;
                Ok(Task::new(&spec.name, room, kind, false))
            })
            .collect()
    }

    /// Model id per seat, `None` for random seats.
    fn assign_models(&self, rng: &mut StdRng, roles: &[Role]) -> Result<Vec<Option<String>>> {
        let mut unique_pools = [
            self.agents.crewmate_models.clone(),
            self.agents.impostor_models.clone(),
        ];
        for pool in &mut unique_pools {
            pool.shuffle(rng);
        }
        let mut out = Vec::with_capacity(roles.len());
        for role in roles {
            let (kind, pool, slot) = match role {
                Role::Crewmate => (self.agents.crewmate, &self.agents.crewmate_models, 0),
                Role::Impostor => (self.agents.impostor, &self.agents.impostor_models, 1),
            };
            if kind != AgentKind::Model {
                out.push(None);
                continue;
            }
            let model = match self.agents.assignment {
                AssignmentMode::Random => pool.choose(rng).cloned(),
                AssignmentMode::Unique => unique_pools[slot].pop(),
            };
            let model = model.with_context(|| format!("no {} model left to assign", role.as_str()))?;
            out.push(Some(model));
        }
        Ok(out)
    }
}

fn uses_models(config: &ExperimentConfig) -> bool {
    config.agents.crewmate == AgentKind::Model || config.agents.impostor == AgentKind::Model
}

/// The chat-completions client, if any seat is model-backed.
pub fn decision_endpoint(config: &ExperimentConfig) -> Result<Option<Arc<dyn DecisionEndpoint>>> {
    if !uses_models(config) {
        return Ok(None);
    }
    let endpoint = ChatCompletionsEndpoint::from_config(&config.endpoint)?;
    Ok(Some(Arc::new(endpoint)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::io::config::Preset;
    use crate::test_support::ScriptedEndpoint;

    #[test]
    fn same_seed_same_game() {
        let mut config = ExperimentConfig::with_preset(Preset::Seven);
        config.run.seed = Some(5);
        let factory = GameFactory::new(&config, None, None).expect("factory");
        let a = factory.build(2).expect("game");
        let b = factory.build(2).expect("game");
        let names = |s: &GameSetup| -> Vec<(String, Role)> {
            s.world.players().iter().map(|p| (p.name.clone(), p.role)).collect()
        };
        assert_eq!(names(&a), names(&b));
        assert_eq!(a.seed, 7);
    }

    #[test]
    fn roles_tasks_and_colors() {
        let mut config = ExperimentConfig::with_preset(Preset::Seven);
        config.run.seed = Some(1);
        let factory = GameFactory::new(&config, None, None).expect("factory");
        let setup = factory.build(0).expect("game");
        let players = setup.world.players();
        assert_eq!(players.len(), 7);
        assert_eq!(players.iter().filter(|p| p.role == Role::Impostor).count(), 2);
        let colors: HashSet<&str> = players.iter().map(|p| p.color.as_str()).collect();
        assert_eq!(colors.len(), 7);

        let common: HashSet<&str> = players
            .iter()
            .filter_map(|p| p.tasks.first())
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(common.len(), 1, "common task is shared");
        for player in players {
            assert_eq!(player.tasks.len(), 3);
            assert!(player.tasks.iter().all(|t| t.fake == (player.role == Role::Impostor)));
            assert_eq!(player.location, setup.world.map().button_room());
            assert_eq!(player.model, "random");
        }
        assert_eq!(setup.agents.len(), 7);
    }

    #[test]
    fn unique_assignment_uses_distinct_models() {
        let mut config = ExperimentConfig::with_preset(Preset::Five);
        config.run.seed = Some(3);
        config.agents.crewmate = AgentKind::Model;
        config.agents.assignment = AssignmentMode::Unique;
        config.agents.crewmate_models = (0..4).map(|i| format!("model-{i}")).collect();
        let endpoint: Arc<dyn DecisionEndpoint> = Arc::new(ScriptedEndpoint::new(Vec::new()));
        let factory = GameFactory::new(&config, Some(endpoint), None).expect("factory");
        let setup = factory.build(0).expect("game");
        let models: HashSet<&str> = setup
            .world
            .players()
            .iter()
            .filter(|p| p.role == Role::Crewmate)
            .map(|p| p.model.as_str())
            .collect();
        assert_eq!(models.len(), 4);
    }

    #[test]
    fn model_seats_require_an_endpoint() {
        let mut config = ExperimentConfig::default();
        config.agents.impostor = AgentKind::Model;
        let err = GameFactory::new(&config, None, None).err().expect("error");
        assert!(err.to_string().contains("no decision endpoint"));
    }

    #[test]
    fn human_seat_is_labelled() {
        let mut config = ExperimentConfig::default();
        config.agents.human_seat = Some(0);
        let factory =
            GameFactory::new(&config, None, Some(HumanBridge::new())).expect("factory");
        let setup = factory.build(0).expect("game");
        assert_eq!(setup.world.players()[0].model, "human");
    }
}
