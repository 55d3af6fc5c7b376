//! Experiment configuration (`skeld.toml`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::map::{MapSpec, ShipMap, TaskKind, TaskSpec, skeld_tasks};
use crate::core::types::COLORS;

/// Experiment configuration (TOML).
///
/// Edited by humans, immutable for the duration of a run. Missing sections
/// fall back to the five-player preset with random agents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ExperimentConfig {
    pub game: GameConfig,
    pub agents: AgentsConfig,
    pub endpoint: EndpointConfig,
    pub run: RunConfig,
    /// Custom layout; the Skeld when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<MapSpec>,
    /// Custom task pool; the Skeld pool when empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskSpec>,
}

/// Game sizes shipped with the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Three,
    Five,
    Seven,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameConfig {
    pub players: usize,
    pub impostors: usize,
    /// Common tasks are shared by every Crewmate.
    pub common_tasks: usize,
    pub short_tasks: usize,
    pub long_tasks: usize,
    pub discussion_rounds: u8,
    /// Timesteps between an Impostor's kills.
    pub kill_cooldown: u32,
    /// The game ends with an Impostor win once this many timesteps passed.
    pub max_timesteps: u32,
    pub max_button_presses: u32,
    /// Observations kept per player; older entries are dropped.
    pub observation_window: usize,
}

impl GameConfig {
    pub fn preset(preset: Preset) -> Self {
        let (players, impostors) = match preset {
            Preset::Three => (3, 1),
            Preset::Five => (5, 1),
            Preset::Seven => (7, 2),
        };
        Self {
            players,
            impostors,
            common_tasks: 1,
            short_tasks: 1,
            long_tasks: 1,
            discussion_rounds: 3,
            kill_cooldown: 3,
            max_timesteps: 50,
            max_button_presses: 2,
            observation_window: 10,
        }
    }

    pub fn crewmates(&self) -> usize {
        self.players.saturating_sub(self.impostors)
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self::preset(Preset::Five)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Decisions come from the chat-completions endpoint.
    Model,
    /// Uniform choice over the legal set.
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentMode {
    /// Each seat draws a model independently (with replacement).
    Random,
    /// Each seat of a role gets a different model.
    Unique,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentsConfig {
    pub crewmate: AgentKind,
    pub impostor: AgentKind,
    pub crewmate_models: Vec<String>,
    pub impostor_models: Vec<String>,
    pub assignment: AssignmentMode,
    /// Seat (0-based) played by a human through the bridge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_seat: Option<usize>,
    /// Personality tags drawn for Crewmates; none when empty.
    pub crewmate_personalities: Vec<String>,
    /// Personality tags drawn for Impostors; none when empty.
    pub impostor_personalities: Vec<String>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            crewmate: AgentKind::Random,
            impostor: AgentKind::Random,
            crewmate_models: vec!["meta-llama/llama-3.3-70b-instruct".to_string()],
            impostor_models: vec!["meta-llama/llama-3.3-70b-instruct".to_string()],
            assignment: AssignmentMode::Random,
            human_seat: None,
            crewmate_personalities: Vec::new(),
            impostor_personalities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointConfig {
    /// Chat-completions URL; `OPENAI_API_BASE_URL` overrides it at run time.
    pub url: String,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
    pub temperature: f64,
    pub top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub max_transport_attempts: u32,
    /// Linear backoff step between transport attempts.
    pub backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            temperature: 0.7,
            top_p: 1.0,
            max_tokens: None,
            max_transport_attempts: 5,
            backoff_ms: 1_000,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    pub games: u32,
    /// Games in flight at once.
    pub concurrency: usize,
    /// Base seed; game `i` uses `seed + i`. Entropy when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Extra requests after an unparseable reply.
    pub format_retries: u32,
    /// Directory receiving `decisions.jsonl` and `games.jsonl`.
    pub log_dir: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            games: 1,
            concurrency: 50,
            seed: None,
            format_retries: 3,
            log_dir: "logs".to_string(),
        }
    }
}

impl ExperimentConfig {
    pub fn with_preset(preset: Preset) -> Self {
        Self {
            game: GameConfig::preset(preset),
            ..Self::default()
        }
    }

    pub fn ship_map(&self) -> Result<ShipMap> {
        match &self.map {
            Some(spec) => ShipMap::from_spec(spec).context("compile [map]"),
            None => Ok(ShipMap::skeld()),
        }
    }

    pub fn task_pool(&self) -> Vec<TaskSpec> {
        if self.tasks.is_empty() {
            skeld_tasks()
        } else {
            self.tasks.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let game = &self.game;
        if game.players < 3 {
            return Err(anyhow!("game.players must be >= 3"));
        }
        if game.players > COLORS.len() {
            bail!("game.players must be <= {} (one colour per seat)", COLORS.len());
        }
        if game.impostors == 0 {
            return Err(anyhow!("game.impostors must be > 0"));
        }
        if game.impostors >= game.crewmates() {
            return Err(anyhow!(
                "game.impostors ({}) must be fewer than the crewmates ({})",
                game.impostors,
                game.crewmates()
            ));
        }
        if game.discussion_rounds == 0 {
            return Err(anyhow!("game.discussion_rounds must be > 0"));
        }
        if game.max_timesteps == 0 {
            return Err(anyhow!("game.max_timesteps must be > 0"));
        }
        if game.observation_window == 0 {
            return Err(anyhow!("game.observation_window must be > 0"));
        }

        let agents = &self.agents;
        for (kind, models, seats, role) in [
            (agents.crewmate, &agents.crewmate_models, game.crewmates(), "crewmate"),
            (agents.impostor, &agents.impostor_models, game.impostors, "impostor"),
        ] {
            if kind != AgentKind::Model {
                continue;
            }
            if models.iter().all(|m| m.trim().is_empty()) {
                bail!("agents.{role}_models must name at least one model");
            }
            if agents.assignment == AssignmentMode::Unique && models.len() < seats {
                bail!(
                    "agents.assignment = \"unique\" needs {seats} {role} models, found {}",
                    models.len()
                );
            }
        }
        if let Some(seat) = agents.human_seat
            && seat >= game.players
        {
            bail!("agents.human_seat {seat} is out of range for {} players", game.players);
        }

        let endpoint = &self.endpoint;
        if endpoint.url.trim().is_empty() {
            return Err(anyhow!("endpoint.url must be non-empty"));
        }
        if endpoint.max_transport_attempts == 0 {
            return Err(anyhow!("endpoint.max_transport_attempts must be > 0"));
        }
        if !(0.0..=2.0).contains(&endpoint.temperature) {
            return Err(anyhow!("endpoint.temperature must be within 0..=2"));
        }
        if !(0.0..=1.0).contains(&endpoint.top_p) {
            return Err(anyhow!("endpoint.top_p must be within 0..=1"));
        }
        if endpoint.timeout_secs == 0 {
            return Err(anyhow!("endpoint.timeout_secs must be > 0"));
        }

        if self.run.games == 0 {
            return Err(anyhow!("run.games must be > 0"));
        }
        if self.run.concurrency == 0 {
            return Err(anyhow!("run.concurrency must be > 0"));
        }

        let map = self.ship_map()?;
        let pool = self.task_pool();
        for task in &pool {
            if map.find(&task.room).is_none() {
                bail!("task '{}' references unknown room '{}'", task.name, task.room);
            }
        }
        for (kind, wanted) in [
            (TaskKind::Common, game.common_tasks),
            (TaskKind::Short, game.short_tasks),
            (TaskKind::Long, game.long_tasks),
        ] {
            let available = pool.iter().filter(|t| t.kind == kind).count();
            if available < wanted {
                bail!("task pool has {available} {kind:?} tasks, game needs {wanted}");
            }
        }
        if game.common_tasks + game.short_tasks + game.long_tasks == 0 {
            return Err(anyhow!("game must assign at least one task per crewmate"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ExperimentConfig::default()`.
pub fn load_config(path: &Path) -> Result<ExperimentConfig> {
    if !path.exists() {
        let cfg = ExperimentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ExperimentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ExperimentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
