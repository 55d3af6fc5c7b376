//! Event log sink: one record per decision, one summary per game.
//!
//! # Separation of Concerns
//!
//! - **Tracing (`logging`)**: dev diagnostics via `RUST_LOG`, not persisted.
//! - **Event log (this module)**: the product artifact analysed by `digest`.
//!   Always written, unaffected by `RUST_LOG`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::Issue;
use crate::core::resolver::Sections;
use crate::core::types::{DeathCause, GameId, Outcome, Role};

pub const DECISIONS_FILE: &str = "decisions.jsonl";
pub const GAMES_FILE: &str = "games.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// A legal action was applied.
    Applied,
    /// A recognisable but illegal action consumed the turn.
    Attempted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub game_id: GameId,
    pub timestep: u32,
    pub phase: String,
    pub player: String,
    pub role: Role,
    pub personality: Option<String>,
    pub model: String,
    pub location: String,
    /// Turn prompt shown to the decision-maker, when it had one.
    pub prompt: Option<String>,
    pub raw_response: Option<String>,
    pub sections: Option<Sections>,
    pub legal_actions: Vec<String>,
    pub action: String,
    pub status: DecisionStatus,
    pub attempts: u32,
    #[serde(default)]
    pub issues: Vec<Issue>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub name: String,
    pub role: Role,
    pub model: String,
    pub personality: Option<String>,
    pub death: Option<DeathCause>,
    pub tasks_done: usize,
    pub tasks_total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotRecord {
    pub voter: String,
    /// Target name, or `None` for a skip.
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub timestep: u32,
    pub ballots: Vec<BallotRecord>,
    pub ejected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillRecord {
    pub timestep: u32,
    pub killer: String,
    pub victim: String,
    pub room: String,
    /// Living players who saw it happen.
    #[serde(default)]
    pub witnesses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub game_id: GameId,
    pub seed: u64,
    /// `None` when the game aborted.
    pub outcome: Option<Outcome>,
    pub winner: Option<Role>,
    pub error: Option<String>,
    pub timesteps: u32,
    pub players: Vec<PlayerSummary>,
    pub votes: Vec<VoteRecord>,
    pub kills: Vec<KillRecord>,
    pub issues: Vec<Issue>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Destination for event records. Shared by every game of a run.
pub trait EventSink: Send + Sync {
    fn record_decision(&self, record: &DecisionRecord) -> Result<()>;
    fn record_game(&self, summary: &GameSummary) -> Result<()>;
}

/// Appends JSON lines to `decisions.jsonl` and `games.jsonl` under one
/// directory.
pub struct JsonlSink {
    dir: PathBuf,
    decisions: Mutex<File>,
    games: Mutex<File>,
}

impl JsonlSink {
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))?;
        let open = |name: &str| -> Result<Mutex<File>> {
            let path = dir.join(name);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("open {}", path.display()))?;
            Ok(Mutex::new(file))
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            decisions: open(DECISIONS_FILE)?,
            games: open(GAMES_FILE)?,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn append_line<T: Serialize>(file: &Mutex<File>, name: &str, value: &T) -> Result<()> {
    let mut line = serde_json::to_string(value).with_context(|| format!("serialize {name} record"))?;
    line.push('\n');
    let mut file = file
        .lock()
        .map_err(|_| anyhow!("{name} log lock poisoned"))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append {name}"))?;
    file.flush().with_context(|| format!("flush {name}"))
}

impl EventSink for JsonlSink {
    fn record_decision(&self, record: &DecisionRecord) -> Result<()> {
        append_line(&self.decisions, DECISIONS_FILE, record)
    }

    fn record_game(&self, summary: &GameSummary) -> Result<()> {
        append_line(&self.games, GAMES_FILE, summary)
    }
}

/// Read every record of a JSONL file, failing on the first bad line.
pub fn read_jsonl<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse {} line {}", path.display(), idx + 1))
        })
        .collect()
}
