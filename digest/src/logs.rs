//! Loading the event log of a run.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use skeld::io::event_log::{DECISIONS_FILE, DecisionRecord, GAMES_FILE, GameSummary};
use tracing::debug;

/// Everything one log directory holds.
#[derive(Debug, Default)]
pub struct RunLogs {
    pub games: Vec<GameSummary>,
    pub decisions: Vec<DecisionRecord>,
    /// Lines that could not be parsed, and missing files.
    pub warnings: Vec<String>,
}

impl RunLogs {
    /// Load `games.jsonl` (required) and `decisions.jsonl` (optional).
    ///
    /// Unparseable lines are skipped with a warning; a game interrupted
    /// mid-write leaves a truncated last line.
    pub fn load(dir: &Path) -> Result<Self> {
        let games_path = dir.join(GAMES_FILE);
        if !games_path.exists() {
            bail!("{} not found", games_path.display());
        }
        let mut warnings = Vec::new();
        let mut games: Vec<GameSummary> = read_lenient(&games_path, &mut warnings)?;
        games.sort_by_key(|g| g.game_id);

        let decisions_path = dir.join(DECISIONS_FILE);
        let decisions = if decisions_path.exists() {
            read_lenient(&decisions_path, &mut warnings)?
        } else {
            warnings.push(format!("{} not found", decisions_path.display()));
            Vec::new()
        };
        debug!(games = games.len(), decisions = decisions.len(), "logs loaded");
        Ok(RunLogs {
            games,
            decisions,
            warnings,
        })
    }
}

fn read_lenient<T: for<'de> Deserialize<'de>>(
    path: &Path,
    warnings: &mut Vec<String>,
) -> Result<Vec<T>> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut records = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(err) => warnings.push(format!(
                "skip {} line {}: {err}",
                path.display(),
                idx + 1
            )),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::game;

    #[test]
    fn truncated_line_is_skipped_with_a_warning() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut contents = String::new();
        for id in [1, 0] {
            contents.push_str(&serde_json::to_string(&game(id)).expect("json"));
            contents.push('\n');
        }
        contents.push_str("{\"game_id\": 2, \"se");
        fs::write(temp.path().join(GAMES_FILE), contents).expect("write");

        let logs = RunLogs::load(temp.path()).expect("load");
        assert_eq!(logs.games.iter().map(|g| g.game_id).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(logs.warnings.len(), 2);
        assert!(logs.warnings[0].contains("line 3"));
        assert!(logs.warnings[1].contains(DECISIONS_FILE));
    }

    #[test]
    fn missing_games_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = RunLogs::load(temp.path()).unwrap_err();
        assert!(err.to_string().contains(GAMES_FILE));
    }
}
