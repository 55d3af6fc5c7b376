mod logs;
mod render;
mod report;
#[cfg(test)]
mod test_fixtures;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::logs::RunLogs;

#[derive(Parser)]
#[command(name = "digest", version, about = "Summarise skeld event logs")]
struct Cli {
    /// Directory holding games.jsonl and decisions.jsonl.
    #[arg(short, long, global = true, default_value = "logs")]
    log_dir: PathBuf,
    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq, Debug)]
enum Command {
    /// Outcome counts, meetings and kills (default).
    Summary,
    /// Every ballot of every meeting.
    Votes,
    /// Every kill with its witnesses.
    Kills,
    /// Win rates, decisions, vote accuracy and issues per model.
    Models,
}

fn main() -> Result<()> {
    skeld::logging::init();
    let cli = Cli::parse();
    let logs = RunLogs::load(&cli.log_dir)?;
    print!("{}", execute(&cli, &logs)?);
    for warning in &logs.warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

fn execute(cli: &Cli, logs: &RunLogs) -> Result<String> {
    let games = &logs.games;
    match cli.command.unwrap_or(Command::Summary) {
        Command::Summary => {
            let out = report::overview(games);
            emit(cli.json, &out, || render::overview(&out))
        }
        Command::Votes => {
            let rows = report::voting_history(games);
            emit(cli.json, &rows, || render::votes(&rows))
        }
        Command::Kills => {
            let rows = report::kill_history(games);
            emit(cli.json, &rows, || render::kills(&rows))
        }
        Command::Models => {
            let stats = report::model_stats(games, &logs.decisions);
            emit(cli.json, &stats, || render::models(&stats))
        }
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<String> {
    if !json {
        return Ok(text());
    }
    let mut out = serde_json::to_string_pretty(value).context("serialize report")?;
    out.push('\n');
    Ok(out)
}
