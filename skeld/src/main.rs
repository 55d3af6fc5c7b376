//! Social-deduction game runner.
//!
//! Reads an experiment config (`skeld.toml` by default), runs the configured
//! number of games concurrently and writes the event log under `run.log_dir`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use skeld::exit_codes;
use skeld::io::config::{AgentKind, ExperimentConfig, Preset, load_config, write_config};
use skeld::io::event_log::{EventSink, JsonlSink};
use skeld::orchestrator::{GameReport, run_games};
use skeld::setup::{GameFactory, decision_endpoint};

#[derive(Parser)]
#[command(
    name = "skeld",
    version,
    about = "Run multi-agent social-deduction games"
)]
struct Cli {
    /// Experiment config file.
    #[arg(short, long, global = true, default_value = "skeld.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a config file for one of the game-size presets.
    Init {
        #[arg(long, value_enum, default_value_t = Preset::Five)]
        preset: Preset,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Load and validate the config.
    Validate,
    /// Run the experiment.
    Run(RunArgs),
}

/// Overrides for the `[run]` and `[agents]` sections.
#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    games: Option<u32>,
    #[arg(long)]
    concurrency: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    log_dir: Option<String>,
    #[arg(long, value_enum)]
    crewmate: Option<AgentKind>,
    #[arg(long, value_enum)]
    impostor: Option<AgentKind>,
}

impl RunArgs {
    fn apply(&self, cfg: &mut ExperimentConfig) {
        if let Some(games) = self.games {
            cfg.run.games = games;
        }
        if let Some(concurrency) = self.concurrency {
            cfg.run.concurrency = concurrency;
        }
        if let Some(seed) = self.seed {
            cfg.run.seed = Some(seed);
        }
        if let Some(log_dir) = &self.log_dir {
            cfg.run.log_dir = log_dir.clone();
        }
        if let Some(kind) = self.crewmate {
            cfg.agents.crewmate = kind;
        }
        if let Some(kind) = self.impostor {
            cfg.agents.impostor = kind;
        }
    }
}

#[tokio::main]
async fn main() {
    skeld::logging::init();
    let code = match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { preset, force } => cmd_init(&cli.config, preset, force),
        Command::Validate => cmd_validate(&cli.config),
        Command::Run(args) => cmd_run(&cli.config, &args).await,
    }
}

fn cmd_init(path: &Path, preset: Preset, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &ExperimentConfig::with_preset(preset))?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(path: &Path) -> Result<i32> {
    let cfg = load_config(path)?;
    println!(
        "ok: {} players ({} impostors), {} games",
        cfg.game.players, cfg.game.impostors, cfg.run.games
    );
    Ok(exit_codes::OK)
}

async fn cmd_run(path: &Path, args: &RunArgs) -> Result<i32> {
    let mut cfg = load_config(path)?;
    args.apply(&mut cfg);
    cfg.validate()?;
    if let Some(seat) = cfg.agents.human_seat {
        bail!("agents.human_seat = {seat} needs the human input server; run it with `skeld-ui`");
    }

    let sink: Arc<dyn EventSink> = Arc::new(JsonlSink::create(Path::new(&cfg.run.log_dir))?);
    let factory = GameFactory::new(&cfg, decision_endpoint(&cfg)?, None)?;
    let reports = run_games(&factory, cfg.run.games, cfg.run.concurrency, sink).await?;

    for report in &reports {
        println!("{}", report_line(report));
    }
    println!("seed {}; logs in {}", factory.base_seed(), cfg.run.log_dir);
    if reports.iter().any(|r| r.result.is_err()) {
        return Ok(exit_codes::ABORTED);
    }
    Ok(exit_codes::OK)
}

fn report_line(report: &GameReport) -> String {
    match &report.result {
        Ok(summary) => match summary.outcome {
            Some(outcome) => format!(
                "game {}: {:?} after {} timesteps",
                report.game_id, outcome, summary.timesteps
            ),
            None => format!("game {}: no outcome", report.game_id),
        },
        Err(err) => format!("game {}: aborted: {:#}", report.game_id, err),
    }
}
