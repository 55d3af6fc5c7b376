//! CLI tests: spawn the `skeld` binary and check exit codes.

use std::process::Command;

use skeld::exit_codes;
use skeld::io::config::{ExperimentConfig, Preset, write_config};
use skeld::io::event_log::{GAMES_FILE, GameSummary, read_jsonl};

#[test]
fn run_with_random_agents_exits_ok_and_writes_logs() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = ExperimentConfig::with_preset(Preset::Three);
    config.game.max_timesteps = 10;
    write_config(&temp.path().join("skeld.toml"), &config).expect("write config");

    let status = Command::new(env!("CARGO_BIN_EXE_skeld"))
        .current_dir(temp.path())
        .args(["run", "--games", "2", "--seed", "3", "--log-dir", "out"])
        .status()
        .expect("skeld run");
    assert_eq!(status.code(), Some(exit_codes::OK));

    let games: Vec<GameSummary> =
        read_jsonl(&temp.path().join("out").join(GAMES_FILE)).expect("games log");
    assert_eq!(games.len(), 2);
}

#[test]
fn run_refuses_human_seats() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = ExperimentConfig::default();
    config.agents.human_seat = Some(1);
    write_config(&temp.path().join("skeld.toml"), &config).expect("write config");

    let output = Command::new(env!("CARGO_BIN_EXE_skeld"))
        .current_dir(temp.path())
        .arg("run")
        .output()
        .expect("skeld run");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("skeld-ui"));
}

#[test]
fn validate_rejects_bad_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        temp.path().join("skeld.toml"),
        "[game]\nplayers = 4\nimpostors = 2\n",
    )
    .expect("write config");

    let status = Command::new(env!("CARGO_BIN_EXE_skeld"))
        .current_dir(temp.path())
        .arg("validate")
        .status()
        .expect("skeld validate");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}
