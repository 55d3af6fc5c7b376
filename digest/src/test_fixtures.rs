//! Log records shared by the unit tests.

use chrono::Utc;
use skeld::agents::{Issue, IssueKind};
use skeld::core::types::{DeathCause, GameId, Outcome, Role};
use skeld::io::event_log::{
    BallotRecord, DecisionRecord, DecisionStatus, GameSummary, KillRecord, PlayerSummary,
    VoteRecord,
};

fn player(name: &str, role: Role, model: &str, death: Option<DeathCause>) -> PlayerSummary {
    PlayerSummary {
        name: name.to_string(),
        role,
        model: model.to_string(),
        personality: None,
        death,
        tasks_done: 0,
        tasks_total: 3,
    }
}

fn ballot(voter: &str, target: Option<&str>) -> BallotRecord {
    BallotRecord {
        voter: voter.to_string(),
        target: target.map(str::to_string),
    }
}

/// Red (model-a) kills pink in Electrical with green watching, then blue
/// (model-a) and green (model-b) vote red out while red skips.
pub fn game(game_id: GameId) -> GameSummary {
    let now = Utc::now();
    GameSummary {
        game_id,
        seed: u64::from(game_id),
        outcome: Some(Outcome::CrewmatesByEjection),
        winner: Some(Role::Crewmate),
        error: None,
        timesteps: 5,
        players: vec![
            player("Player 1: red", Role::Impostor, "model-a", Some(DeathCause::Ejected)),
            player("Player 2: blue", Role::Crewmate, "model-a", None),
            player("Player 3: green", Role::Crewmate, "model-b", None),
            player("Player 4: pink", Role::Crewmate, "random", Some(DeathCause::Killed)),
        ],
        votes: vec![VoteRecord {
            timestep: 4,
            ballots: vec![
                ballot("Player 2: blue", Some("Player 1: red")),
                ballot("Player 3: green", Some("Player 1: red")),
                ballot("Player 1: red", None),
            ],
            ejected: Some("Player 1: red".to_string()),
        }],
        kills: vec![KillRecord {
            timestep: 2,
            killer: "Player 1: red".to_string(),
            victim: "Player 4: pink".to_string(),
            room: "Electrical".to_string(),
            witnesses: vec!["Player 3: green".to_string()],
        }],
        issues: vec![Issue {
            kind: IssueKind::Format,
            player: "Player 2: blue".to_string(),
            model: "model-a".to_string(),
            attempt: 1,
            error: "no action section".to_string(),
            resolved: true,
            timestep: 1,
            response_snippet: None,
            http_status: None,
        }],
        started_at: now,
        ended_at: now,
    }
}

pub fn decision(model: &str) -> DecisionRecord {
    DecisionRecord {
        game_id: 0,
        timestep: 0,
        phase: "Task phase".to_string(),
        player: "Player 2: blue".to_string(),
        role: Role::Crewmate,
        personality: None,
        model: model.to_string(),
        location: "Cafeteria".to_string(),
        prompt: None,
        raw_response: None,
        sections: None,
        legal_actions: vec!["MOVE from Cafeteria to Admin".to_string()],
        action: "MOVE from Cafeteria to Admin".to_string(),
        status: DecisionStatus::Applied,
        attempts: 1,
        issues: Vec::new(),
        timestamp: Utc::now(),
    }
}
