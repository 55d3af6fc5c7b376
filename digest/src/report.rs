//! Aggregations over a run's event log.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use skeld::core::types::{GameId, Outcome, Role};
use skeld::io::event_log::{DecisionRecord, DecisionStatus, GameSummary, PlayerSummary};

/// One ballot of one meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteRow {
    pub game_id: GameId,
    pub timestep: u32,
    pub voter: String,
    pub voter_role: Option<Role>,
    /// `None` for a skip.
    pub target: Option<String>,
    pub target_role: Option<Role>,
    /// Who the meeting ejected, if anyone.
    pub ejected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KillRow {
    pub game_id: GameId,
    pub timestep: u32,
    pub killer: String,
    pub victim: String,
    pub room: String,
    pub witnesses: Vec<String>,
}

/// Per-model totals. A model filling two seats of one game counts twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelStats {
    pub model: String,
    pub crewmate_seats: usize,
    pub crewmate_wins: usize,
    pub impostor_seats: usize,
    pub impostor_wins: usize,
    pub decisions: usize,
    /// Recognisable but illegal actions.
    pub attempted: usize,
    pub votes_cast: usize,
    pub votes_on_impostors: usize,
    pub issues: usize,
    pub unresolved_issues: usize,
}

impl ModelStats {
    pub fn seats(&self) -> usize {
        self.crewmate_seats + self.impostor_seats
    }

    pub fn wins(&self) -> usize {
        self.crewmate_wins + self.impostor_wins
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunOverview {
    pub games: usize,
    pub aborted: usize,
    pub outcomes: BTreeMap<&'static str, usize>,
    pub meetings: usize,
    pub ejections: usize,
    pub kills: usize,
    /// Games whose recorded outcome disagrees with their final player states.
    pub mismatches: Vec<String>,
}

pub fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::ImpostorsByParity => "impostors_by_parity",
        Outcome::ImpostorsByTime => "impostors_by_time",
        Outcome::CrewmatesByEjection => "crewmates_by_ejection",
        Outcome::CrewmatesByTasks => "crewmates_by_tasks",
    }
}

fn roster(game: &GameSummary) -> HashMap<&str, &PlayerSummary> {
    game.players.iter().map(|p| (p.name.as_str(), p)).collect()
}

/// Checks the recorded outcome against the final roster. Returns what is off.
pub fn outcome_mismatch(game: &GameSummary) -> Option<String> {
    let outcome = game.outcome?;
    let alive = |role: Role| {
        game.players
            .iter()
            .filter(|p| p.role == role && p.death.is_none())
            .count()
    };
    let (impostors, crewmates) = (alive(Role::Impostor), alive(Role::Crewmate));
    let (done, total) = game
        .players
        .iter()
        .filter(|p| p.role == Role::Crewmate)
        .fold((0, 0), |(done, total), p| (done + p.tasks_done, total + p.tasks_total));

    let problem = match outcome {
        Outcome::ImpostorsByParity if impostors < crewmates || impostors == 0 => {
            format!("{impostors} impostors alive against {crewmates} crewmates")
        }
        Outcome::ImpostorsByTime if impostors == 0 => "no impostor survived".to_string(),
        Outcome::CrewmatesByEjection if impostors > 0 => {
            format!("{impostors} impostors still alive")
        }
        Outcome::CrewmatesByTasks if total == 0 || done < total => {
            format!("crew tasks at {done}/{total}")
        }
        _ => return None,
    };
    Some(format!(
        "game {}: {} but {problem}",
        game.game_id,
        outcome_label(outcome)
    ))
}

pub fn overview(games: &[GameSummary]) -> RunOverview {
    let mut out = RunOverview {
        games: games.len(),
        ..RunOverview::default()
    };
    for game in games {
        match game.outcome {
            Some(outcome) => *out.outcomes.entry(outcome_label(outcome)).or_default() += 1,
            None => out.aborted += 1,
        }
        out.meetings += game.votes.len();
        out.ejections += game.votes.iter().filter(|v| v.ejected.is_some()).count();
        out.kills += game.kills.len();
        out.mismatches.extend(outcome_mismatch(game));
    }
    out
}

/// Every ballot of every meeting, in game then meeting order.
pub fn voting_history(games: &[GameSummary]) -> Vec<VoteRow> {
    let mut rows = Vec::new();
    for game in games {
        let players = roster(game);
        let role_of = |name: &str| players.get(name).map(|p| p.role);
        for vote in &game.votes {
            for ballot in &vote.ballots {
                rows.push(VoteRow {
                    game_id: game.game_id,
                    timestep: vote.timestep,
                    voter: ballot.voter.clone(),
                    voter_role: role_of(&ballot.voter),
                    target: ballot.target.clone(),
                    target_role: ballot.target.as_deref().and_then(role_of),
                    ejected: vote.ejected.clone(),
                });
            }
        }
    }
    rows
}

pub fn kill_history(games: &[GameSummary]) -> Vec<KillRow> {
    games
        .iter()
        .flat_map(|game| {
            game.kills.iter().map(|kill| KillRow {
                game_id: game.game_id,
                timestep: kill.timestep,
                killer: kill.killer.clone(),
                victim: kill.victim.clone(),
                room: kill.room.clone(),
                witnesses: kill.witnesses.clone(),
            })
        })
        .collect()
}

/// Totals per model, sorted by model id.
pub fn model_stats(games: &[GameSummary], decisions: &[DecisionRecord]) -> Vec<ModelStats> {
    let mut stats: BTreeMap<String, ModelStats> = BTreeMap::new();

    for game in games {
        for player in &game.players {
            let won = game.winner == Some(player.role);
            let s = entry(&mut stats, &player.model);
            match player.role {
                Role::Crewmate => {
                    s.crewmate_seats += 1;
                    s.crewmate_wins += usize::from(won);
                }
                Role::Impostor => {
                    s.impostor_seats += 1;
                    s.impostor_wins += usize::from(won);
                }
            }
        }

        let players = roster(game);
        for ballot in game.votes.iter().flat_map(|v| &v.ballots) {
            let Some(voter) = players.get(ballot.voter.as_str()) else {
                continue;
            };
            let on_impostor = ballot
                .target
                .as_deref()
                .and_then(|t| players.get(t))
                .is_some_and(|t| t.role == Role::Impostor);
            let s = entry(&mut stats, &voter.model);
            s.votes_cast += 1;
            s.votes_on_impostors += usize::from(on_impostor);
        }

        for issue in &game.issues {
            let s = entry(&mut stats, &issue.model);
            s.issues += 1;
            s.unresolved_issues += usize::from(!issue.resolved);
        }
    }

    for decision in decisions {
        let s = entry(&mut stats, &decision.model);
        s.decisions += 1;
        s.attempted += usize::from(decision.status == DecisionStatus::Attempted);
    }

    stats.into_values().collect()
}

fn entry<'a>(stats: &'a mut BTreeMap<String, ModelStats>, model: &str) -> &'a mut ModelStats {
    stats
        .entry(model.to_string())
        .or_insert_with(|| ModelStats {
            model: model.to_string(),
            ..ModelStats::default()
        })
}

#[cfg(test)]
mod tests {
    use skeld::core::types::DeathCause;

    use super::*;
    use crate::test_fixtures::{decision, game};

    #[test]
    fn ballots_carry_roles() {
        let rows = voting_history(&[game(0)]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].voter, "Player 2: blue");
        assert_eq!(rows[0].target_role, Some(Role::Impostor));
        assert_eq!(rows[2].target, None);
        assert_eq!(rows[2].target_role, None);
        assert!(rows.iter().all(|r| r.ejected.as_deref() == Some("Player 1: red")));
    }

    #[test]
    fn kills_are_listed_per_game() {
        let rows = kill_history(&[game(0), game(1)]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].game_id, 1);
        assert_eq!(rows[0].room, "Electrical");
        assert_eq!(rows[0].witnesses, vec!["Player 3: green".to_string()]);
    }

    #[test]
    fn overview_counts_aborted_games() {
        let mut aborted = game(1);
        aborted.outcome = None;
        aborted.winner = None;
        let out = overview(&[game(0), aborted]);
        assert_eq!(out.games, 2);
        assert_eq!(out.aborted, 1);
        assert_eq!(out.outcomes.get("crewmates_by_ejection"), Some(&1));
        assert_eq!(out.meetings, 2);
        assert_eq!(out.ejections, 2);
        assert!(out.mismatches.is_empty());
    }

    #[test]
    fn task_win_with_open_tasks_is_flagged() {
        let mut claimed = game(3);
        claimed.outcome = Some(Outcome::CrewmatesByTasks);
        for p in &mut claimed.players {
            p.death = None;
            p.tasks_done = p.tasks_total;
        }
        assert_eq!(outcome_mismatch(&claimed), None);

        // pink died with one task open
        claimed.players[3].death = Some(DeathCause::Killed);
        claimed.players[3].tasks_done = 2;
        let out = overview(&[game(0), claimed]);
        assert_eq!(
            out.mismatches,
            vec!["game 3: crewmates_by_tasks but crew tasks at 8/9".to_string()]
        );
    }

    #[test]
    fn ejection_win_with_a_living_impostor_is_flagged() {
        let mut claimed = game(2);
        claimed.players[0].death = None;
        assert_eq!(
            outcome_mismatch(&claimed).as_deref(),
            Some("game 2: crewmates_by_ejection but 1 impostors still alive")
        );
    }

    #[test]
    fn model_totals() {
        let mut attempted = decision("model-a");
        attempted.status = DecisionStatus::Attempted;
        let decisions = vec![decision("model-a"), attempted, decision("model-b")];
        let stats = model_stats(&[game(0)], &decisions);

        assert_eq!(
            stats.iter().map(|s| s.model.as_str()).collect::<Vec<_>>(),
            vec!["model-a", "model-b", "random"]
        );
        let a = &stats[0];
        assert_eq!((a.impostor_seats, a.impostor_wins), (1, 0));
        assert_eq!((a.crewmate_seats, a.crewmate_wins), (1, 1));
        assert_eq!((a.decisions, a.attempted), (2, 1));
        assert_eq!((a.votes_cast, a.votes_on_impostors), (2, 1));
        assert_eq!((a.issues, a.unresolved_issues), (1, 0));

        let b = &stats[1];
        assert_eq!(b.seats(), 1);
        assert_eq!(b.wins(), 1);
        assert_eq!((b.votes_cast, b.votes_on_impostors), (1, 1));
    }
}
