//! Plain-text rendering of the reports.

use std::fmt::Write;

use skeld::core::types::Role;

use crate::report::{KillRow, ModelStats, RunOverview, VoteRow};

fn role(role: Option<Role>) -> &'static str {
    role.map_or("?", Role::as_str)
}

fn percent(part: usize, whole: usize) -> String {
    if whole == 0 {
        "-".to_string()
    } else {
        format!("{:.0}%", part as f64 * 100.0 / whole as f64)
    }
}

pub fn overview(out: &RunOverview) -> String {
    let mut text = format!("games: {} ({} aborted)\n", out.games, out.aborted);
    for (outcome, count) in &out.outcomes {
        let _ = writeln!(text, "  {outcome}: {count}");
    }
    let _ = writeln!(
        text,
        "meetings: {} ({} ejections)\nkills: {}",
        out.meetings, out.ejections, out.kills
    );
    if !out.mismatches.is_empty() {
        text.push_str("outcome mismatches:\n");
        for mismatch in &out.mismatches {
            let _ = writeln!(text, "  {mismatch}");
        }
    }
    text
}

pub fn votes(rows: &[VoteRow]) -> String {
    let mut text = String::new();
    let mut meeting = None;
    for row in rows {
        if meeting != Some((row.game_id, row.timestep)) {
            meeting = Some((row.game_id, row.timestep));
            let ejected = row.ejected.as_deref().unwrap_or("nobody");
            let _ = writeln!(
                text,
                "game {} t{}: ejected {}",
                row.game_id, row.timestep, ejected
            );
        }
        let target = match &row.target {
            Some(target) => format!("{target} ({})", role(row.target_role)),
            None => "skip".to_string(),
        };
        let _ = writeln!(text, "  {} ({}) -> {}", row.voter, role(row.voter_role), target);
    }
    text
}

pub fn kills(rows: &[KillRow]) -> String {
    let mut text = String::new();
    for row in rows {
        let _ = write!(
            text,
            "game {} t{}: {} killed {} in {}",
            row.game_id, row.timestep, row.killer, row.victim, row.room
        );
        if row.witnesses.is_empty() {
            text.push('\n');
        } else {
            let _ = writeln!(text, " (seen by {})", row.witnesses.join(", "));
        }
    }
    text
}

pub fn models(stats: &[ModelStats]) -> String {
    let mut text = format!(
        "{:<28} {:>5} {:>9} {:>9} {:>9} {:>9} {:>10} {:>7}\n",
        "model", "seats", "crew win", "imp win", "decisions", "attempted", "vote acc", "issues"
    );
    for s in stats {
        let issues = format!("{}/{}", s.unresolved_issues, s.issues);
        let _ = writeln!(
            text,
            "{:<28} {:>5} {:>9} {:>9} {:>9} {:>9} {:>10} {:>7}",
            s.model,
            s.seats(),
            percent(s.crewmate_wins, s.crewmate_seats),
            percent(s.impostor_wins, s.impostor_seats),
            s.decisions,
            s.attempted,
            percent(s.votes_on_impostors, s.votes_cast),
            issues,
        );
    }
    text
}
