//! Applying resolved actions to the world, and win evaluation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::action::Action;
use crate::core::state::GameState;
use crate::core::tally::{Ballot, VoteTally};
use crate::core::types::{DeathCause, Meeting, MeetingCause, Outcome, Phase, PlayerId};
use crate::core::world::{RuleViolation, World};

/// Outcome of one voting round, after the ballots were revealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteResult {
    pub tally: VoteTally,
    pub ballots: BTreeMap<PlayerId, Ballot>,
    pub ejected: Option<PlayerId>,
}

/// Win check, Impostor parity first.
pub fn evaluate(world: &World) -> Option<Outcome> {
    let (impostors, crewmates) = world.alive_counts();
    if impostors >= crewmates {
        return Some(Outcome::ImpostorsByParity);
    }
    if impostors == 0 {
        return Some(Outcome::CrewmatesByEjection);
    }
    if world.crew_tasks_complete() {
        return Some(Outcome::CrewmatesByTasks);
    }
    None
}

/// Apply `action` for `actor` and return a one-line summary of what happened.
///
/// Witnesses, transcripts and ballots are updated here; meetings are opened on
/// `state`. Attempted actions change nothing but the actor's own log.
pub fn apply_action(
    world: &mut World,
    state: &mut GameState,
    actor: PlayerId,
    action: &Action,
) -> Result<String, RuleViolation> {
    check_phase(state.phase(), action)?;
    let t = state.timestep();
    let name = world.player(actor)?.name.clone();
    let here = world.player(actor)?.location;
    let here_name = world.map().name(here).to_string();

    let summary = match action {
        Action::Move { from, to } => {
            if *from != here {
                return Err(mismatch(world, *from, *to, "corridor"));
            }
            world.apply_move(actor, *to)?;
            let to_name = world.map().name(*to).to_string();
            world.witness(here, actor, &format!("Timestep {t}: {name} left {here_name} towards {to_name}."));
            world.witness(*to, actor, &format!("Timestep {t}: {name} entered {to_name} from {here_name}."));
            format!("MOVE from {here_name} to {to_name}")
        }
        Action::Vent { from, to } => {
            if *from != here {
                return Err(mismatch(world, *from, *to, "vent"));
            }
            world.apply_vent(actor, *to)?;
            let to_name = world.map().name(*to).to_string();
            world.witness(here, actor, &format!("Timestep {t}: {name} vanished into a vent in {here_name}."));
            world.witness(*to, actor, &format!("Timestep {t}: {name} climbed out of a vent in {to_name}."));
            format!("VENT from {here_name} to {to_name}")
        }
        Action::Kill { victim } => {
            world.apply_kill(actor, *victim, t)?;
            let victim_name = world.player(*victim)?.name.clone();
            world.witness(here, actor, &format!("Timestep {t}: {name} killed {victim_name} in {here_name}."));
            format!("KILL {victim_name}")
        }
        Action::CompleteTask { task } | Action::CompleteFakeTask { task } => {
            let fake = matches!(action, Action::CompleteFakeTask { .. });
            world.apply_task_step(actor, *task, fake)?;
            let task_name = world.player(actor)?.tasks[*task].name.clone();
            world.witness(here, actor, &format!("Timestep {t}: {name} was doing a task in {here_name}."));
            if fake {
                format!("COMPLETE FAKE TASK - {task_name}")
            } else {
                format!("COMPLETE TASK - {task_name}")
            }
        }
        Action::CallMeeting { .. } => {
            let room = world.use_button(actor)?;
            open_meeting(world, state, Meeting {
                cause: MeetingCause::Button,
                caller: actor,
                room,
                body: None,
            });
            world.broadcast(&format!(
                "Timestep {t}: {name} called an emergency meeting at {here_name}."
            ));
            format!("CALL MEETING using the emergency button at {here_name}")
        }
        Action::ReportDeadBody { room, body } => {
            let victim_name = world.player(*body)?.name.clone();
            if *room != here || !world.unreported_bodies(here).any(|b| b.victim == *body) {
                return Err(RuleViolation::NoBody(*body));
            }
            open_meeting(world, state, Meeting {
                cause: MeetingCause::ReportedBody,
                caller: actor,
                room: here,
                body: Some(*body),
            });
            world.broadcast(&format!(
                "Timestep {t}: {name} reported the dead body of {victim_name} in {here_name}."
            ));
            format!("REPORT DEAD BODY at {here_name}")
        }
        Action::ViewMonitor => {
            if !world.map().room(here).has_cameras {
                return Err(RuleViolation::NoMonitor);
            }
            let snapshot = world.monitor_snapshot().join("; ");
            world.observe(actor, &format!("Timestep {t}: Security monitor shows {snapshot}."));
            "VIEW MONITOR".to_string()
        }
        Action::Speak { message } => {
            world.push_transcript(format!("{name}: {message}"));
            format!("SPEAK: {message}")
        }
        Action::Vote { target } => {
            if *target == actor || !world.is_alive(*target) {
                return Err(RuleViolation::InvalidVictim { victim: *target });
            }
            state.cast_ballot(actor, Ballot::Player(*target))?;
            format!("VOTE {}", world.player(*target)?.name)
        }
        Action::SkipVote => {
            state.cast_ballot(actor, Ballot::Skip)?;
            "SKIP VOTE".to_string()
        }
        Action::Attempted { text } => {
            world.observe(actor, &format!("Timestep {t}: Your action '{text}' was not possible."));
            format!("ATTEMPTED: {text}")
        }
    };

    world.record_history(actor, t, &summary);
    Ok(summary)
}

/// Reveal ballots, eject the strict leader if any, and send everyone back to
/// the button room.
pub fn resolve_votes(world: &mut World, state: &mut GameState) -> Result<VoteResult, RuleViolation> {
    let t = state.timestep();
    let (tally, ballots) = state.close_voting();
    let ejected = tally.ejected();

    let mut reveal = Vec::with_capacity(ballots.len());
    for (voter, ballot) in &ballots {
        let target = match ballot {
            Ballot::Player(target) => world.player(*target)?.name.clone(),
            Ballot::Skip => "skip".to_string(),
        };
        reveal.push(format!("{} -> {}", world.player(*voter)?.name, target));
    }
    world.broadcast(&format!("Timestep {t}: Votes were {}.", reveal.join(", ")));

    match ejected {
        Some(player) => {
            world.mark_dead(player, DeathCause::Ejected)?;
            let ejected_name = world.player(player)?.name.clone();
            world.broadcast(&format!("Timestep {t}: {ejected_name} was ejected."));
        }
        None => world.broadcast(&format!("Timestep {t}: No one was ejected.")),
    }

    world.regroup_at_button();
    world.clear_transcript();
    Ok(VoteResult {
        tally,
        ballots,
        ejected,
    })
}

fn open_meeting(world: &mut World, state: &mut GameState, meeting: Meeting) {
    world.clear_bodies();
    world.clear_transcript();
    state.begin_meeting(meeting);
}

fn check_phase(phase: Phase, action: &Action) -> Result<(), RuleViolation> {
    let allowed = match action {
        Action::Attempted { .. } => !matches!(phase, Phase::Terminal { .. }),
        Action::Speak { .. } => matches!(phase, Phase::Discussion { .. }),
        Action::Vote { .. } | Action::SkipVote => phase == Phase::Voting,
        _ => phase == Phase::Task,
    };
    if allowed {
        Ok(())
    } else {
        Err(RuleViolation::WrongPhase {
            action: action.verb().to_string(),
            phase: phase.label(),
        })
    }
}

fn mismatch(world: &World, from: usize, to: usize, via: &'static str) -> RuleViolation {
    let name = |room: usize| {
        if room < world.map().len() {
            world.map().name(room).to_string()
        } else {
            format!("room #{room}")
        }
    };
    RuleViolation::NotAdjacent {
        from: name(from),
        to: name(to),
        via,
    }
}
