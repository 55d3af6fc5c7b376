//! Legal action enumeration.
//!
//! The catalog is recomputed for every turn from live world state. Its order is
//! part of the contract: the resolver walks it front to back and the first
//! entry to match wins.

use crate::core::action::{Action, LegalAction};
use crate::core::state::GameState;
use crate::core::types::{Phase, PlayerId, Role};
use crate::core::world::World;

/// Legal actions for `player` in the current phase.
///
/// Dead players, unknown seats and finished games get an empty set.
pub fn legal_actions(world: &World, state: &GameState, player: PlayerId) -> Vec<LegalAction> {
    if !world.is_alive(player) {
        return Vec::new();
    }
    match state.phase() {
        Phase::Task => task_actions(world, state.timestep(), player),
        Phase::Discussion { .. } => vec![LegalAction::new(
            Action::Speak {
                message: String::new(),
            },
            "SPEAK: ...".to_string(),
        )],
        Phase::Voting => vote_actions(world, player),
        Phase::Terminal { .. } => Vec::new(),
    }
}

fn task_actions(world: &World, timestep: u32, player: PlayerId) -> Vec<LegalAction> {
    let Ok(actor) = world.player(player) else {
        return Vec::new();
    };
    let map = world.map();
    let here = actor.location;
    let here_name = map.name(here);
    let mut actions = Vec::new();

    for &to in world.movement_neighbors(here) {
        actions.push(LegalAction::new(
            Action::Move { from: here, to },
            format!("MOVE from {} to {}", here_name, map.name(to)),
        ));
    }
    for to in world.vent_neighbors(player, here) {
        actions.push(LegalAction::new(
            Action::Vent { from: here, to },
            format!("VENT from {} to {}", here_name, map.name(to)),
        ));
    }

    let open_tasks = |fake: bool| {
        actor
            .tasks
            .iter()
            .enumerate()
            .filter(move |(_, task)| task.fake == fake && !task.is_done() && task.room == here)
    };
    for (task, entry) in open_tasks(false) {
        actions.push(LegalAction::new(
            Action::CompleteTask { task },
            format!("COMPLETE TASK - {}", entry.name),
        ));
    }
    for (task, entry) in open_tasks(true) {
        actions.push(LegalAction::new(
            Action::CompleteFakeTask { task },
            format!("COMPLETE FAKE TASK - {}", entry.name),
        ));
    }

    if actor.role.can_kill() && world.kill_ready(player, timestep) {
        for victim in world
            .occupants(here)
            .filter(|p| p.seat != player && p.role == Role::Crewmate)
        {
            actions.push(LegalAction::new(
                Action::Kill { victim: victim.seat },
                format!("KILL {}", victim.name),
            ));
        }
    }

    if here == map.button_room() && actor.buttons_left > 0 {
        actions.push(LegalAction::new(
            Action::CallMeeting { room: here },
            format!("CALL MEETING using the emergency button at {here_name}"),
        ));
    }
    // One report per room; a meeting clears every body at once.
    if let Some(body) = world.unreported_bodies(here).next() {
        actions.push(LegalAction::new(
            Action::ReportDeadBody {
                room: here,
                body: body.victim,
            },
            format!("REPORT DEAD BODY at {here_name}"),
        ));
    }
    if map.room(here).has_cameras {
        actions.push(LegalAction::new(
            Action::ViewMonitor,
            "VIEW MONITOR".to_string(),
        ));
    }
    actions
}

fn vote_actions(world: &World, voter: PlayerId) -> Vec<LegalAction> {
    let mut actions: Vec<LegalAction> = world
        .players()
        .iter()
        .filter(|p| p.is_alive() && p.seat != voter)
        .map(|p| LegalAction::vote(p.seat, &p.name))
        .collect();
    actions.push(LegalAction::new(Action::SkipVote, "SKIP VOTE".to_string()));
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Meeting, MeetingCause};
    use crate::test_support::{room, small_state, small_world};

    fn texts(actions: &[LegalAction]) -> Vec<&str> {
        actions.iter().map(|a| a.text.as_str()).collect()
    }

    #[test]
    fn impostor_task_phase_order() {
        let world = small_world();
        let state = small_state();
        let actions = legal_actions(&world, &state, 0);
        assert_eq!(
            texts(&actions),
            vec![
                "MOVE from Cafeteria to Weapons",
                "MOVE from Cafeteria to Admin",
                "MOVE from Cafeteria to Upper Engine",
                "MOVE from Cafeteria to Medbay",
                "VENT from Cafeteria to Admin",
                "KILL Player 2: blue",
                "KILL Player 3: green",
                "CALL MEETING using the emergency button at Cafeteria",
            ]
        );
    }

    #[test]
    fn crewmate_gets_no_vent_or_kill() {
        let world = small_world();
        let state = small_state();
        let actions = legal_actions(&world, &state, 1);
        assert!(actions.iter().all(|a| !matches!(
            a.action,
            Action::Vent { .. } | Action::Kill { .. }
        )));
    }

    #[test]
    fn kill_hidden_during_cooldown() {
        let mut world = small_world();
        let mut state = small_state();
        world.apply_kill(0, 1, 0).expect("kill");
        let has_kill = |world: &World, state: &GameState| {
            legal_actions(world, state, 0)
                .iter()
                .any(|a| matches!(a.action, Action::Kill { .. }))
        };
        for _ in 0..2 {
            state.force_timestep(state.timestep() + 1);
            assert!(!has_kill(&world, &state));
        }
        state.force_timestep(3);
        assert!(has_kill(&world, &state));
    }

    #[test]
    fn body_is_reportable_once() {
        let mut world = small_world();
        let state = small_state();
        world.apply_kill(0, 1, 0).expect("kill");
        let actions = legal_actions(&world, &state, 2);
        assert!(texts(&actions).contains(&"REPORT DEAD BODY at Cafeteria"));
        world.clear_bodies();
        let actions = legal_actions(&world, &state, 2);
        assert!(!texts(&actions).contains(&"REPORT DEAD BODY at Cafeteria"));
    }

    #[test]
    fn camera_room_offers_monitor() {
        let mut world = small_world();
        let state = small_state();
        let security = room(&world, "Security");
        world.apply_move(0, room(&world, "Upper Engine")).expect("move");
        world.apply_move(0, security).expect("move");
        let actions = legal_actions(&world, &state, 0);
        assert_eq!(actions.last().map(|a| a.text.as_str()), Some("VIEW MONITOR"));
    }

    #[test]
    fn meeting_phases_offer_speak_then_votes() {
        let world = small_world();
        let mut state = small_state();
        state.begin_meeting(Meeting {
            cause: MeetingCause::Button,
            caller: 1,
            room: world.map().button_room(),
            body: None,
        });
        assert_eq!(texts(&legal_actions(&world, &state, 2)), vec!["SPEAK: ..."]);

        state.force_phase(Phase::Voting);
        assert_eq!(
            texts(&legal_actions(&world, &state, 2)),
            vec!["VOTE Player 1: red", "VOTE Player 2: blue", "SKIP VOTE"]
        );
    }

    #[test]
    fn dead_players_have_no_actions() {
        let mut world = small_world();
        let state = small_state();
        world.apply_kill(0, 1, 0).expect("kill");
        assert!(legal_actions(&world, &state, 1).is_empty());
        assert!(legal_actions(&world, &state, 9).is_empty());
    }
}
