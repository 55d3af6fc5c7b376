//! Read-only projection of the world handed to decision-makers.
//!
//! A view is a snapshot; nothing in it refers back into the world, so agents
//! cannot mutate game state and can hold it across await points.

use serde::{Deserialize, Serialize};

use crate::core::state::GameState;
use crate::core::types::{MeetingCause, PlayerId, Role};
use crate::core::world::{Player, World};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub name: String,
    pub room: String,
    pub remaining: u32,
    pub fake: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub seat: PlayerId,
    pub name: String,
    pub role: Role,
    pub personality: Option<String>,
    pub alive: bool,
    pub location: String,
    pub phase: String,
    pub timestep: u32,
    /// Fellow Impostors; empty for Crewmates.
    pub teammates: Vec<String>,
    pub tasks: Vec<TaskView>,
    /// Other living players in the same room.
    pub nearby: Vec<String>,
    pub bodies_here: Vec<String>,
    pub living: Vec<String>,
    pub observations: Vec<String>,
    pub history: Vec<String>,
    /// Why the current meeting was called, if one is running.
    pub meeting: Option<String>,
    pub transcript: Vec<String>,
    pub buttons_left: u32,
}

impl PlayerView {
    /// Project `player`'s knowledge out of the world. Unknown seats yield `None`.
    pub fn project(world: &World, state: &GameState, player: PlayerId) -> Option<Self> {
        let me = world.player(player).ok()?;
        let map = world.map();
        let others = |filter: &dyn Fn(&Player) -> bool| -> Vec<String> {
            world
                .players()
                .iter()
                .filter(|p| p.seat != player && filter(p))
                .map(|p| p.name.clone())
                .collect()
        };

        let teammates = if me.role == Role::Impostor {
            others(&|p| p.role == Role::Impostor)
        } else {
            Vec::new()
        };
        let nearby = others(&|p| p.is_alive() && p.location == me.location);
        let living = others(&|p| p.is_alive());
        let bodies_here = world
            .unreported_bodies(me.location)
            .filter_map(|b| world.player(b.victim).ok())
            .map(|p| p.name.clone())
            .collect();

        let meeting = state.meeting().and_then(|m| {
            let caller = world.player(m.caller).ok()?;
            let room = map.name(m.room);
            Some(match (m.cause, m.body) {
                (MeetingCause::ReportedBody, Some(body)) => format!(
                    "{} reported the body of {} in {}",
                    caller.name,
                    world.player(body).ok()?.name,
                    room
                ),
                _ => format!("{} pressed the emergency button in {}", caller.name, room),
            })
        });

        Some(Self {
            seat: player,
            name: me.name.clone(),
            role: me.role,
            personality: me.personality.clone(),
            alive: me.is_alive(),
            location: map.name(me.location).to_string(),
            phase: state.phase().label(),
            timestep: state.timestep(),
            teammates,
            tasks: me
                .tasks
                .iter()
                .map(|t| TaskView {
                    name: t.name.clone(),
                    room: map.name(t.room).to_string(),
                    remaining: t.remaining,
                    fake: t.fake,
                })
                .collect(),
            nearby,
            bodies_here,
            living,
            observations: me.observations().map(str::to_string).collect(),
            history: me.history().to_vec(),
            meeting,
            transcript: world.transcript().to_vec(),
            buttons_left: me.buttons_left,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Meeting;
    use crate::test_support::{small_state, small_world};

    #[test]
    fn crewmate_view_hides_impostor_roster() {
        let world = small_world();
        let state = small_state();
        let view = PlayerView::project(&world, &state, 1).expect("view");
        assert_eq!(view.role, Role::Crewmate);
        assert!(view.teammates.is_empty());
        assert_eq!(view.nearby, vec!["Player 1: red", "Player 3: green"]);
        assert_eq!(view.location, "Cafeteria");
        assert_eq!(view.phase, "Task phase");
    }

    #[test]
    fn meeting_rationale_is_described() {
        let mut world = small_world();
        let mut state = small_state();
        world.apply_kill(0, 1, 0).expect("kill");
        let room = world.map().button_room();
        state.begin_meeting(Meeting {
            cause: MeetingCause::ReportedBody,
            caller: 2,
            room,
            body: Some(1),
        });
        let view = PlayerView::project(&world, &state, 0).expect("view");
        assert_eq!(
            view.meeting.as_deref(),
            Some("Player 3: green reported the body of Player 2: blue in Cafeteria")
        );
        assert_eq!(view.living, vec!["Player 3: green"]);
        assert!(PlayerView::project(&world, &state, 7).is_none());
    }
}
