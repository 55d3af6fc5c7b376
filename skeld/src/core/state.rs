//! Phase state machine and turn cursor.
//!
//! [`GameState::next_step`] decides who acts next. Passes wrap at the end of
//! the seating order: a task pass bumps the timestep, a discussion pass moves
//! to the next round, and a full voting pass asks the engine to count ballots.

use std::collections::BTreeMap;

use crate::core::tally::{Ballot, VoteTally};
use crate::core::types::{Meeting, Outcome, Phase, PlayerId};
use crate::core::world::{RuleViolation, World};

/// What the engine should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Act(PlayerId),
    ResolveVotes,
    Finished(Outcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    phase: Phase,
    timestep: u32,
    cursor: PlayerId,
    meeting: Option<Meeting>,
    ballots: BTreeMap<PlayerId, Ballot>,
    discussion_rounds: u8,
    max_timesteps: u32,
}

impl GameState {
    pub fn new(discussion_rounds: u8, max_timesteps: u32) -> Self {
        Self {
            phase: Phase::Task,
            timestep: 0,
            cursor: 0,
            meeting: None,
            ballots: BTreeMap::new(),
            discussion_rounds: discussion_rounds.max(1),
            max_timesteps,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn timestep(&self) -> u32 {
        self.timestep
    }

    pub fn meeting(&self) -> Option<&Meeting> {
        self.meeting.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Terminal { .. })
    }

    /// Number of ballots cast so far. Their contents stay hidden until
    /// [`GameState::close_voting`].
    pub fn ballots_cast(&self) -> usize {
        self.ballots.len()
    }

    pub fn next_step(&mut self, world: &World) -> Step {
        // One wrap per call is enough: a wrap only fails to find a seat when
        // nobody is alive, which ends the game.
        for _ in 0..2 {
            match self.phase {
                Phase::Terminal { outcome } => return Step::Finished(outcome),
                Phase::Task if self.timestep >= self.max_timesteps => {
                    return self.finish(Outcome::ImpostorsByTime);
                }
                _ => {}
            }

            if let Some(seat) = (self.cursor..world.players().len()).find(|&s| world.is_alive(s)) {
                self.cursor = seat + 1;
                return Step::Act(seat);
            }

            self.cursor = 0;
            match self.phase {
                Phase::Task => self.timestep += 1,
                Phase::Discussion { round } if round < self.discussion_rounds => {
                    self.phase = Phase::Discussion { round: round + 1 };
                }
                Phase::Discussion { .. } => self.phase = Phase::Voting,
                Phase::Voting => return Step::ResolveVotes,
                Phase::Terminal { .. } => {}
            }
        }
        self.finish(Outcome::ImpostorsByParity)
    }

    /// Interrupt the task pass and open discussion round 1.
    ///
    /// The interrupted pass counts as finished, so the timestep advances.
    pub fn begin_meeting(&mut self, meeting: Meeting) {
        self.timestep += 1;
        self.phase = Phase::Discussion { round: 1 };
        self.cursor = 0;
        self.meeting = Some(meeting);
        self.ballots.clear();
    }

    pub fn cast_ballot(&mut self, voter: PlayerId, ballot: Ballot) -> Result<(), RuleViolation> {
        if self.phase != Phase::Voting {
            return Err(RuleViolation::WrongPhase {
                action: "VOTE".to_string(),
                phase: self.phase.label(),
            });
        }
        if self.ballots.contains_key(&voter) {
            return Err(RuleViolation::AlreadyVoted(voter));
        }
        self.ballots.insert(voter, ballot);
        Ok(())
    }

    /// Reveal the ballots, return to the task phase and hand back the tally
    /// together with every voter's ballot.
    pub fn close_voting(&mut self) -> (VoteTally, BTreeMap<PlayerId, Ballot>) {
        let ballots = std::mem::take(&mut self.ballots);
        let tally = VoteTally::from_ballots(ballots.values());
        self.phase = Phase::Task;
        self.cursor = 0;
        self.meeting = None;
        (tally, ballots)
    }

    pub fn finish(&mut self, outcome: Outcome) -> Step {
        self.phase = Phase::Terminal { outcome };
        Step::Finished(outcome)
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn force_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.cursor = 0;
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn force_timestep(&mut self, timestep: u32) {
        self.timestep = timestep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{DeathCause, MeetingCause};
    use crate::test_support::small_world;

    fn meeting() -> Meeting {
        Meeting {
            cause: MeetingCause::Button,
            caller: 0,
            room: 0,
            body: None,
        }
    }

    #[test]
    fn task_pass_is_round_robin_and_bumps_timestep_once() {
        let mut world = small_world();
        world.mark_dead(1, DeathCause::Ejected).expect("eject");
        let mut state = GameState::new(3, 50);

        let mut seen = Vec::new();
        for _ in 0..2 {
            match state.next_step(&world) {
                Step::Act(seat) => seen.push(seat),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(seen, vec![0, 2]);
        assert_eq!(state.timestep(), 0);

        assert_eq!(state.next_step(&world), Step::Act(0));
        assert_eq!(state.timestep(), 1);
        assert_eq!(state.next_step(&world), Step::Act(2));
        assert_eq!(state.timestep(), 1);
    }

    #[test]
    fn discussion_rounds_then_voting() {
        let world = small_world();
        let mut state = GameState::new(2, 50);
        state.begin_meeting(meeting());
        assert_eq!(state.timestep(), 1);

        let mut phases = Vec::new();
        loop {
            match state.next_step(&world) {
                Step::Act(seat) => {
                    phases.push((state.phase(), seat));
                    if state.phase() == Phase::Voting {
                        let ballot = Ballot::Player(if seat == 0 { 1 } else { 0 });
                        state.cast_ballot(seat, ballot).expect("ballot");
                    }
                }
                Step::ResolveVotes => break,
                Step::Finished(outcome) => panic!("finished early: {outcome:?}"),
            }
        }
        assert_eq!(phases.len(), 9);
        assert_eq!(phases[0], (Phase::Discussion { round: 1 }, 0));
        assert_eq!(phases[3], (Phase::Discussion { round: 2 }, 0));
        assert_eq!(phases[6], (Phase::Voting, 0));

        assert_eq!(state.ballots_cast(), 3);
        let (tally, ballots) = state.close_voting();
        assert_eq!(tally.ejected(), Some(0));
        assert_eq!(ballots.len(), 3);
        assert_eq!(state.phase(), Phase::Task);
        assert!(state.meeting().is_none());
        assert_eq!(state.timestep(), 1);
    }

    #[test]
    fn double_vote_is_rejected() {
        let mut state = GameState::new(3, 50);
        assert!(matches!(
            state.cast_ballot(0, Ballot::Skip),
            Err(RuleViolation::WrongPhase { .. })
        ));
        state.force_phase(Phase::Voting);
        state.cast_ballot(0, Ballot::Skip).expect("first");
        assert_eq!(
            state.cast_ballot(0, Ballot::Player(1)),
            Err(RuleViolation::AlreadyVoted(0))
        );
    }

    #[test]
    fn time_limit_ends_the_game() {
        let world = small_world();
        let mut state = GameState::new(3, 2);
        let mut acted = 0;
        let outcome = loop {
            match state.next_step(&world) {
                Step::Act(_) => acted += 1,
                Step::Finished(outcome) => break outcome,
                Step::ResolveVotes => panic!("no meeting"),
            }
        };
        assert_eq!(outcome, Outcome::ImpostorsByTime);
        assert_eq!(acted, 6);
        assert_eq!(state.timestep(), 2);
        assert!(state.is_finished());
    }
}
