//! Shared deterministic types for the game core.
//!
//! These types define stable contracts between core components and the
//! serialized event log, so their serde representations must stay stable.

use serde::{Deserialize, Serialize};

use crate::core::map::RoomId;

/// Seat index in the fixed seating order.
pub type PlayerId = usize;

/// Identity of one game instance inside an experiment.
pub type GameId = u32;

/// Player colours. Caps the number of seats in a game.
pub const COLORS: [&str; 12] = [
    "red", "blue", "green", "pink", "orange", "yellow", "black", "white", "purple", "brown",
    "cyan", "lime",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Crewmate,
    Impostor,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Crewmate => "Crewmate",
            Role::Impostor => "Impostor",
        }
    }

    pub fn can_vent(self) -> bool {
        self == Role::Impostor
    }

    pub fn can_kill(self) -> bool {
        self == Role::Impostor
    }

    /// Whether this role's tasks count toward the task win.
    pub fn does_real_tasks(self) -> bool {
        self == Role::Crewmate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    /// Killed by an Impostor; leaves a body.
    Killed,
    /// Voted off the ship; leaves no body.
    Ejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Living Impostors reached parity with living Crewmates.
    ImpostorsByParity,
    /// The timestep limit expired.
    ImpostorsByTime,
    /// Every Impostor was ejected.
    CrewmatesByEjection,
    /// Every living Crewmate finished their tasks.
    CrewmatesByTasks,
}

impl Outcome {
    pub fn winner(self) -> Role {
        match self {
            Outcome::ImpostorsByParity | Outcome::ImpostorsByTime => Role::Impostor,
            Outcome::CrewmatesByEjection | Outcome::CrewmatesByTasks => Role::Crewmate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingCause {
    Button,
    ReportedBody,
}

/// Why the current meeting was called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub cause: MeetingCause,
    pub caller: PlayerId,
    pub room: RoomId,
    /// Victim whose body was reported, for `ReportedBody`.
    pub body: Option<PlayerId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Task,
    Discussion { round: u8 },
    Voting,
    Terminal { outcome: Outcome },
}

impl Phase {
    pub fn is_meeting(self) -> bool {
        matches!(self, Phase::Discussion { .. } | Phase::Voting)
    }

    pub fn label(self) -> String {
        match self {
            Phase::Task => "Task phase".to_string(),
            Phase::Discussion { round } => format!("Meeting phase - discussion round {round}"),
            Phase::Voting => "Meeting phase - voting".to_string(),
            Phase::Terminal { .. } => "Game over".to_string(),
        }
    }
}
