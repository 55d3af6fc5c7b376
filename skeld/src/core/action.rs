//! In-world actions and their canonical text.
//!
//! The canonical text is what decision-makers are shown and what the resolver
//! matches free-form output against, so it must be unique per legal action.

use serde::{Deserialize, Serialize};

use crate::core::map::RoomId;
use crate::core::types::PlayerId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Move { from: RoomId, to: RoomId },
    Vent { from: RoomId, to: RoomId },
    Kill { victim: PlayerId },
    /// Index into the actor's task list.
    CompleteTask { task: usize },
    /// Index into the actor's (fake) task list.
    CompleteFakeTask { task: usize },
    CallMeeting { room: RoomId },
    ReportDeadBody { room: RoomId, body: PlayerId },
    ViewMonitor,
    Speak { message: String },
    Vote { target: PlayerId },
    SkipVote,
    /// Recognisable but currently illegal; consumed as a failed turn.
    Attempted { text: String },
}

impl Action {
    /// Stable upper-case verb used in logs and pattern tables.
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Move { .. } => "MOVE",
            Action::Vent { .. } => "VENT",
            Action::Kill { .. } => "KILL",
            Action::CompleteTask { .. } => "COMPLETE TASK",
            Action::CompleteFakeTask { .. } => "COMPLETE FAKE TASK",
            Action::CallMeeting { .. } => "CALL MEETING",
            Action::ReportDeadBody { .. } => "REPORT DEAD BODY",
            Action::ViewMonitor => "VIEW MONITOR",
            Action::Speak { .. } => "SPEAK",
            Action::Vote { .. } => "VOTE",
            Action::SkipVote => "SKIP VOTE",
            Action::Attempted { .. } => "ATTEMPTED",
        }
    }

    pub fn is_speak(&self) -> bool {
        matches!(self, Action::Speak { .. })
    }

    pub fn is_vote(&self) -> bool {
        matches!(self, Action::Vote { .. })
    }
}

/// A catalog entry: the action plus its canonical text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegalAction {
    pub action: Action,
    pub text: String,
    /// Target player name for VOTE entries (full `Player N: color` form).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
}

impl LegalAction {
    pub fn new(action: Action, text: String) -> Self {
        Self {
            action,
            text,
            target_name: None,
        }
    }

    pub fn vote(target: PlayerId, target_name: &str) -> Self {
        Self {
            action: Action::Vote { target },
            text: format!("VOTE {target_name}"),
            target_name: Some(target_name.to_string()),
        }
    }

    /// Return this action carrying `message`, for SPEAK entries.
    pub fn with_message(&self, message: &str) -> Action {
        match &self.action {
            Action::Speak { .. } => Action::Speak {
                message: message.trim().to_string(),
            },
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_entry_uses_full_name() {
        let entry = LegalAction::vote(2, "Player 3: green");
        assert_eq!(entry.text, "VOTE Player 3: green");
        assert_eq!(entry.action, Action::Vote { target: 2 });
    }

    #[test]
    fn with_message_only_touches_speak() {
        let speak = LegalAction::new(
            Action::Speak {
                message: String::new(),
            },
            "SPEAK: ...".to_string(),
        );
        assert_eq!(
            speak.with_message("  hi there "),
            Action::Speak {
                message: "hi there".to_string()
            }
        );
        let skip = LegalAction::new(Action::SkipVote, "SKIP VOTE".to_string());
        assert_eq!(skip.with_message("ignored"), Action::SkipVote);
    }
}
