//! Decision-maker abstractions.
//!
//! The engine talks to every seat through [`Agent`] and never depends on a
//! concrete implementation. Agents see a [`PlayerView`] snapshot plus the
//! legal set, and answer with a [`Decision`].

use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::core::action::{Action, LegalAction};
use crate::core::resolver::Sections;
use crate::core::view::PlayerView;

pub mod human;
pub mod model;
pub mod random;

pub use human::HumanAgent;
pub use model::{FormatRetriesExhausted, ModelAgent, RetryPolicy, TransportRetriesExhausted};
pub use random::RandomAgent;

/// One chosen action plus everything worth logging about how it was chosen.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    /// Position in the legal set; `None` for attempted actions.
    pub index: Option<usize>,
    pub prompt: Option<String>,
    pub raw_response: Option<String>,
    pub sections: Option<Sections>,
    /// Replies received before one resolved.
    pub attempts: u32,
    /// Problems met while deciding, all marked resolved.
    pub issues: Vec<Issue>,
}

impl Decision {
    /// A decision taken directly from the legal set.
    pub fn pick(index: usize, action: Action) -> Self {
        Self {
            action,
            index: Some(index),
            prompt: None,
            raw_response: None,
            sections: None,
            attempts: 1,
            issues: Vec::new(),
        }
    }
}

pub trait Agent: Send {
    /// Choose one action for the current turn.
    fn choose_action<'a>(
        &'a mut self,
        view: &'a PlayerView,
        legal: &'a [LegalAction],
        timestep: u32,
    ) -> BoxFuture<'a, Result<Decision>>;

    /// Every issue recorded so far, resolved or not.
    fn issues(&self) -> &[Issue] {
        &[]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Transport,
    Format,
}

/// A recorded transport or format problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub player: String,
    pub model: String,
    pub attempt: u32,
    pub error: String,
    /// Set once a later attempt produced a usable decision.
    pub resolved: bool,
    pub timestep: u32,
    pub response_snippet: Option<String>,
    pub http_status: Option<u16>,
}
