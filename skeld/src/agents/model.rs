//! Model-backed agent: prompt, call the endpoint, resolve, retry.
//!
//! Two nested retry loops. The outer format loop re-asks with corrective
//! feedback when the reply matches nothing; the inner transport loop re-sends
//! the same conversation when the endpoint fails. Exhausting either is an
//! error that aborts the game.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::agents::{Agent, Decision, Issue, IssueKind};
use crate::core::action::LegalAction;
use crate::core::resolver::{Resolution, resolve};
use crate::core::view::PlayerView;
use crate::io::endpoint::{ChatMessage, DecisionEndpoint, TransportError};
use crate::io::prompt::PromptEngine;

const SNIPPET_CHARS: usize = 200;

/// Every reply failed to resolve, including the feedback retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{player} gave no usable action after {attempts} replies: {last_reason}")]
pub struct FormatRetriesExhausted {
    pub player: String,
    pub attempts: u32,
    pub last_reason: String,
}

/// The endpoint failed on every transport attempt, or failed fatally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decision endpoint failed for {player} after {attempts} attempts: {source}")]
pub struct TransportRetriesExhausted {
    pub player: String,
    pub attempts: u32,
    #[source]
    pub source: TransportError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra requests after an unresolvable reply.
    pub format_retries: u32,
    /// Total sends per request, first one included.
    pub transport_attempts: u32,
    /// Sleep `backoff * attempt` between transport attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            format_retries: 3,
            transport_attempts: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

pub struct ModelAgent {
    player: String,
    model: String,
    endpoint: Arc<dyn DecisionEndpoint>,
    prompts: Arc<PromptEngine>,
    map_overview: Arc<str>,
    policy: RetryPolicy,
    memory: Option<String>,
    ledger: Vec<Issue>,
}

impl ModelAgent {
    pub fn new(
        player: &str,
        model: &str,
        endpoint: Arc<dyn DecisionEndpoint>,
        prompts: Arc<PromptEngine>,
        map_overview: Arc<str>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            player: player.to_string(),
            model: model.to_string(),
            endpoint,
            prompts,
            map_overview,
            policy,
            memory: None,
            ledger: Vec::new(),
        }
    }

    fn issue(&self, kind: IssueKind, attempt: u32, timestep: u32, error: String) -> Issue {
        Issue {
            kind,
            player: self.player.clone(),
            model: self.model.clone(),
            attempt,
            error,
            resolved: false,
            timestep,
            response_snippet: None,
            http_status: None,
        }
    }

    #[instrument(skip_all, fields(player = %self.player, model = %self.model, timestep = timestep))]
    async fn decide(
        &mut self,
        view: &PlayerView,
        legal: &[LegalAction],
        timestep: u32,
    ) -> Result<Decision> {
        let system = self.prompts.render_system(view, &self.map_overview)?;
        let turn = self
            .prompts
            .render_turn(view, legal, self.memory.as_deref())?;
        let base = vec![ChatMessage::system(system), ChatMessage::user(turn.clone())];

        let mut messages = base.clone();
        let mut issues = Vec::new();
        let mut last_reason = String::new();
        let max_replies = self.policy.format_retries + 1;

        for reply_no in 1..=max_replies {
            let raw = match self.request(&messages, timestep, &mut issues).await {
                Ok(raw) => raw,
                Err(err) => {
                    self.ledger.extend(issues);
                    return Err(err.into());
                }
            };
            let resolved = resolve(&raw, legal);
            let (index, action) = match resolved.outcome {
                Resolution::Chosen { index, action } => {
                    debug!(action = action.verb(), reply_no, "resolved reply");
                    (Some(index), action)
                }
                Resolution::Attempted(action) => {
                    debug!(candidate = %resolved.sections.action, "attempted illegal action");
                    (None, action)
                }
                Resolution::NeedsRetry(reason) => {
                    warn!(reply_no, %reason, "unresolvable reply");
                    let mut issue = self.issue(IssueKind::Format, reply_no, timestep, reason.clone());
                    issue.response_snippet = Some(raw.chars().take(SNIPPET_CHARS).collect());
                    issues.push(issue);
                    let feedback = self.prompts.render_feedback(&reason, legal)?;
                    messages = base.clone();
                    messages.push(ChatMessage::assistant(raw));
                    messages.push(ChatMessage::user(feedback));
                    last_reason = reason;
                    continue;
                }
            };
            if let Some(memory) = resolved.sections.condensed_memory.as_ref()
                && !memory.is_empty()
            {
                self.memory = Some(memory.clone());
            }
            for issue in &mut issues {
                issue.resolved = true;
            }
            self.ledger.extend(issues.iter().cloned());
            return Ok(Decision {
                action,
                index,
                prompt: Some(turn),
                raw_response: Some(raw),
                sections: Some(resolved.sections),
                attempts: reply_no,
                issues,
            });
        }

        self.ledger.extend(issues);
        Err(FormatRetriesExhausted {
            player: self.player.clone(),
            attempts: max_replies,
            last_reason,
        }
        .into())
    }

    /// Send one conversation, retrying transport failures.
    async fn request(
        &self,
        messages: &[ChatMessage],
        timestep: u32,
        issues: &mut Vec<Issue>,
    ) -> Result<String, TransportRetriesExhausted> {
        let attempts = self.policy.transport_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.endpoint.complete(&self.model, messages).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    let mut issue =
                        self.issue(IssueKind::Transport, attempt, timestep, err.to_string());
                    issue.http_status = err.status();
                    issues.push(issue);

                    if err.is_fatal() || attempt >= attempts {
                        return Err(TransportRetriesExhausted {
                            player: self.player.clone(),
                            attempts: attempt,
                            source: err,
                        });
                    }
                    warn!(attempt, error = %err, "transport failure, retrying");
                    let pause = self.policy.backoff * attempt;
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Agent for ModelAgent {
    fn choose_action<'a>(
        &'a mut self,
        view: &'a PlayerView,
        legal: &'a [LegalAction],
        timestep: u32,
    ) -> BoxFuture<'a, Result<Decision>> {
        Box::pin(self.decide(view, legal, timestep))
    }

    fn issues(&self) -> &[Issue] {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::Action;
    use crate::core::catalog::legal_actions;
    use crate::test_support::{ScriptedEndpoint, small_state, small_world};

    fn agent(endpoint: Arc<ScriptedEndpoint>, format_retries: u32) -> ModelAgent {
        ModelAgent::new(
            "Player 2: blue",
            "test/model",
            endpoint,
            Arc::new(PromptEngine::new()),
            Arc::from("map"),
            RetryPolicy {
                format_retries,
                transport_attempts: 3,
                backoff: Duration::ZERO,
            },
        )
    }

    fn turn() -> (PlayerView, Vec<LegalAction>) {
        let world = small_world();
        let state = small_state();
        let view = PlayerView::project(&world, &state, 1).expect("view");
        (view, legal_actions(&world, &state, 1))
    }

    #[tokio::test]
    async fn feedback_retry_then_success_marks_issue_resolved() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![
            Ok("I am thinking".to_string()),
            Ok(r#"{"condensed_memory":"m","thinking_process":"t","action":"MOVE from Cafeteria to Admin"}"#.to_string()),
        ]));
        let mut agent = agent(endpoint.clone(), 3);
        let (view, legal) = turn();
        let decision = agent.choose_action(&view, &legal, 0).await.expect("decision");

        assert_eq!(decision.attempts, 2);
        assert!(matches!(decision.action, Action::Move { .. }));
        assert_eq!(decision.issues.len(), 1);
        assert!(decision.issues[0].resolved);
        assert_eq!(decision.issues[0].kind, IssueKind::Format);
        assert_eq!(agent.issues().len(), 1);

        let sent = endpoint.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].len(), 4);
        assert_eq!(sent[1][2], ChatMessage::assistant("I am thinking"));
        assert!(sent[1][3].content.contains("could not be matched"));
    }

    #[tokio::test]
    async fn format_exhaustion_is_an_error() {
        let replies = (0..4).map(|_| Ok("nonsense".to_string())).collect();
        let endpoint = Arc::new(ScriptedEndpoint::new(replies));
        let mut agent = agent(endpoint.clone(), 3);
        let (view, legal) = turn();
        let err = agent.choose_action(&view, &legal, 0).await.unwrap_err();

        let exhausted = err
            .downcast_ref::<FormatRetriesExhausted>()
            .expect("format error");
        assert_eq!(exhausted.attempts, 4);
        assert_eq!(endpoint.requests().len(), 4);
        assert_eq!(agent.issues().len(), 4);
        assert!(agent.issues().iter().all(|i| !i.resolved));
    }

    #[tokio::test]
    async fn transient_transport_errors_are_retried() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![
            Err(TransportError::EmptyContent),
            Err(TransportError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            }),
            Ok("[Action] SKIP".to_string()),
            Ok("MOVE from Cafeteria to Weapons".to_string()),
        ]));
        let mut agent = agent(endpoint.clone(), 3);
        let (view, legal) = turn();
        let decision = agent.choose_action(&view, &legal, 0).await.expect("decision");
        assert_eq!(decision.index, Some(0));
        assert_eq!(decision.issues.len(), 3);
        assert_eq!(decision.issues[1].http_status, Some(502));
    }

    #[tokio::test]
    async fn unauthorized_aborts_without_retry() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![
            Err(TransportError::Status {
                status: 401,
                body: "no key".to_string(),
            }),
            Ok("MOVE from Cafeteria to Weapons".to_string()),
        ]));
        let mut agent = agent(endpoint.clone(), 3);
        let (view, legal) = turn();
        let err = agent.choose_action(&view, &legal, 0).await.unwrap_err();
        let exhausted = err
            .downcast_ref::<TransportRetriesExhausted>()
            .expect("transport error");
        assert_eq!(exhausted.attempts, 1);
        assert_eq!(endpoint.requests().len(), 1);
    }

    #[tokio::test]
    async fn transport_cap_is_enforced() {
        let replies = (0..5).map(|_| Err(TransportError::NoChoices)).collect();
        let endpoint = Arc::new(ScriptedEndpoint::new(replies));
        let mut agent = agent(endpoint.clone(), 3);
        let (view, legal) = turn();
        let err = agent.choose_action(&view, &legal, 0).await.unwrap_err();
        assert!(err.downcast_ref::<TransportRetriesExhausted>().is_some());
        assert_eq!(endpoint.requests().len(), 3);
    }

    #[tokio::test]
    async fn attempted_action_consumes_turn() {
        let endpoint = Arc::new(ScriptedEndpoint::new(vec![Ok(
            "I will SABOTAGE the reactor".to_string(),
        )]));
        let mut agent = agent(endpoint, 3);
        let (view, legal) = turn();
        let decision = agent.choose_action(&view, &legal, 0).await.expect("decision");
        assert_eq!(decision.index, None);
        assert!(matches!(decision.action, Action::Attempted { .. }));
    }
}
