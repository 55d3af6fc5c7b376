//! Turns a decision-maker's free-form reply into one of the legal actions.
//!
//! [`resolve`] is pure: it never retries and never fails. Whether a
//! [`Resolution::NeedsRetry`] leads to another request is the caller's policy.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::action::{Action, LegalAction};

const SNIPPET_CHARS: usize = 100;
const LISTED_ACTIONS: usize = 5;

static TAGGED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\[Condensed Memory\](.*?)\[Thinking Process\](.*?)\[Action\](.*)$").unwrap()
});
static ACTION_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\[Action\]\s*(.+)").unwrap());
static SPEAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)speak[:\s]+(.+)").unwrap());
static VOTE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)vote\s+(.+)").unwrap());

/// Action names a decision-maker may plausibly reach for, legal or not.
static KNOWN_ACTION_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"MOVE\s+(?:from\s+.+?\s+)?to\s+\S",
        r"VENT\s+(?:from\s+.+?\s+)?to\s+\S",
        r"KILL\s+\S",
        r"VOTE\s+\S",
        r"COMPLETE\s+TASK\s+\S",
        r"COMPLETE\s+FAKE\s+TASK",
        r"SABOTAGE",
        r"FIX\s+\S",
        r"VIEW\s+MONITOR",
        r"CALL\s+MEETING",
        r"REPORT\s+DEAD\s+BODY",
        r"SPEAK[:\s]+\S",
    ]
    .iter()
    .map(|pattern| Regex::new(&format!("(?i){pattern}")).unwrap())
    .collect()
});

/// The three parts of a structured reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sections {
    pub condensed_memory: Option<String>,
    pub thinking_process: Option<String>,
    /// Candidate action string the matching stages work on.
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A legal action; `index` points into the legal set it was matched against.
    Chosen { index: usize, action: Action },
    /// A recognisable action that is not legal right now.
    Attempted(Action),
    /// Nothing matched; carries a diagnostic for corrective feedback.
    NeedsRetry(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub sections: Sections,
    pub outcome: Resolution,
}

/// Resolve `raw` against `legal`. First matching stage wins.
pub fn resolve(raw: &str, legal: &[LegalAction]) -> Resolved {
    if raw.trim().is_empty() {
        return Resolved {
            sections: Sections::default(),
            outcome: Resolution::NeedsRetry("Response is empty".to_string()),
        };
    }
    let sections = extract_sections(raw);
    let outcome = match_candidate(&sections.action, legal);
    Resolved { sections, outcome }
}

/// Split a reply into memory, thought and action.
///
/// JSON objects win; then the bracketed section format; then a lone
/// `[Action]` section; and finally the whole reply is the action.
pub fn extract_sections(raw: &str) -> Sections {
    let mut sections = Sections::default();

    if let Ok(Value::Object(record)) = serde_json::from_str::<Value>(strip_fences(raw)) {
        let field = |name: &str| {
            record
                .get(name)
                .and_then(Value::as_str)
                .map(|text| text.trim().to_string())
        };
        sections.condensed_memory = field("condensed_memory");
        sections.thinking_process = field("thinking_process");
        if let Some(action) = field("action").filter(|action| !action.is_empty()) {
            sections.action = action;
            return sections;
        }
    }

    if let Some(caps) = TAGGED_RE.captures(raw) {
        sections.condensed_memory = Some(caps[1].trim().to_string());
        sections.thinking_process = Some(caps[2].trim().to_string());
        sections.action = caps[3].trim().to_string();
    } else if let Some(caps) = ACTION_ONLY_RE.captures(raw) {
        sections.action = caps[1].trim().to_string();
    } else {
        sections.action = raw.trim().to_string();
    }
    sections
}

fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn match_candidate(candidate: &str, legal: &[LegalAction]) -> Resolution {
    let lower = candidate.to_lowercase();
    let normalized = normalize(candidate);

    for (index, entry) in legal.iter().enumerate() {
        if entry.action.is_speak() {
            continue;
        }
        if candidate.contains(&entry.text)
            || lower.contains(&entry.text.to_lowercase())
            || normalized.contains(&normalize(&entry.text))
        {
            return Resolution::Chosen {
                index,
                action: entry.action.clone(),
            };
        }
    }

    if let Some(index) = legal.iter().position(|entry| entry.action.is_speak())
        && lower.contains("speak")
        && let Some(caps) = SPEAK_RE.captures(candidate)
    {
        return Resolution::Chosen {
            index,
            action: legal[index].with_message(&caps[1]),
        };
    }

    if legal.iter().any(|entry| entry.action.is_vote())
        && let Some(caps) = VOTE_RE.captures(candidate)
        && let Some(index) = match_vote_target(&caps[1].to_lowercase(), legal)
    {
        return Resolution::Chosen {
            index,
            action: legal[index].action.clone(),
        };
    }

    if KNOWN_ACTION_RE.iter().any(|re| re.is_match(candidate)) {
        return Resolution::Attempted(Action::Attempted {
            text: candidate.to_string(),
        });
    }

    let snippet: String = candidate.chars().take(SNIPPET_CHARS).collect();
    let listed: Vec<&str> = legal
        .iter()
        .take(LISTED_ACTIONS)
        .map(|entry| entry.text.as_str())
        .collect();
    Resolution::NeedsRetry(format!(
        "Could not match action. Got: '{snippet}...'. Available actions: {listed:?}"
    ))
}

/// Match the text after `vote` against VOTE targets: names first, colours second.
fn match_vote_target(target: &str, legal: &[LegalAction]) -> Option<usize> {
    let votes = || {
        legal.iter().enumerate().filter_map(|(index, entry)| {
            entry
                .target_name
                .as_deref()
                .filter(|_| entry.action.is_vote())
                .map(|name| (index, name.to_lowercase()))
        })
    };

    for (index, name) in votes() {
        let short = name.split(':').next().unwrap_or(&name).trim().to_string();
        if contains_word(target, &name) || contains_word(target, &short) {
            return Some(index);
        }
    }
    for (index, name) in votes() {
        if let Some((_, color)) = name.split_once(':')
            && contains_word(target, color.trim())
        {
            return Some(index);
        }
    }
    None
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    Regex::new(&format!(r"\b{}\b", regex::escape(needle)))
        .map(|re| re.is_match(haystack))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_set() -> Vec<LegalAction> {
        vec![
            LegalAction::new(
                Action::Move { from: 0, to: 1 },
                "MOVE from Cafeteria to Weapons".to_string(),
            ),
            LegalAction::new(
                Action::Move { from: 0, to: 7 },
                "MOVE from Cafeteria to Admin".to_string(),
            ),
            LegalAction::new(
                Action::CallMeeting { room: 0 },
                "CALL MEETING using the emergency button at Cafeteria".to_string(),
            ),
        ]
    }

    fn vote_set() -> Vec<LegalAction> {
        vec![
            LegalAction::vote(0, "Player 1: red"),
            LegalAction::vote(9, "Player 10: blue"),
            LegalAction::new(Action::SkipVote, "SKIP VOTE".to_string()),
        ]
    }

    fn speak_set() -> Vec<LegalAction> {
        vec![LegalAction::new(
            Action::Speak {
                message: String::new(),
            },
            "SPEAK: ...".to_string(),
        )]
    }

    fn chosen(resolved: &Resolved) -> Option<usize> {
        match resolved.outcome {
            Resolution::Chosen { index, .. } => Some(index),
            _ => None,
        }
    }

    #[test]
    fn empty_reply_needs_retry() {
        let resolved = resolve("   \n", &task_set());
        assert_eq!(
            resolved.outcome,
            Resolution::NeedsRetry("Response is empty".to_string())
        );
    }

    #[test]
    fn json_reply_in_fences() {
        let raw = "```json\n{\"condensed_memory\": \"saw red\", \"thinking_process\": \"go\", \"action\": \"MOVE from Cafeteria to Admin\"}\n```";
        let resolved = resolve(raw, &task_set());
        assert_eq!(chosen(&resolved), Some(1));
        assert_eq!(resolved.sections.condensed_memory.as_deref(), Some("saw red"));
        assert_eq!(resolved.sections.thinking_process.as_deref(), Some("go"));
    }

    #[test]
    fn tagged_sections_are_case_insensitive() {
        let raw = "[condensed memory]\nnothing yet\n[THINKING PROCESS]\nhead to weapons\n[action] move from cafeteria to weapons";
        let resolved = resolve(raw, &task_set());
        assert_eq!(chosen(&resolved), Some(0));
        assert_eq!(resolved.sections.condensed_memory.as_deref(), Some("nothing yet"));
        assert_eq!(resolved.sections.action, "move from cafeteria to weapons");
    }

    #[test]
    fn lone_action_section() {
        let resolved = resolve("blah\n[Action]\nCALL MEETING using the emergency button at Cafeteria", &task_set());
        assert_eq!(chosen(&resolved), Some(2));
        assert_eq!(resolved.sections.condensed_memory, None);
    }

    #[test]
    fn whitespace_is_normalized() {
        let resolved = resolve("MOVE  from\n Cafeteria   to Admin", &task_set());
        assert_eq!(chosen(&resolved), Some(1));
    }

    #[test]
    fn legal_containment_beats_hallucination_fallback() {
        let raw = "I could SABOTAGE the reactor, but I will MOVE from Cafeteria to Weapons";
        let resolved = resolve(raw, &task_set());
        assert_eq!(chosen(&resolved), Some(0));
    }

    #[test]
    fn hallucinated_action_is_attempted() {
        let resolved = resolve("I will SABOTAGE the reactor", &task_set());
        assert_eq!(
            resolved.outcome,
            Resolution::Attempted(Action::Attempted {
                text: "I will SABOTAGE the reactor".to_string()
            })
        );
    }

    #[test]
    fn illegal_move_is_attempted() {
        let resolved = resolve("MOVE from Cafeteria to Reactor", &task_set());
        assert!(matches!(resolved.outcome, Resolution::Attempted(_)));
    }

    #[test]
    fn unmatched_reply_lists_actions() {
        let resolved = resolve("I am not sure what to do", &task_set());
        let Resolution::NeedsRetry(reason) = resolved.outcome else {
            panic!("expected retry");
        };
        assert!(reason.starts_with("Could not match action. Got: 'I am not sure what to do...'"));
        assert!(reason.contains("MOVE from Cafeteria to Weapons"));
    }

    #[test]
    fn retry_snippet_is_truncated() {
        let long = "x".repeat(300);
        let Resolution::NeedsRetry(reason) = resolve(&long, &task_set()).outcome else {
            panic!("expected retry");
        };
        assert!(reason.contains(&format!("'{}...'", "x".repeat(100))));
    }

    #[test]
    fn speak_payload_is_extracted() {
        let resolved = resolve("SPEAK: I was in Admin the whole time", &speak_set());
        assert_eq!(
            resolved.outcome,
            Resolution::Chosen {
                index: 0,
                action: Action::Speak {
                    message: "I was in Admin the whole time".to_string()
                }
            }
        );
    }

    #[test]
    fn vote_matches_short_name_at_word_boundary() {
        let resolved = resolve("I vote player 10 out", &vote_set());
        assert_eq!(chosen(&resolved), Some(1));
        let resolved = resolve("vote Player 1 please", &vote_set());
        assert_eq!(chosen(&resolved), Some(0));
    }

    #[test]
    fn vote_matches_colour() {
        let resolved = resolve("I want to vote for red", &vote_set());
        assert_eq!(chosen(&resolved), Some(0));
    }

    #[test]
    fn exact_vote_text_wins() {
        let resolved = resolve("VOTE Player 10: blue", &vote_set());
        assert_eq!(chosen(&resolved), Some(1));
        let resolved = resolve("SKIP VOTE", &vote_set());
        assert_eq!(chosen(&resolved), Some(2));
    }

    #[test]
    fn vote_for_unknown_player_is_attempted() {
        let resolved = resolve("VOTE Player 4: green", &vote_set());
        assert!(matches!(resolved.outcome, Resolution::Attempted(_)));
    }
}
