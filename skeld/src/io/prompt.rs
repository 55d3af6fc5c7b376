//! Prompt rendering for model-backed agents.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::action::LegalAction;
use crate::core::map::ShipMap;
use crate::core::view::PlayerView;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const TURN_TEMPLATE: &str = include_str!("prompts/turn.md");
const FEEDBACK_TEMPLATE: &str = include_str!("prompts/feedback.md");

/// Own actions repeated back in each turn prompt.
const HISTORY_LINES: usize = 10;

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        env.add_template("turn", TURN_TEMPLATE)
            .expect("turn template should be valid");
        env.add_template("feedback", FEEDBACK_TEMPLATE)
            .expect("feedback template should be valid");
        Self { env }
    }

    pub fn render_system(&self, view: &PlayerView, map_overview: &str) -> Result<String> {
        let template = self.env.get_template("system")?;
        let rendered = template.render(context! {
            name => &view.name,
            role => view.role.as_str(),
            teammates => &view.teammates,
            personality => &view.personality,
            map_overview => map_overview.trim(),
        })?;
        Ok(rendered)
    }

    pub fn render_turn(
        &self,
        view: &PlayerView,
        legal: &[LegalAction],
        memory: Option<&str>,
    ) -> Result<String> {
        let template = self.env.get_template("turn")?;
        let skip = view.history.len().saturating_sub(HISTORY_LINES);
        let rendered = template.render(context! {
            timestep => view.timestep,
            phase => &view.phase,
            location => &view.location,
            nearby => &view.nearby,
            bodies_here => &view.bodies_here,
            living => &view.living,
            tasks => &view.tasks,
            meeting => &view.meeting,
            transcript => &view.transcript,
            observations => &view.observations,
            history => &view.history[skip..],
            memory => memory.map(str::trim).filter(|s| !s.is_empty()),
            actions => action_texts(legal),
        })?;
        Ok(rendered)
    }

    pub fn render_feedback(&self, reason: &str, legal: &[LegalAction]) -> Result<String> {
        let template = self.env.get_template("feedback")?;
        let rendered = template.render(context! {
            reason => reason,
            actions => action_texts(legal),
        })?;
        Ok(rendered)
    }
}

fn action_texts(legal: &[LegalAction]) -> Vec<&str> {
    legal.iter().map(|a| a.text.as_str()).collect()
}

/// Rooms, corridors and vents in prose, for the system prompt.
pub fn map_overview(map: &ShipMap) -> String {
    let mut out = String::from("Room connections (MOVE between adjacent rooms):\n");
    let names = |ids: &mut dyn Iterator<Item = &usize>| -> String {
        ids.map(|&id| map.name(id)).collect::<Vec<_>>().join(", ")
    };
    for id in 0..map.len() {
        let room = map.room(id);
        let mut features = Vec::new();
        if room.has_button {
            features.push("emergency button");
        }
        if room.has_cameras {
            features.push("security monitor");
        }
        let suffix = if features.is_empty() {
            String::new()
        } else {
            format!(" [{}]", features.join(", "))
        };
        out.push_str(&format!(
            "- {}{} <-> {}\n",
            room.name,
            suffix,
            names(&mut room.adjacent.iter())
        ));
    }
    out.push_str("Vent connections (Impostors only):\n");
    for id in 0..map.len() {
        let room = map.room(id);
        if !room.vents.is_empty() {
            out.push_str(&format!("- {} <-> {}\n", room.name, names(&mut room.vents.iter())));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::Action;
    use crate::core::view::PlayerView;
    use crate::test_support::{small_state, small_world};

    fn view(seat: usize) -> PlayerView {
        PlayerView::project(&small_world(), &small_state(), seat).expect("view")
    }

    #[test]
    fn impostor_system_prompt_names_the_role() {
        let engine = PromptEngine::new();
        let prompt = engine
            .render_system(&view(0), &map_overview(&ShipMap::skeld()))
            .expect("render");
        assert!(prompt.contains("You are Player 1: red"));
        assert!(prompt.contains("**Impostor**"));
        assert!(prompt.contains("- Cafeteria [emergency button] <-> Weapons, Admin, Upper Engine, Medbay"));
        assert!(prompt.contains("\"condensed_memory\""));
    }

    #[test]
    fn turn_prompt_lists_actions_in_order() {
        let engine = PromptEngine::new();
        let legal = vec![
            LegalAction::new(Action::SkipVote, "SKIP VOTE".to_string()),
            LegalAction::vote(0, "Player 1: red"),
        ];
        let prompt = engine
            .render_turn(&view(1), &legal, Some("red is sus"))
            .expect("render");
        assert!(prompt.contains("Timestep 0 - Task phase"));
        assert!(prompt.contains("1. SKIP VOTE\n2. VOTE Player 1: red"));
        assert!(prompt.contains("Previous memory:\nred is sus"));
    }

    #[test]
    fn feedback_carries_reason() {
        let engine = PromptEngine::new();
        let legal = vec![LegalAction::new(Action::SkipVote, "SKIP VOTE".to_string())];
        let prompt = engine
            .render_feedback("Response is empty", &legal)
            .expect("render");
        assert!(prompt.contains("Problem: Response is empty"));
        assert!(prompt.contains("1. SKIP VOTE"));
    }
}
