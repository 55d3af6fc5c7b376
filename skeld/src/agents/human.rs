//! Human seat: forwards the turn to the bridge and waits.

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::BoxFuture;

use crate::agents::{Agent, Decision};
use crate::bridge::{HumanBridge, HumanRequest};
use crate::core::action::LegalAction;
use crate::core::resolver::Sections;
use crate::core::types::GameId;
use crate::core::view::PlayerView;

pub struct HumanAgent {
    game_id: GameId,
    bridge: HumanBridge,
}

impl HumanAgent {
    pub fn new(game_id: GameId, bridge: HumanBridge) -> Self {
        Self { game_id, bridge }
    }

    async fn decide(
        &mut self,
        view: &PlayerView,
        legal: &[LegalAction],
        timestep: u32,
    ) -> Result<Decision> {
        let request = HumanRequest {
            game_id: self.game_id,
            player: view.name.clone(),
            timestep,
            view: view.clone(),
            legal_actions: legal.iter().map(|a| a.text.clone()).collect(),
            requested_at: Utc::now(),
        };
        let choice = self
            .bridge
            .request(request)
            .await
            .with_context(|| format!("human input for {}", view.name))?;

        // The bridge only accepts in-range indices.
        let index = choice.action_index;
        let entry = legal
            .get(index)
            .with_context(|| format!("action index {index} out of range"))?;
        let message = choice.message.as_deref().unwrap_or("...");
        let action = entry.with_message(message);
        let sections = Sections {
            condensed_memory: choice.condensed_memory,
            thinking_process: choice.thinking_process,
            action: entry.text.clone(),
        };
        Ok(Decision {
            sections: Some(sections),
            ..Decision::pick(index, action)
        })
    }
}

impl Agent for HumanAgent {
    fn choose_action<'a>(
        &'a mut self,
        view: &'a PlayerView,
        legal: &'a [LegalAction],
        timestep: u32,
    ) -> BoxFuture<'a, Result<Decision>> {
        Box::pin(self.decide(view, legal, timestep))
    }
}
