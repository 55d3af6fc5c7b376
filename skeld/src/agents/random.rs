//! Uniform random baseline.

use anyhow::{Result, bail};
use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::agents::{Agent, Decision};
use crate::core::action::LegalAction;
use crate::core::view::PlayerView;

const STOCK_MESSAGE: &str = "Hello, I am a crewmate.";

pub struct RandomAgent {
    rng: StdRng,
}

impl RandomAgent {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn pick(&mut self, legal: &[LegalAction]) -> Result<Decision> {
        if legal.is_empty() {
            bail!("no legal actions to choose from");
        }
        let index = self.rng.gen_range(0..legal.len());
        let action = legal[index].with_message(STOCK_MESSAGE);
        Ok(Decision::pick(index, action))
    }
}

impl Agent for RandomAgent {
    fn choose_action<'a>(
        &'a mut self,
        _view: &'a PlayerView,
        legal: &'a [LegalAction],
        _timestep: u32,
    ) -> BoxFuture<'a, Result<Decision>> {
        let decision = self.pick(legal);
        Box::pin(async move { decision })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::Action;
    use crate::core::catalog::legal_actions;
    use crate::core::types::Phase;
    use crate::test_support::{small_state, small_world};

    #[test]
    fn same_seed_same_choices() {
        let world = small_world();
        let state = small_state();
        let legal = legal_actions(&world, &state, 0);
        let mut a = RandomAgent::seeded(42);
        let mut b = RandomAgent::seeded(42);
        for _ in 0..20 {
            let left = a.pick(&legal).expect("pick");
            let right = b.pick(&legal).expect("pick");
            assert_eq!(left.index, right.index);
            assert!(left.index.expect("index") < legal.len());
        }
    }

    #[test]
    fn speak_gets_stock_message() {
        let world = small_world();
        let mut state = small_state();
        state.force_phase(Phase::Discussion { round: 1 });
        let legal = legal_actions(&world, &state, 1);
        let decision = RandomAgent::seeded(1).pick(&legal).expect("pick");
        assert_eq!(
            decision.action,
            Action::Speak {
                message: STOCK_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn empty_legal_set_is_an_error() {
        assert!(RandomAgent::seeded(1).pick(&[]).is_err());
    }
}
