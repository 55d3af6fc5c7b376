//! Ballot counting for one voting round.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ballot {
    Player(PlayerId),
    Skip,
}

/// Candidate counts for one round; built when voting closes, then dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VoteTally {
    pub counts: BTreeMap<PlayerId, u32>,
    pub skips: u32,
}

impl VoteTally {
    pub fn from_ballots<'a>(ballots: impl IntoIterator<Item = &'a Ballot>) -> Self {
        let mut tally = Self::default();
        for ballot in ballots {
            match ballot {
                Ballot::Player(target) => *tally.counts.entry(*target).or_default() += 1,
                Ballot::Skip => tally.skips += 1,
            }
        }
        tally
    }

    /// The single player holding the strict maximum, if any.
    ///
    /// Skips are not a candidate: `{A: 1, skip: 3}` still ejects A. A tie at
    /// the top, or no votes for anyone, ejects nobody.
    pub fn ejected(&self) -> Option<PlayerId> {
        let top = self.counts.values().copied().max().filter(|&n| n > 0)?;
        let mut leaders = self.counts.iter().filter(|(_, n)| **n == top);
        let (leader, _) = leaders.next()?;
        if leaders.next().is_some() {
            return None;
        }
        Some(*leader)
    }
}
