//! Consensus rules for council sessions.

use super::{AgentVote, Decision, Outcome, VoteChoice};
use serde::{Deserialize, Serialize};

/// Turns a set of votes into a decision.
pub trait VotingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn tally(&self, votes: &[AgentVote]) -> Decision;
}

/// Strategy selector used in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Majority,
    Supermajority,
    Unanimous,
}

/// Build the strategy for `kind`. `threshold` only applies to supermajority.
pub fn strategy_for(kind: StrategyKind, threshold: f64) -> Box<dyn VotingStrategy> {
    match kind {
        StrategyKind::Majority => Box::new(Majority),
        StrategyKind::Supermajority => Box::new(Supermajority { threshold }),
        StrategyKind::Unanimous => Box::new(Unanimous),
    }
}

struct Counts {
    approve: usize,
    reject: usize,
    abstain: usize,
}

fn count(votes: &[AgentVote]) -> Counts {
    let mut counts = Counts {
        approve: 0,
        reject: 0,
        abstain: 0,
    };
    for vote in votes {
        match vote.choice {
            VoteChoice::Approve => counts.approve += 1,
            VoteChoice::Reject => counts.reject += 1,
            VoteChoice::Abstain => counts.abstain += 1,
        }
    }
    counts
}

fn decision(strategy: &dyn VotingStrategy, counts: Counts, outcome: Outcome) -> Decision {
    Decision {
        outcome,
        approve: counts.approve,
        reject: counts.reject,
        abstain: counts.abstain,
        strategy: strategy.name().to_string(),
    }
}

/// More approvals than rejections among cast (non-abstaining) votes.
pub struct Majority;

impl VotingStrategy for Majority {
    fn name(&self) -> &'static str {
        "majority"
    }

    fn tally(&self, votes: &[AgentVote]) -> Decision {
        let counts = count(votes);
        let outcome = if counts.approve > counts.reject {
            Outcome::Approved
        } else if counts.reject > counts.approve {
            Outcome::Rejected
        } else {
            Outcome::NoConsensus
        };
        decision(self, counts, outcome)
    }
}

/// Approval share of cast votes must reach `threshold`; the same share
/// of rejections rejects. Anything between is no consensus.
pub struct Supermajority {
    pub threshold: f64,
}

impl VotingStrategy for Supermajority {
    fn name(&self) -> &'static str {
        "supermajority"
    }

    fn tally(&self, votes: &[AgentVote]) -> Decision {
        let counts = count(votes);
        let cast = (counts.approve + counts.reject) as f64;

        let outcome = if cast == 0.0 {
            Outcome::NoConsensus
        } else if counts.approve as f64 / cast >= self.threshold {
            Outcome::Approved
        } else if counts.reject as f64 / cast >= self.threshold {
            Outcome::Rejected
        } else {
            Outcome::NoConsensus
        };
        decision(self, counts, outcome)
    }
}

/// Every cast vote agrees.
pub struct Unanimous;

impl VotingStrategy for Unanimous {
    fn name(&self) -> &'static str {
        "unanimous"
    }

    fn tally(&self, votes: &[AgentVote]) -> Decision {
        let counts = count(votes);
        let outcome = match (counts.approve, counts.reject) {
            (0, 0) => Outcome::NoConsensus,
            (_, 0) => Outcome::Approved,
            (0, _) => Outcome::Rejected,
            _ => Outcome::NoConsensus,
        };
        decision(self, counts, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes(approve: usize, reject: usize, abstain: usize) -> Vec<AgentVote> {
        let mut votes = Vec::new();
        let mut push = |choice: VoteChoice, n: usize| {
            for i in 0..n {
                votes.push(AgentVote {
                    agent_id: format!("{:?}-{}", choice, i),
                    role: "test".to_string(),
                    choice,
                    confidence: 0.8,
                    rationale: String::new(),
                });
            }
        };
        push(VoteChoice::Approve, approve);
        push(VoteChoice::Reject, reject);
        push(VoteChoice::Abstain, abstain);
        votes
    }

    #[test]
    fn test_majority() {
        assert_eq!(Majority.tally(&votes(17, 16, 0)).outcome, Outcome::Approved);
        assert_eq!(Majority.tally(&votes(10, 12, 11)).outcome, Outcome::Rejected);
        assert_eq!(Majority.tally(&votes(5, 5, 23)).outcome, Outcome::NoConsensus);
        assert_eq!(Majority.tally(&[]).outcome, Outcome::NoConsensus);
    }

    #[test]
    fn test_majority_ignores_abstentions() {
        let decision = Majority.tally(&votes(3, 2, 28));
        assert_eq!(decision.outcome, Outcome::Approved);
        assert_eq!(decision.abstain, 28);
    }

    #[test]
    fn test_supermajority() {
        let strategy = Supermajority { threshold: 2.0 / 3.0 };
        assert_eq!(strategy.tally(&votes(22, 11, 0)).outcome, Outcome::Approved);
        assert_eq!(strategy.tally(&votes(21, 12, 0)).outcome, Outcome::NoConsensus);
        assert_eq!(strategy.tally(&votes(2, 30, 1)).outcome, Outcome::Rejected);
        assert_eq!(strategy.tally(&votes(0, 0, 33)).outcome, Outcome::NoConsensus);
    }

    #[test]
    fn test_unanimous() {
        assert_eq!(Unanimous.tally(&votes(30, 0, 3)).outcome, Outcome::Approved);
        assert_eq!(Unanimous.tally(&votes(32, 1, 0)).outcome, Outcome::NoConsensus);
        assert_eq!(Unanimous.tally(&votes(0, 4, 0)).outcome, Outcome::Rejected);
    }

    #[test]
    fn test_strategy_for() {
        assert_eq!(strategy_for(StrategyKind::Majority, 0.0).name(), "majority");
        assert_eq!(
            strategy_for(StrategyKind::Supermajority, 0.75).name(),
            "supermajority"
        );
        assert_eq!(strategy_for(StrategyKind::Unanimous, 0.0).name(), "unanimous");
    }
}
