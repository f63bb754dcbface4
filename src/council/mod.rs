//! The multi-agent council.
//!
//! A session collects one vote per agent on an incident and tallies them
//! with a pluggable `VotingStrategy`. How a vote is produced (rules or an
//! LLM) is a separate `Voter` seam.

pub mod agents;
pub mod voting;

pub use agents::{roster, Agent, OllamaSettings, OllamaVoter, RuleVoter, Voter};
pub use voting::{strategy_for, StrategyKind, VotingStrategy};

use crate::models::Incident;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Approve,
    Reject,
    Abstain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentVote {
    pub agent_id: String,
    pub role: String,
    pub choice: VoteChoice,
    pub confidence: f64,
    pub rationale: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Approved,
    Rejected,
    NoConsensus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub outcome: Outcome,
    pub approve: usize,
    pub reject: usize,
    pub abstain: usize,
    pub strategy: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Voting,
    Decided,
}

/// A council decision record tied to an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouncilSession {
    pub id: String,
    pub incident_id: String,
    #[serde(default)]
    pub system_id: Option<String>,
    pub status: SessionStatus,
    #[serde(default)]
    pub votes: Vec<AgentVote>,
    #[serde(default)]
    pub decision: Option<Decision>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
}

impl CouncilSession {
    pub fn pending(incident: &Incident, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            incident_id: incident.id.clone(),
            system_id: incident.system_id.clone(),
            status: SessionStatus::Pending,
            votes: Vec::new(),
            decision: None,
            created_at: now,
            decided_at: None,
        }
    }
}

/// Runs council sessions.
pub struct Council {
    agents: Vec<Agent>,
    voter: Arc<dyn Voter>,
    strategy: Box<dyn VotingStrategy>,
    concurrency: usize,
    show_progress: bool,
}

impl Council {
    pub fn new(
        agents: Vec<Agent>,
        voter: Arc<dyn Voter>,
        strategy: Box<dyn VotingStrategy>,
        concurrency: usize,
    ) -> Self {
        Self {
            agents,
            voter,
            strategy,
            concurrency: concurrency.max(1),
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Collect every agent's vote on `incident` and decide.
    pub async fn deliberate(&self, incident: &Incident) -> CouncilSession {
        let mut session = CouncilSession::pending(incident, Utc::now());
        session.status = SessionStatus::Voting;

        info!(
            "Council session {} on incident {}: {} agents, {} strategy",
            session.id,
            incident.id,
            self.agents.len(),
            self.strategy.name()
        );

        let progress = if self.show_progress {
            let pb = ProgressBar::new(self.agents.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("   {spinner} [{bar:30}] {pos}/{len} votes")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let voter = &self.voter;
        let progress_ref = &progress;
        let mut votes: Vec<AgentVote> = stream::iter(self.agents.iter())
            .map(|agent| async move {
                let vote = voter.vote(agent, incident).await;
                progress_ref.inc(1);
                vote
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        progress.finish_and_clear();

        votes.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        let decision = self.strategy.tally(&votes);

        info!(
            "Council decided {:?} ({} approve / {} reject / {} abstain)",
            decision.outcome, decision.approve, decision.reject, decision.abstain
        );

        session.votes = votes;
        session.decision = Some(decision);
        session.status = SessionStatus::Decided;
        session.decided_at = Some(Utc::now());
        session
    }
}
