//! Council members and the voters that speak for them.
//!
//! Two voters are provided:
//! - `RuleVoter`: deterministic votes from incident severity and role
//! - `OllamaVoter`: asks a local Ollama model for each agent's vote

use super::{AgentVote, VoteChoice};
use crate::models::{Incident, IncidentStatus, Severity};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Council roles with the lowest severity at which each approves escalation.
const ROLES: [(&str, Severity); 11] = [
    ("ethics", Severity::Medium),
    ("legal", Severity::High),
    ("security", Severity::Medium),
    ("privacy", Severity::Medium),
    ("safety", Severity::Low),
    ("product", Severity::Critical),
    ("operations", Severity::High),
    ("fairness", Severity::Medium),
    ("transparency", Severity::High),
    ("human_rights", Severity::Medium),
    ("technical", Severity::High),
];

/// Seats per role. With 11 roles this yields the 33-member council.
pub const SEATS_PER_ROLE: usize = 3;

/// One council member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    pub id: String,
    pub role: String,
    /// 0-based seat within the role. Every `SEATS_PER_ROLE`th seat is a
    /// skeptic; larger councils keep adding seats.
    pub seat: usize,
    threshold: Severity,
}

/// Build a roster of `count` agents, cycling roles then seats. Ids stay
/// unique for any `count`.
pub fn roster(count: usize) -> Vec<Agent> {
    (0..count)
        .map(|i| {
            let (role, threshold) = ROLES[i % ROLES.len()];
            let seat = i / ROLES.len();
            Agent {
                id: format!("{}-{}", role, seat + 1),
                role: role.to_string(),
                seat,
                threshold,
            }
        })
        .collect()
}

/// Something that can cast a vote for an agent on an incident.
#[async_trait]
pub trait Voter: Send + Sync {
    async fn vote(&self, agent: &Agent, incident: &Incident) -> AgentVote;
}

/// Deterministic voter.
///
/// The question put to the council is whether to escalate the incident and
/// restrict the system pending remediation. Each role approves at or above
/// its severity threshold; the skeptic seat needs one level more and
/// abstains when no level is high enough.
pub struct RuleVoter;

fn severity_rank(severity: Severity) -> i32 {
    match severity {
        Severity::Low => 0,
        Severity::Medium => 1,
        Severity::High => 2,
        Severity::Critical => 3,
    }
}

#[async_trait]
impl Voter for RuleVoter {
    async fn vote(&self, agent: &Agent, incident: &Incident) -> AgentVote {
        if incident.status == IncidentStatus::Resolved {
            return AgentVote {
                agent_id: agent.id.clone(),
                role: agent.role.clone(),
                choice: VoteChoice::Reject,
                confidence: 0.9,
                rationale: "Incident is already resolved".to_string(),
            };
        }

        let skeptic = agent.seat % SEATS_PER_ROLE == SEATS_PER_ROLE - 1;
        let required = severity_rank(agent.threshold) + i32::from(skeptic);
        let actual = severity_rank(incident.severity);

        let (choice, rationale) = if required > severity_rank(Severity::Critical) {
            (
                VoteChoice::Abstain,
                format!("{} skeptic defers on this category", agent.role),
            )
        } else if actual >= required {
            (
                VoteChoice::Approve,
                format!("{} severity meets the {} threshold", incident.severity, agent.role),
            )
        } else {
            (
                VoteChoice::Reject,
                format!("{} severity is below the {} threshold", incident.severity, agent.role),
            )
        };

        let distance = (actual - required).unsigned_abs() as f64;
        AgentVote {
            agent_id: agent.id.clone(),
            role: agent.role.clone(),
            choice,
            confidence: (0.6 + 0.1 * distance).min(0.95),
            rationale,
        }
    }
}

/// Settings for the Ollama-backed voter.
#[derive(Debug, Clone)]
pub struct OllamaSettings {
    pub ollama_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// The vote object the model is asked to return.
#[derive(Debug, Deserialize)]
struct ModelVote {
    vote: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    rationale: String,
}

fn default_confidence() -> f64 {
    0.5
}

/// Voter backed by an Ollama chat model.
pub struct OllamaVoter {
    settings: OllamaSettings,
    http_client: reqwest::Client,
}

impl OllamaVoter {
    pub fn new(settings: OllamaSettings) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            settings,
            http_client,
        })
    }

    async fn ask(&self, agent: &Agent, incident: &Incident) -> Result<String> {
        let url = format!("{}/api/chat", self.settings.ollama_url);

        let request = OllamaChatRequest {
            model: self.settings.model_name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: COUNCIL_SYSTEM_PROMPT.replace("{role}", &agent.role),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!(
                        "Incident: {}\nCategory: {}\nSeverity: {}\nStatus: {:?}\n\n\
                         Should the council escalate this incident and restrict the system \
                         pending remediation?",
                        incident.title, incident.category, incident.severity, incident.status
                    ),
                },
            ],
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.settings.temperature,
            },
        };

        debug!("Requesting vote from {} for agent {}", url, agent.id);

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error ({}): {}", status, body);
        }

        let chat: OllamaChatResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(chat.message.content)
    }
}

/// Parse the model's JSON answer. Unknown vote strings become abstentions.
fn parse_model_vote(agent: &Agent, content: &str) -> Option<AgentVote> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    let parsed: ModelVote = serde_json::from_str(content.get(start..=end)?).ok()?;

    let choice = match parsed.vote.trim().to_lowercase().as_str() {
        "approve" | "yes" => VoteChoice::Approve,
        "reject" | "no" => VoteChoice::Reject,
        _ => VoteChoice::Abstain,
    };

    Some(AgentVote {
        agent_id: agent.id.clone(),
        role: agent.role.clone(),
        choice,
        confidence: parsed.confidence.clamp(0.0, 1.0),
        rationale: parsed.rationale,
    })
}

#[async_trait]
impl Voter for OllamaVoter {
    async fn vote(&self, agent: &Agent, incident: &Incident) -> AgentVote {
        let outcome = self
            .ask(agent, incident)
            .await
            .and_then(|content| {
                parse_model_vote(agent, &content)
                    .with_context(|| format!("Unparsable vote: {}", content))
            });

        match outcome {
            Ok(vote) => vote,
            Err(e) => {
                warn!("Agent {} abstains: {}", agent.id, e);
                AgentVote {
                    agent_id: agent.id.clone(),
                    role: agent.role.clone(),
                    choice: VoteChoice::Abstain,
                    confidence: 0.0,
                    rationale: format!("No usable model response: {}", e),
                }
            }
        }
    }
}

const COUNCIL_SYSTEM_PROMPT: &str = r#"You are the {role} member of a 33-agent AI-safety council.
Judge the incident strictly from the {role} perspective.

Respond with a single JSON object and nothing else:
{"vote": "approve" | "reject" | "abstain", "confidence": 0.0-1.0, "rationale": "one sentence"}"#;
