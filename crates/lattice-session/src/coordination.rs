//! Multi-agent coordination: advisory claims with conflict detection.
//!
//! The claim registry is the serialization primitive for write conflicts
//! on code targets — advisory, not enforced by the store. All mutation
//! happens under one mutex, which is what makes concurrent claims on the
//! same `(project, target)` yield at most one CREATED.

use std::sync::Mutex;

use serde::Serialize;
use serde_json::{json, Map};
use tracing::{debug, info};
use uuid::Uuid;

use lattice_core::model::{NodeLabel, NodeRecord};
use lattice_core::now_millis;
use lattice_core::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Active,
    Released,
    Invalidated,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    pub id: String,
    pub agent_id: String,
    pub target_id: String,
    /// `task`, `file`, `function`, or `feature`.
    pub claim_type: String,
    pub intent: String,
    pub task_id: Option<String>,
    pub session_id: String,
    pub status: ClaimStatus,
    pub outcome: Option<String>,
    pub created_at: i64,
    pub project_id: String,
}

impl ClaimRecord {
    /// CLAIM node for store persistence.
    pub fn to_node(&self) -> NodeRecord {
        let mut props = Map::new();
        props.insert("agentId".into(), json!(self.agent_id));
        props.insert("targetId".into(), json!(self.target_id));
        props.insert("claimType".into(), json!(self.claim_type));
        props.insert("intent".into(), json!(self.intent));
        props.insert("taskId".into(), json!(self.task_id));
        props.insert("sessionId".into(), json!(self.session_id));
        props.insert(
            "status".into(),
            json!(match self.status {
                ClaimStatus::Active => "active",
                ClaimStatus::Released => "released",
                ClaimStatus::Invalidated => "invalidated",
            }),
        );
        props.insert("outcome".into(), json!(self.outcome));
        props.insert("createdAt".into(), json!(self.created_at));
        props.insert("projectId".into(), json!(self.project_id));
        NodeRecord::new(&self.id, NodeLabel::Claim, props)
    }
}

#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub agent_id: String,
    pub target_id: String,
    pub claim_type: String,
    pub intent: String,
    pub task_id: Option<String>,
    pub session_id: String,
    pub project_id: String,
}

/// Outcome of a claim attempt. Conflicts are statuses, never errors.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimOutcome {
    #[serde(rename_all = "camelCase")]
    Created {
        claim_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Conflict {
        conflicting_agent_id: String,
        existing_claim_id: String,
        target_id: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseReport {
    pub found: bool,
    pub already_closed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationOverview {
    pub active_claims: usize,
    pub agents: Vec<AgentSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub agent_id: String,
    pub targets: Vec<String>,
}

#[derive(Debug, Default)]
pub struct CoordinationEngine {
    claims: Mutex<Vec<ClaimRecord>>,
}

impl CoordinationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a target. An existing active claim on the same
    /// `(project, target)` held by a *different* agent is a conflict; the
    /// same agent re-claiming its own target gets its existing claim id
    /// back.
    pub fn claim(&self, request: ClaimRequest) -> ClaimOutcome {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = claims.iter().find(|c| {
            c.status == ClaimStatus::Active
                && c.project_id == request.project_id
                && c.target_id == request.target_id
        }) {
            if existing.agent_id == request.agent_id {
                return ClaimOutcome::Created {
                    claim_id: existing.id.clone(),
                };
            }
            debug!(
                target = %request.target_id,
                holder = %existing.agent_id,
                requester = %request.agent_id,
                "claim conflict"
            );
            return ClaimOutcome::Conflict {
                conflicting_agent_id: existing.agent_id.clone(),
                existing_claim_id: existing.id.clone(),
                target_id: request.target_id,
            };
        }

        let record = ClaimRecord {
            id: format!("claim-{}", Uuid::new_v4()),
            agent_id: request.agent_id,
            target_id: request.target_id,
            claim_type: request.claim_type,
            intent: request.intent,
            task_id: request.task_id,
            session_id: request.session_id,
            status: ClaimStatus::Active,
            outcome: None,
            created_at: now_millis(),
            project_id: request.project_id,
        };
        info!(claim = %record.id, target = %record.target_id, agent = %record.agent_id, "claim created");
        let claim_id = record.id.clone();
        claims.push(record);
        ClaimOutcome::Created { claim_id }
    }

    /// Release a claim by id, reporting truthfully what was found.
    pub fn release(&self, claim_id: &str, outcome: Option<String>) -> ReleaseReport {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        match claims.iter_mut().find(|c| c.id == claim_id) {
            Some(claim) if claim.status == ClaimStatus::Active => {
                claim.status = ClaimStatus::Released;
                claim.outcome = outcome;
                info!(claim = %claim_id, "claim released");
                ReleaseReport {
                    found: true,
                    already_closed: false,
                }
            }
            Some(_) => ReleaseReport {
                found: true,
                already_closed: true,
            },
            None => ReleaseReport {
                found: false,
                already_closed: false,
            },
        }
    }

    /// Claims for a project, optionally narrowed to one agent.
    pub fn status(&self, project_id: &str, agent_id: Option<&str>) -> Vec<ClaimRecord> {
        let claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        claims
            .iter()
            .filter(|c| c.project_id == project_id)
            .filter(|c| agent_id.map_or(true, |a| c.agent_id == a))
            .cloned()
            .collect()
    }

    pub fn overview(&self, project_id: &str) -> CoordinationOverview {
        let claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        let mut by_agent: FxHashMap<String, Vec<String>> = FxHashMap::default();
        let mut active = 0;
        for claim in claims
            .iter()
            .filter(|c| c.project_id == project_id && c.status == ClaimStatus::Active)
        {
            active += 1;
            by_agent
                .entry(claim.agent_id.clone())
                .or_default()
                .push(claim.target_id.clone());
        }
        let mut agents: Vec<AgentSummary> = by_agent
            .into_iter()
            .map(|(agent_id, mut targets)| {
                targets.sort();
                AgentSummary { agent_id, targets }
            })
            .collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        CoordinationOverview {
            active_claims: active,
            agents,
        }
    }

    /// After a rebuild: active claims whose target no longer exists in the
    /// refreshed graph transition to invalidated. `target_exists` is the
    /// caller's view of the new graph.
    pub fn invalidate_stale_claims(
        &self,
        project_id: &str,
        target_exists: impl Fn(&str) -> bool,
    ) -> usize {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        let mut invalidated = 0;
        for claim in claims.iter_mut().filter(|c| {
            c.status == ClaimStatus::Active && c.project_id == project_id
        }) {
            if !target_exists(&claim.target_id) {
                claim.status = ClaimStatus::Invalidated;
                invalidated += 1;
                info!(claim = %claim.id, target = %claim.target_id, "stale claim invalidated");
            }
        }
        invalidated
    }

    /// Release every active claim an agent holds under a completed task.
    pub fn on_task_completed(&self, task_id: &str, agent_id: &str, project_id: &str) -> usize {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        let mut released = 0;
        for claim in claims.iter_mut().filter(|c| {
            c.status == ClaimStatus::Active
                && c.project_id == project_id
                && c.agent_id == agent_id
                && c.task_id.as_deref() == Some(task_id)
        }) {
            claim.status = ClaimStatus::Released;
            claim.outcome = Some("task_completed".to_string());
            released += 1;
        }
        released
    }

    /// Snapshot of every record (store write-through, debugging).
    pub fn all(&self) -> Vec<ClaimRecord> {
        self.claims
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Convenience for persistence layers that mirror claim records as nodes.
pub fn claim_nodes(records: &[ClaimRecord]) -> Vec<NodeRecord> {
    records.iter().map(ClaimRecord::to_node).collect()
}
