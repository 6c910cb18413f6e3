//! The closed tool surface: one tagged variant per tool with a uniform
//! response envelope. Schema validation happens here at the edge; the
//! engines behind it receive typed arguments.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lattice_core::errors::error_code;
use lattice_core::LatticeError;
use lattice_core::LatticeErrorCode;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolRequest {
    #[serde(rename_all = "camelCase")]
    GraphSetWorkspace {
        workspace_root: PathBuf,
        source_dir: Option<PathBuf>,
        project_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GraphRebuild {
        mode: Option<String>,
        workspace_root: Option<PathBuf>,
        source_dir: Option<PathBuf>,
        project_id: Option<String>,
        index_docs: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    GraphQuery {
        query: String,
        language: Option<String>,
        mode: Option<String>,
        limit: Option<usize>,
        as_of: Option<String>,
    },
    GraphHealth {},
    #[serde(rename_all = "camelCase")]
    DiffSince {
        since: String,
        types: Option<Vec<String>>,
        project_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AgentClaim {
        agent_id: String,
        target_id: String,
        claim_type: String,
        intent: String,
        task_id: Option<String>,
        session_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AgentRelease {
        claim_id: String,
        outcome: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AgentStatus {
        agent_id: Option<String>,
    },
    CoordinationOverview {},
    #[serde(rename_all = "camelCase")]
    EpisodeAdd {
        episode_type: String,
        content: String,
        entities: Option<Vec<String>>,
        task_id: Option<String>,
        outcome: Option<String>,
        metadata: Option<serde_json::Map<String, Value>>,
        sensitive: Option<bool>,
        agent_id: String,
        session_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    EpisodeRecall {
        query: String,
        agent_id: Option<String>,
        task_id: Option<String>,
        types: Option<Vec<String>>,
        entities: Option<Vec<String>>,
        limit: Option<usize>,
        since: Option<String>,
        include_sensitive: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    DecisionQuery {
        query: String,
        agent_id: Option<String>,
        limit: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    Reflect {
        task_id: Option<String>,
        agent_id: Option<String>,
        limit: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    IndexDocs {
        incremental: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    SearchDocs {
        query: String,
        limit: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    DocsBySymbol {
        symbol: String,
        limit: Option<usize>,
    },
    #[serde(rename_all = "camelCase")]
    FindPattern {
        #[serde(rename = "type")]
        pattern_type: String,
    },
    #[serde(rename_all = "camelCase")]
    Briefing {
        task: String,
        seed_ids: Vec<String>,
        limit: Option<usize>,
    },
}

impl ToolRequest {
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::GraphSetWorkspace { .. } => "graph_set_workspace",
            Self::GraphRebuild { .. } => "graph_rebuild",
            Self::GraphQuery { .. } => "graph_query",
            Self::GraphHealth {} => "graph_health",
            Self::DiffSince { .. } => "diff_since",
            Self::AgentClaim { .. } => "agent_claim",
            Self::AgentRelease { .. } => "agent_release",
            Self::AgentStatus { .. } => "agent_status",
            Self::CoordinationOverview {} => "coordination_overview",
            Self::EpisodeAdd { .. } => "episode_add",
            Self::EpisodeRecall { .. } => "episode_recall",
            Self::DecisionQuery { .. } => "decision_query",
            Self::Reflect { .. } => "reflect",
            Self::IndexDocs { .. } => "index_docs",
            Self::SearchDocs { .. } => "search_docs",
            Self::DocsBySymbol { .. } => "docs_by_symbol",
            Self::FindPattern { .. } => "find_pattern",
            Self::Briefing { .. } => "briefing",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub tool: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub reason: String,
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Uniform response envelope: `{data, summary?, profile}` on success,
/// `{error}` otherwise.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolResponse {
    Success {
        data: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        profile: Profile,
    },
    Error {
        error: ErrorBody,
    },
}

impl ToolResponse {
    pub fn success(data: Value, summary: Option<String>, tool: &str, duration_ms: u64) -> Self {
        Self::Success {
            data,
            summary,
            profile: Profile {
                tool: tool.to_string(),
                duration_ms,
            },
        }
    }

    pub fn error(e: &LatticeError, hint: Option<String>) -> Self {
        Self::Error {
            error: ErrorBody {
                code: e.error_code().to_string(),
                reason: e.to_string(),
                recoverable: e.recoverable(),
                hint,
            },
        }
    }

    pub fn invalid_input(reason: impl Into<String>, hint: Option<String>) -> Self {
        Self::Error {
            error: ErrorBody {
                code: error_code::INVALID_INPUT.to_string(),
                reason: reason.into(),
                recoverable: true,
                hint,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Error { .. } => None,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Error { error } => Some(&error.code),
            Self::Success { .. } => None,
        }
    }
}
