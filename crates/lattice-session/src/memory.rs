//! Episodic memory: typed episodes with validation, ranked recall, and a
//! reflection pass that distills recurring patterns into LEARNING
//! episodes.

use std::sync::Mutex;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use lattice_core::errors::SessionError;
use lattice_core::model::{NodeLabel, NodeRecord};
use lattice_core::now_millis;
use lattice_core::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EpisodeType {
    Observation,
    Decision,
    Edit,
    TestResult,
    Error,
    Reflection,
    Learning,
}

impl EpisodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observation => "OBSERVATION",
            Self::Decision => "DECISION",
            Self::Edit => "EDIT",
            Self::TestResult => "TEST_RESULT",
            Self::Error => "ERROR",
            Self::Reflection => "REFLECTION",
            Self::Learning => "LEARNING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "OBSERVATION" => Self::Observation,
            "DECISION" => Self::Decision,
            "EDIT" => Self::Edit,
            "TEST_RESULT" => Self::TestResult,
            "ERROR" => Self::Error,
            "REFLECTION" => Self::Reflection,
            "LEARNING" => Self::Learning,
            _ => return None,
        })
    }
}

const VALID_OUTCOMES: &[&str] = &["success", "failure", "partial"];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: String,
    pub episode_type: EpisodeType,
    pub content: String,
    /// Graph node ids this episode involves.
    pub entities: Vec<String>,
    pub task_id: Option<String>,
    pub outcome: Option<String>,
    pub metadata: Map<String, Value>,
    pub sensitive: bool,
    pub agent_id: String,
    pub session_id: String,
    pub created_at: i64,
    pub project_id: String,
}

impl Episode {
    /// EPISODE node for store persistence. `INVOLVES` edges are derived
    /// from `entities` by the caller.
    pub fn to_node(&self) -> NodeRecord {
        let mut props = Map::new();
        props.insert("type".into(), json!(self.episode_type.as_str()));
        props.insert("content".into(), json!(self.content));
        props.insert("entities".into(), json!(self.entities));
        props.insert("taskId".into(), json!(self.task_id));
        props.insert("outcome".into(), json!(self.outcome));
        props.insert(
            "metadata".into(),
            json!(Value::Object(self.metadata.clone()).to_string()),
        );
        props.insert("sensitive".into(), json!(self.sensitive));
        props.insert("agentId".into(), json!(self.agent_id));
        props.insert("sessionId".into(), json!(self.session_id));
        props.insert("createdAt".into(), json!(self.created_at));
        props.insert("projectId".into(), json!(self.project_id));
        NodeRecord::new(&self.id, NodeLabel::Episode, props)
    }
}

/// What callers submit; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct EpisodeDraft {
    pub episode_type: String,
    pub content: String,
    pub entities: Vec<String>,
    pub task_id: Option<String>,
    pub outcome: Option<String>,
    pub metadata: Map<String, Value>,
    pub sensitive: bool,
    pub agent_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct RecallQuery {
    pub query: String,
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
    pub types: Option<Vec<EpisodeType>>,
    /// Entity hints, e.g. derived from embeddings by the caller.
    pub entities: Vec<String>,
    pub limit: usize,
    pub since: Option<i64>,
    /// Sensitive episodes are excluded unless explicitly asked for.
    pub include_sensitive: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectReport {
    pub reflection_id: Option<String>,
    pub learnings_created: usize,
}

#[derive(Debug, Default)]
pub struct EpisodeStore {
    episodes: Mutex<Vec<Episode>>,
}

impl EpisodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and persist one episode; returns the episode id.
    pub fn add(&self, draft: EpisodeDraft, project_id: &str) -> Result<String, SessionError> {
        let episode_type = EpisodeType::parse(&draft.episode_type).ok_or_else(|| {
            SessionError::InvalidEpisode {
                reason: format!("unknown episode type '{}'", draft.episode_type),
            }
        })?;

        if episode_type == EpisodeType::Decision
            && draft
                .metadata
                .get("rationale")
                .and_then(Value::as_str)
                .map_or(true, str::is_empty)
        {
            return Err(SessionError::InvalidEpisode {
                reason: "DECISION episodes require metadata.rationale".to_string(),
            });
        }

        if let Some(outcome) = draft.outcome.as_deref() {
            if !VALID_OUTCOMES.contains(&outcome) {
                return Err(SessionError::InvalidEpisode {
                    reason: format!("outcome must be one of {VALID_OUTCOMES:?}, got '{outcome}'"),
                });
            }
        }

        let episode = Episode {
            id: format!("ep-{}", Uuid::new_v4()),
            episode_type,
            content: draft.content,
            entities: draft.entities,
            task_id: draft.task_id,
            outcome: draft.outcome,
            metadata: draft.metadata,
            sensitive: draft.sensitive,
            agent_id: draft.agent_id,
            session_id: draft.session_id,
            created_at: now_millis(),
            project_id: project_id.to_string(),
        };
        let id = episode.id.clone();
        debug!(episode = %id, kind = episode.episode_type.as_str(), "episode added");
        self.episodes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(episode);
        Ok(id)
    }

    /// Ranked recall: text match + entity overlap + recency.
    pub fn recall(&self, query: &RecallQuery, project_id: &str) -> Vec<Episode> {
        let episodes = self.episodes.lock().unwrap_or_else(|e| e.into_inner());
        let tokens = tokenize(&query.query);
        let newest = episodes
            .iter()
            .filter(|e| e.project_id == project_id)
            .map(|e| e.created_at)
            .max()
            .unwrap_or(0);

        let mut scored: Vec<(f64, &Episode)> = episodes
            .iter()
            .filter(|e| e.project_id == project_id)
            .filter(|e| query.include_sensitive || !e.sensitive)
            .filter(|e| query.agent_id.as_deref().map_or(true, |a| e.agent_id == a))
            .filter(|e| {
                query
                    .task_id
                    .as_deref()
                    .map_or(true, |t| e.task_id.as_deref() == Some(t))
            })
            .filter(|e| {
                query
                    .types
                    .as_ref()
                    .map_or(true, |types| types.contains(&e.episode_type))
            })
            .filter(|e| query.since.map_or(true, |ts| e.created_at >= ts))
            .filter_map(|e| score(e, &tokens, &query.entities, newest).map(|s| (s, e)))
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.created_at.cmp(&a.1.created_at))
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        let limit = if query.limit == 0 { 20 } else { query.limit };
        scored.into_iter().take(limit).map(|(_, e)| e.clone()).collect()
    }

    /// `recall` filtered to DECISION episodes.
    pub fn decision_query(&self, query: &RecallQuery, project_id: &str) -> Vec<Episode> {
        let mut query = query.clone();
        query.types = Some(vec![EpisodeType::Decision]);
        self.recall(&query, project_id)
    }

    /// Scan recent episodes and synthesize LEARNING episodes from
    /// repeated signals: recurring errors and repeatedly edited entities.
    pub fn reflect(
        &self,
        task_id: Option<&str>,
        agent_id: Option<&str>,
        limit: usize,
        project_id: &str,
    ) -> ReflectReport {
        let recent: Vec<Episode> = {
            let episodes = self.episodes.lock().unwrap_or_else(|e| e.into_inner());
            let mut matching: Vec<&Episode> = episodes
                .iter()
                .filter(|e| e.project_id == project_id)
                .filter(|e| agent_id.map_or(true, |a| e.agent_id == a))
                .filter(|e| task_id.map_or(true, |t| e.task_id.as_deref() == Some(t)))
                .collect();
            matching.sort_by_key(|e| std::cmp::Reverse(e.created_at));
            matching
                .into_iter()
                .take(if limit == 0 { 50 } else { limit })
                .cloned()
                .collect()
        };

        if recent.is_empty() {
            return ReflectReport {
                reflection_id: None,
                learnings_created: 0,
            };
        }

        let mut learnings: Vec<String> = Vec::new();

        // Recurring errors with the same leading signature.
        let mut error_signatures: FxHashMap<String, usize> = FxHashMap::default();
        for episode in recent.iter().filter(|e| e.episode_type == EpisodeType::Error) {
            *error_signatures.entry(signature(&episode.content)).or_default() += 1;
        }
        for (sig, count) in error_signatures {
            if count >= 2 {
                learnings.push(format!(
                    "error pattern observed {count} times: {sig}"
                ));
            }
        }

        // Entities edited again and again.
        let mut edit_counts: FxHashMap<&str, usize> = FxHashMap::default();
        for episode in recent.iter().filter(|e| e.episode_type == EpisodeType::Edit) {
            for entity in &episode.entities {
                *edit_counts.entry(entity.as_str()).or_default() += 1;
            }
        }
        for (entity, count) in edit_counts {
            if count >= 3 {
                learnings.push(format!(
                    "entity {entity} edited {count} times in one window; likely a hotspot"
                ));
            }
        }

        // Failed decisions deserve a note.
        for episode in recent.iter().filter(|e| {
            e.episode_type == EpisodeType::Decision && e.outcome.as_deref() == Some("failure")
        }) {
            learnings.push(format!("decision failed: {}", signature(&episode.content)));
        }

        let learnings_created = learnings.len();
        let agent = agent_id.unwrap_or("reflector").to_string();
        let session = recent
            .first()
            .map(|e| e.session_id.clone())
            .unwrap_or_default();

        let mut reflection_id = None;
        if learnings_created > 0 {
            for learning in learnings {
                let mut metadata = Map::new();
                metadata.insert("derivedFrom".into(), json!("reflection"));
                let _ = self.add(
                    EpisodeDraft {
                        episode_type: "LEARNING".to_string(),
                        content: learning,
                        entities: Vec::new(),
                        task_id: task_id.map(String::from),
                        outcome: None,
                        metadata,
                        sensitive: false,
                        agent_id: agent.clone(),
                        session_id: session.clone(),
                    },
                    project_id,
                );
            }

            let mut metadata = Map::new();
            metadata.insert("learnings".into(), json!(learnings_created));
            reflection_id = self
                .add(
                    EpisodeDraft {
                        episode_type: "REFLECTION".to_string(),
                        content: format!(
                            "reflection over {} episodes produced {learnings_created} learnings",
                            recent.len()
                        ),
                        entities: Vec::new(),
                        task_id: task_id.map(String::from),
                        outcome: None,
                        metadata,
                        sensitive: false,
                        agent_id: agent,
                        session_id: session,
                    },
                    project_id,
                )
                .ok();
        }

        info!(learnings = learnings_created, "reflection complete");
        ReflectReport {
            reflection_id,
            learnings_created,
        }
    }

    pub fn all(&self, project_id: &str) -> Vec<Episode> {
        self.episodes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_ascii_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Leading words of content, used to group near-identical messages.
fn signature(content: &str) -> String {
    content
        .split_whitespace()
        .take(6)
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

/// Relevance score, or `None` when the caller supplied query/entity
/// signals and this episode matches neither — recency alone never
/// qualifies an episode against a real query.
fn score(
    episode: &Episode,
    tokens: &[String],
    entity_hints: &[String],
    newest: i64,
) -> Option<f64> {
    let haystack = episode.content.to_ascii_lowercase();
    let text_hits = tokens.iter().filter(|t| haystack.contains(*t)).count();
    let text_score = if tokens.is_empty() {
        0.0
    } else {
        text_hits as f64 / tokens.len() as f64
    };

    let entity_hits = entity_hints
        .iter()
        .filter(|hint| episode.entities.iter().any(|e| e.contains(*hint)))
        .count();
    let entity_score = if entity_hints.is_empty() {
        0.0
    } else {
        entity_hits as f64 / entity_hints.len() as f64
    };

    let has_signal = !tokens.is_empty() || !entity_hints.is_empty();
    if has_signal && text_hits == 0 && entity_hits == 0 {
        return None;
    }

    // Recency decays against the newest episode in scope, day-scaled.
    let age = (newest - episode.created_at).max(0) as f64;
    let recency = 1.0 / (1.0 + age / 86_400_000.0);

    Some(text_score * 0.5 + entity_score * 0.3 + recency * 0.2)
}
