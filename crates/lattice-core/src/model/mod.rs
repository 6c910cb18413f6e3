//! Graph data model: labels, edge types, id synthesis, validity windows.
//!
//! Nodes are referenced by stable string ids everywhere; no typed node ever
//! holds an owning reference to another. Traversal happens over adjacency
//! maps keyed by id (see `lattice-graph::index`).

pub mod ids;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel meaning "still live" for `valid_to`. Stored as NULL.
pub const VALID_TO_LIVE: Option<i64> = None;

/// Node labels in the property graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeLabel {
    File,
    Folder,
    Function,
    Class,
    Variable,
    Import,
    Export,
    TestSuite,
    Document,
    Section,
    Community,
    Feature,
    GraphTx,
    Episode,
    Claim,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "FILE",
            Self::Folder => "FOLDER",
            Self::Function => "FUNCTION",
            Self::Class => "CLASS",
            Self::Variable => "VARIABLE",
            Self::Import => "IMPORT",
            Self::Export => "EXPORT",
            Self::TestSuite => "TEST_SUITE",
            Self::Document => "DOCUMENT",
            Self::Section => "SECTION",
            Self::Community => "COMMUNITY",
            Self::Feature => "FEATURE",
            Self::GraphTx => "GRAPH_TX",
            Self::Episode => "EPISODE",
            Self::Claim => "CLAIM",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "FILE" => Self::File,
            "FOLDER" => Self::Folder,
            "FUNCTION" => Self::Function,
            "CLASS" => Self::Class,
            "VARIABLE" => Self::Variable,
            "IMPORT" => Self::Import,
            "EXPORT" => Self::Export,
            "TEST_SUITE" => Self::TestSuite,
            "DOCUMENT" => Self::Document,
            "SECTION" => Self::Section,
            "COMMUNITY" => Self::Community,
            "FEATURE" => Self::Feature,
            "GRAPH_TX" => Self::GraphTx,
            "EPISODE" => Self::Episode,
            "CLAIM" => Self::Claim,
            _ => return None,
        })
    }

    /// Labels whose nodes carry a validity window and tx provenance.
    pub fn is_versioned(&self) -> bool {
        matches!(
            self,
            Self::File
                | Self::Function
                | Self::Class
                | Self::Variable
                | Self::Import
                | Self::Document
                | Self::Section
                | Self::Community
        )
    }

    /// Labels counted by the drift detector ("indexable" code entities).
    pub fn is_indexable(&self) -> bool {
        matches!(
            self,
            Self::File | Self::Function | Self::Class | Self::Import | Self::Export | Self::TestSuite
        )
    }
}

impl std::fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship types in the property graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    Contains,
    Imports,
    Exports,
    References,
    Extends,
    Implements,
    Tests,
    Calls,
    DefinedIn,
    SectionOf,
    NextSection,
    DocDescribes,
    BelongsTo,
    Involves,
    AppliesTo,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "CONTAINS",
            Self::Imports => "IMPORTS",
            Self::Exports => "EXPORTS",
            Self::References => "REFERENCES",
            Self::Extends => "EXTENDS",
            Self::Implements => "IMPLEMENTS",
            Self::Tests => "TESTS",
            Self::Calls => "CALLS",
            Self::DefinedIn => "DEFINED_IN",
            Self::SectionOf => "SECTION_OF",
            Self::NextSection => "NEXT_SECTION",
            Self::DocDescribes => "DOC_DESCRIBES",
            Self::BelongsTo => "BELONGS_TO",
            Self::Involves => "INVOLVES",
            Self::AppliesTo => "APPLIES_TO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CONTAINS" => Self::Contains,
            "IMPORTS" => Self::Imports,
            "EXPORTS" => Self::Exports,
            "REFERENCES" => Self::References,
            "EXTENDS" => Self::Extends,
            "IMPLEMENTS" => Self::Implements,
            "TESTS" => Self::Tests,
            "CALLS" => Self::Calls,
            "DEFINED_IN" => Self::DefinedIn,
            "SECTION_OF" => Self::SectionOf,
            "NEXT_SECTION" => Self::NextSection,
            "DOC_DESCRIBES" => Self::DocDescribes,
            "BELONGS_TO" => Self::BelongsTo,
            "INVOLVES" => Self::Involves,
            "APPLIES_TO" => Self::AppliesTo,
            _ => return None,
        })
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bitemporal validity window `[valid_from, valid_to)` plus tx provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validity {
    pub valid_from: i64,
    /// `None` means live; a value is the tombstone timestamp.
    pub valid_to: Option<i64>,
    pub tx_id: String,
}

impl Validity {
    pub fn live(valid_from: i64, tx_id: impl Into<String>) -> Self {
        Self {
            valid_from,
            valid_to: VALID_TO_LIVE,
            tx_id: tx_id.into(),
        }
    }

    /// True when the window covers `ts`.
    pub fn covers(&self, ts: i64) -> bool {
        self.valid_from <= ts && self.valid_to.map_or(true, |to| to > ts)
    }

    pub fn is_live(&self) -> bool {
        self.valid_to.is_none()
    }
}

/// A node as it exists in the in-memory index and in upsert params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub label: NodeLabel,
    pub properties: Map<String, Value>,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>, label: NodeLabel, properties: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            label,
            properties,
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        self.properties.get("projectId").and_then(Value::as_str)
    }

    pub fn valid_from(&self) -> Option<i64> {
        self.properties.get("validFrom").and_then(Value::as_i64)
    }

    pub fn valid_to(&self) -> Option<i64> {
        self.properties.get("validTo").and_then(Value::as_i64)
    }

    /// Live = no tombstone recorded.
    pub fn is_live(&self) -> bool {
        self.valid_to().is_none()
    }

    pub fn str_prop(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

/// A directed edge between two node ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub rel: EdgeType,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl EdgeRecord {
    pub fn new(rel: EdgeType, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            rel,
            from: from.into(),
            to: to.into(),
            properties: Map::new(),
        }
    }

    pub fn with_properties(mut self, properties: Map<String, Value>) -> Self {
        self.properties = properties;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_round_trips_through_parse() {
        for label in [
            NodeLabel::File,
            NodeLabel::TestSuite,
            NodeLabel::GraphTx,
            NodeLabel::Section,
        ] {
            assert_eq!(NodeLabel::parse(label.as_str()), Some(label));
        }
        assert_eq!(NodeLabel::parse("NOPE"), None);
    }

    #[test]
    fn validity_window_covers_live_and_tombstoned() {
        let live = Validity::live(100, "tx-1");
        assert!(live.covers(100));
        assert!(live.covers(5_000));
        assert!(!live.covers(99));

        let dead = Validity {
            valid_from: 100,
            valid_to: Some(200),
            tx_id: "tx-1".into(),
        };
        assert!(dead.covers(150));
        assert!(!dead.covers(200));
    }
}
