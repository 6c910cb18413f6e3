//! Bolt backend over `neo4rs`. One `Graph` per session; params are
//! converted from the canonical JSON form to bolt values, rows come back
//! as column → JSON maps.

use std::sync::Arc;

use async_trait::async_trait;
use neo4rs::{BoltList, BoltMap, BoltNull, BoltString, BoltType, Graph};
use serde_json::{Map, Value};
use tracing::debug;

use lattice_core::errors::StoreError;
use lattice_core::traits::{GraphBackend, GraphConnector, Row};

pub struct Neo4jConnector {
    user: String,
    password: String,
}

impl Neo4jConnector {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl GraphConnector for Neo4jConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn GraphBackend>, StoreError> {
        debug!(uri, "opening bolt connection");
        let graph = Graph::new(uri, self.user.as_str(), self.password.as_str())
            .await
            .map_err(classify)?;
        Ok(Arc::new(Neo4jBackend { graph }))
    }
}

pub struct Neo4jBackend {
    graph: Graph,
}

#[async_trait]
impl GraphBackend for Neo4jBackend {
    async fn run(&self, query: &str, params: &Map<String, Value>) -> Result<Vec<Row>, StoreError> {
        let mut q = neo4rs::query(query);
        for (key, value) in params {
            q = q.param(key, to_bolt(value));
        }

        let mut stream = self.graph.execute(q).await.map_err(classify)?;
        let mut rows = Vec::new();
        loop {
            match stream.next().await {
                Ok(Some(row)) => match row.to::<Value>() {
                    Ok(Value::Object(map)) => rows.push(map),
                    Ok(other) => {
                        let mut map = Map::new();
                        map.insert("value".to_string(), other);
                        rows.push(map);
                    }
                    Err(e) => {
                        return Err(StoreError::Backend {
                            message: format!("row deserialization failed: {e}"),
                        })
                    }
                },
                Ok(None) => break,
                Err(e) => return Err(classify(e)),
            }
        }
        Ok(rows)
    }
}

/// Classify a `neo4rs` error into the engine's taxonomy. String-based on
/// purpose: the driver's error surface varies across store versions.
fn classify(e: neo4rs::Error) -> StoreError {
    let text = e.to_string();
    let lower = text.to_ascii_lowercase();
    if lower.contains("unresolv")
        || lower.contains("dns")
        || lower.contains("lookup")
        || lower.contains("name or service not known")
    {
        StoreError::HostUnresolvable { host: text }
    } else if lower.contains("unavailable")
        || lower.contains("connection")
        || lower.contains("timed out")
        || lower.contains("broken pipe")
        || lower.contains("io error")
    {
        StoreError::ServiceUnavailable { message: text }
    } else if lower.contains("syntax") {
        StoreError::Syntax { message: text }
    } else if lower.contains("constraint") {
        StoreError::Constraint { message: text }
    } else {
        StoreError::Backend { message: text }
    }
}

/// JSON → bolt conversion for sanitized params (scalars and scalar lists;
/// nested maps only appear presanitized but are handled for completeness).
fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                BoltType::from(i)
            } else {
                BoltType::from(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => BoltType::from(s.as_str()),
        Value::Array(items) => {
            let list: Vec<BoltType> = items.iter().map(to_bolt).collect();
            BoltType::List(BoltList::from(list))
        }
        Value::Object(map) => {
            let mut bolt = BoltMap::default();
            for (k, v) in map {
                bolt.put(BoltString::from(k.as_str()), to_bolt(v));
            }
            BoltType::Map(bolt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classification_covers_the_retry_contract() {
        let unresolvable = StoreError::HostUnresolvable {
            host: "x".to_string(),
        };
        assert!(!unresolvable.is_transient());

        let unavailable = StoreError::ServiceUnavailable {
            message: "x".to_string(),
        };
        assert!(unavailable.is_transient());

        let syntax = StoreError::Syntax {
            message: "x".to_string(),
        };
        assert!(!syntax.is_transient());
    }

    #[test]
    fn json_scalars_convert() {
        assert!(matches!(to_bolt(&json!(null)), BoltType::Null(_)));
        assert!(matches!(to_bolt(&json!(true)), BoltType::Boolean(_)));
        assert!(matches!(to_bolt(&json!(3)), BoltType::Integer(_)));
        assert!(matches!(to_bolt(&json!(3.5)), BoltType::Float(_)));
        assert!(matches!(to_bolt(&json!("s")), BoltType::String(_)));
        assert!(matches!(to_bolt(&json!(["a", "b"])), BoltType::List(_)));
    }
}
