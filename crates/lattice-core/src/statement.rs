//! Upsert statements: `{query, params}` pairs executed against the graph
//! engine. All statements use MERGE-on-`(label, id)` semantics and must be
//! safe to execute twice.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One parametrized query destined for the graph engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub query: String,
    pub params: Map<String, Value>,
}

impl Statement {
    pub fn new(query: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }
}

/// Sanitize params before execution.
///
/// Scalars and homogeneous scalar lists pass through; nested objects and
/// mixed lists are serialized to their canonical JSON string form, which is
/// what the store can hold as a property. Numbers that are not finite
/// become null.
pub fn sanitize_params(params: &Map<String, Value>) -> Map<String, Value> {
    params
        .iter()
        .map(|(k, v)| (k.clone(), sanitize_value(v)))
        .collect()
}

fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => value.clone(),
        Value::Number(n) => {
            if n.as_f64().map_or(true, f64::is_finite) {
                value.clone()
            } else {
                Value::Null
            }
        }
        Value::Array(items) => {
            if items.iter().all(is_scalar) {
                value.clone()
            } else {
                Value::String(value.to_string())
            }
        }
        Value::Object(_) => Value::String(value.to_string()),
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_pass_through() {
        let mut params = Map::new();
        params.insert("a".into(), json!(1));
        params.insert("b".into(), json!("x"));
        params.insert("c".into(), json!(null));
        params.insert("d".into(), json!(["x", "y"]));
        assert_eq!(sanitize_params(&params), params);
    }

    #[test]
    fn nested_payloads_serialize_to_strings() {
        let mut params = Map::new();
        params.insert("meta".into(), json!({"k": [1, 2]}));
        params.insert("mixed".into(), json!([{"a": 1}, "b"]));
        let out = sanitize_params(&params);
        assert_eq!(out["meta"], json!(r#"{"k":[1,2]}"#));
        assert!(out["mixed"].is_string());
    }
}
