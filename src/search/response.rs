//! Native search response decoding.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// One decoded response page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    pub scroll_id: Option<String>,
    #[serde(default)]
    pub hits: HitsEnvelope,
    #[serde(default)]
    pub aggregations: Option<BTreeMap<String, AggregationResult>>,
}

impl SearchResponse {
    pub fn total_hits(&self) -> u64 {
        self.hits.total
    }

    pub fn num_hits(&self) -> usize {
        self.hits.hits.len()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HitsEnvelope {
    /// Total matching documents. The wire carries either a bare number or a
    /// `{value, relation}` object depending on engine generation.
    #[serde(default, deserialize_with = "deserialize_total")]
    pub total: u64,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_index", default)]
    pub index: Option<String>,
    #[serde(rename = "_type", default)]
    pub doc_type: Option<String>,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    /// Stored-field values, each a list on the wire.
    #[serde(rename = "fields", default)]
    pub stored_fields: BTreeMap<String, Vec<Value>>,
    #[serde(rename = "_source", default)]
    pub source: Option<Map<String, Value>>,
}

impl SearchHit {
    pub fn stored_first(&self, field: &str) -> Option<&Value> {
        self.stored_fields.get(field).and_then(|v| v.first())
    }
}

/// One named bucket aggregation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AggregationResult {
    #[serde(default)]
    pub buckets: Vec<Map<String, Value>>,
}

fn deserialize_total<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    match &raw {
        Value::Number(n) => Ok(n.as_u64().unwrap_or(0)),
        Value::Object(map) => Ok(map.get("value").and_then(Value::as_u64).unwrap_or(0)),
        _ => Ok(0),
    }
}
