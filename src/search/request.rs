//! Native search request document.

use std::time::Duration;

use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};

use crate::query::SortDirection;

/// The trivial match-everything query.
pub static MATCH_ALL: Lazy<Value> = Lazy::new(|| json!({"match_all": {}}));

/// The match-nothing query.
pub static MATCH_NONE: Lazy<Value> = Lazy::new(|| json!({"match_none": {}}));

/// One native request. Built fresh per query and immutable once handed to
/// the search capability.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: Value,
    pub source_includes: Vec<String>,
    pub stored_fields: Vec<String>,
    pub sort: Vec<(String, SortDirection)>,
    pub from: Option<usize>,
    pub size: Option<usize>,
    pub scroll_ttl: Option<Duration>,
    pub aggregations: Option<Value>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: MATCH_ALL.clone(),
            source_includes: Vec::new(),
            stored_fields: Vec::new(),
            sort: Vec::new(),
            from: None,
            size: None,
            scroll_ttl: None,
            aggregations: None,
        }
    }
}

impl SearchRequest {
    pub fn add_sort(&mut self, field: impl Into<String>, direction: SortDirection) {
        self.sort.push((field.into(), direction));
    }

    pub fn has_sort_on(&self, field: &str) -> bool {
        self.sort.iter().any(|(f, _)| f == field)
    }

    pub fn add_source_include(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.source_includes.contains(&path) {
            self.source_includes.push(path);
        }
    }

    pub fn add_stored_field(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.stored_fields.contains(&path) {
            self.stored_fields.push(path);
        }
    }

    pub fn is_match_all(&self) -> bool {
        self.query == *MATCH_ALL
    }

    /// Serialize to the engine's request body.
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("query".to_string(), self.query.clone());
        if !self.source_includes.is_empty() {
            body.insert(
                "_source".to_string(),
                json!({"includes": self.source_includes}),
            );
        }
        if !self.stored_fields.is_empty() {
            body.insert("stored_fields".to_string(), json!(self.stored_fields));
        }
        if !self.sort.is_empty() {
            let keys: Vec<Value> = self
                .sort
                .iter()
                .map(|(field, direction)| json!({field: {"order": direction.as_str()}}))
                .collect();
            body.insert("sort".to_string(), Value::Array(keys));
        }
        if let Some(from) = self.from {
            body.insert("from".to_string(), json!(from));
        }
        if let Some(size) = self.size {
            body.insert("size".to_string(), json!(size));
        }
        if let Some(aggregations) = &self.aggregations {
            body.insert("aggregations".to_string(), aggregations.clone());
        }
        Value::Object(body)
    }
}
