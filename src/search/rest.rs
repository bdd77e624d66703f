//! Blocking REST implementation of the search capability.
//!
//! Thin adapter: endpoint plumbing and status mapping only. Anything
//! behavioral (pagination, translation, decoding) lives above this seam.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::StoreError;
use crate::search::client::SearchClient;
use crate::search::request::SearchRequest;
use crate::search::response::SearchResponse;

pub struct RestSearchClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl RestSearchClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let http = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| StoreError::transport("client init", e))?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { http, base_url })
    }

    fn get_json(&self, operation: &'static str, url: &str) -> Result<Value, StoreError> {
        self.http
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(|r| r.json())
            .map_err(|e| StoreError::transport(operation, e))
    }

    fn mappings_for_index(&self, index: &str) -> Result<Map<String, Value>, StoreError> {
        let url = format!("{}/{}/_mapping", self.base_url, index);
        let doc = self.get_json("get mapping", &url)?;
        // response nests under the concrete index name, which may differ
        // from an alias used in the request
        let mappings = doc
            .as_object()
            .and_then(|o| o.values().next())
            .and_then(|entry| entry.get("mappings"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Ok(mappings)
    }
}

impl SearchClient for RestSearchClient {
    fn get_types(&self, index: &str) -> Result<Vec<String>, StoreError> {
        let mappings = self.mappings_for_index(index)?;
        // typeless indices expose their mapping directly; legacy multi-type
        // indices key one mapping per doc type
        if mappings.contains_key("properties") {
            return Ok(vec![index.to_string()]);
        }
        Ok(mappings
            .iter()
            .filter(|(_, v)| v.is_object())
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn get_mapping(
        &self,
        index: &str,
        doc_type: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        let mappings = self.mappings_for_index(index)?;
        if mappings.contains_key("properties") && doc_type == index {
            return Ok(Some(mappings));
        }
        Ok(mappings
            .get(doc_type)
            .and_then(Value::as_object)
            .cloned())
    }

    fn search(
        &self,
        index: &str,
        doc_type: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, StoreError> {
        let mut url = format!("{}/{}/_search", self.base_url, index);
        if doc_type != index {
            url = format!("{}/{}/{}/_search", self.base_url, index, doc_type);
        }
        let mut http_request = self.http.post(&url).json(&request.to_body());
        if let Some(ttl) = request.scroll_ttl {
            http_request = http_request.query(&[("scroll", format!("{}s", ttl.as_secs()))]);
        }
        debug!(url, "executing search");
        http_request
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .and_then(|r| r.json())
            .map_err(|e| StoreError::transport("search", e))
    }

    fn scroll(&self, cursor: &str, ttl: Duration) -> Result<SearchResponse, StoreError> {
        let url = format!("{}/_search/scroll", self.base_url);
        let body = json!({
            "scroll": format!("{}s", ttl.as_secs()),
            "scroll_id": cursor,
        });
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| StoreError::transport("scroll", e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::InvalidCursor);
        }
        response
            .error_for_status()
            .and_then(|r| r.json())
            .map_err(|e| StoreError::transport("scroll", e))
    }

    fn clear_scroll(&self, cursors: &HashSet<String>) -> Result<(), StoreError> {
        if cursors.is_empty() {
            return Ok(());
        }
        let url = format!("{}/_search/scroll", self.base_url);
        let body = json!({"scroll_id": cursors.iter().collect::<Vec<_>>()});
        self.http
            .delete(&url)
            .json(&body)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map(|_| ())
            .map_err(|e| StoreError::transport("clear scroll", e))
    }
}
