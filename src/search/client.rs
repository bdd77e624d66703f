//! Abstract search capability consumed by the store.
//!
//! The store never talks to a transport directly; it is handed something
//! implementing [`SearchClient`]. Timeouts and retry policy live behind this
//! seam.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::search::request::SearchRequest;
use crate::search::response::SearchResponse;

pub trait SearchClient: Send + Sync {
    /// Enumerate available type names for an index.
    fn get_types(&self, index: &str) -> Result<Vec<String>, StoreError>;

    /// Fetch nested mapping metadata for one type. `None` when the type does
    /// not exist.
    fn get_mapping(
        &self,
        index: &str,
        doc_type: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError>;

    /// Execute one query.
    fn search(
        &self,
        index: &str,
        doc_type: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, StoreError>;

    /// Continue a cursor.
    fn scroll(&self, cursor: &str, ttl: Duration) -> Result<SearchResponse, StoreError>;

    /// Best-effort cursor cleanup.
    fn clear_scroll(&self, cursors: &HashSet<String>) -> Result<(), StoreError>;
}
