//! End-to-end behavior of the store against an in-memory backend: paging
//! equivalence, post-filter exhaustiveness, counting, and cursor hygiene.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use anyhow::Result;
use serde_json::{json, Map, Value};

use featurestore_search::filter::{ComparisonOp, Filter, LocalPredicate};
use featurestore_search::geom::Envelope;
use featurestore_search::model::FieldValue;
use featurestore_search::query::FeatureQuery;
use featurestore_search::search::request::SearchRequest;
use featurestore_search::search::response::SearchResponse;
use featurestore_search::search::SearchClient;
use featurestore_search::{FeatureStore, StoreConfig, StoreError};

/// Serves canned documents, honoring from/size paging and cursor streaming.
/// Filters are not evaluated, which matches a native engine exactly in the
/// cases these tests exercise: the translated queries are all match-all.
struct MemoryBackend {
    docs: Vec<(String, Value)>,
    /// cursor -> (next offset, page size)
    cursors: Mutex<HashMap<String, (usize, usize)>>,
    released: Mutex<HashSet<String>>,
    cursor_seq: AtomicUsize,
}

impl MemoryBackend {
    fn new(docs: Vec<(String, Value)>) -> Self {
        Self {
            docs,
            cursors: Mutex::new(HashMap::new()),
            released: Mutex::new(HashSet::new()),
            cursor_seq: AtomicUsize::new(0),
        }
    }

    fn released(&self) -> HashSet<String> {
        self.released.lock().unwrap().clone()
    }

    fn page(&self, from: usize, size: usize) -> Vec<Value> {
        self.docs
            .iter()
            .skip(from)
            .take(size)
            .map(|(id, source)| json!({"_id": id, "_index": "idx", "_source": source}))
            .collect()
    }

    fn response(&self, hits: Vec<Value>, scroll_id: Option<&str>) -> SearchResponse {
        let mut body = json!({
            "hits": {"total": self.docs.len(), "hits": hits}
        });
        if let Some(id) = scroll_id {
            body["_scroll_id"] = json!(id);
        }
        serde_json::from_value(body).unwrap()
    }
}

impl SearchClient for MemoryBackend {
    fn get_types(&self, _index: &str) -> Result<Vec<String>, StoreError> {
        Ok(vec!["places".to_string()])
    }

    fn get_mapping(
        &self,
        _index: &str,
        doc_type: &str,
    ) -> Result<Option<Map<String, Value>>, StoreError> {
        if doc_type != "places" {
            return Ok(None);
        }
        Ok(json!({
            "properties": {
                "name": {"type": "keyword"},
                "population": {"type": "long"},
                "geom": {"type": "geo_point"}
            }
        })
        .as_object()
        .cloned())
    }

    fn search(
        &self,
        _index: &str,
        _doc_type: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, StoreError> {
        let size = request.size.unwrap_or(10);
        if request.scroll_ttl.is_some() {
            let cursor = format!("c{}", self.cursor_seq.fetch_add(1, Ordering::SeqCst));
            self.cursors
                .lock()
                .unwrap()
                .insert(cursor.clone(), (size, size));
            return Ok(self.response(self.page(0, size), Some(&cursor)));
        }
        Ok(self.response(self.page(request.from.unwrap_or(0), size), None))
    }

    fn scroll(&self, cursor: &str, _ttl: Duration) -> Result<SearchResponse, StoreError> {
        let mut cursors = self.cursors.lock().unwrap();
        let (offset, size) = *cursors.get(cursor).ok_or(StoreError::InvalidCursor)?;
        let hits = self.page(offset, size);
        cursors.insert(cursor.to_string(), (offset + hits.len(), size));
        drop(cursors);
        Ok(self.response(hits, Some(cursor)))
    }

    fn clear_scroll(&self, cursors: &HashSet<String>) -> Result<(), StoreError> {
        let mut released = self.released.lock().unwrap();
        for cursor in cursors {
            released.insert(cursor.clone());
            self.cursors.lock().unwrap().remove(cursor);
        }
        Ok(())
    }
}

fn docs() -> Vec<(String, Value)> {
    vec![
        ("a".into(), json!({"name": "alpha", "population": 50, "geom": [-10.0, 5.0]})),
        ("b".into(), json!({"name": "beta", "population": 150, "geom": [0.0, 0.0]})),
        ("c".into(), json!({"name": "gamma", "population": 300, "geom": [20.0, -5.0]})),
        ("d".into(), json!({"name": "delta", "population": 80, "geom": [30.0, 15.0]})),
        ("e".into(), json!({"name": "epsilon", "population": 900, "geom": [-25.0, -20.0]})),
    ]
}

fn store_with(config: StoreConfig) -> (Arc<FeatureStore>, Arc<MemoryBackend>) {
    static TRACING: Once = Once::new();
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
    let backend = Arc::new(MemoryBackend::new(docs()));
    let store = Arc::new(FeatureStore::new(backend.clone(), "idx", config));
    (store, backend)
}

fn collect_ids(store: &Arc<FeatureStore>, query: &FeatureQuery) -> Vec<String> {
    store
        .feature_source("places")
        .unwrap()
        .reader(query)
        .unwrap()
        .map(|f| f.unwrap().id)
        .collect()
}

#[test]
fn offset_and_cursor_paging_yield_the_same_features() {
    let (offset_store, _) = store_with(StoreConfig::default());
    let (scroll_store, backend) = store_with(StoreConfig {
        scroll_enabled: true,
        scroll_size: Some(2),
        ..Default::default()
    });

    let query = FeatureQuery::all();
    let via_offset = collect_ids(&offset_store, &query);
    let via_cursor = collect_ids(&scroll_store, &query);

    assert_eq!(via_offset, vec!["a", "b", "c", "d", "e"]);
    assert_eq!(via_offset, via_cursor);
    // exhaustion released the cursor
    assert_eq!(backend.released().len(), 1);
}

#[test]
fn abandoned_cursor_is_released_on_drop() {
    let (store, backend) = store_with(StoreConfig {
        scroll_enabled: true,
        scroll_size: Some(2),
        ..Default::default()
    });

    let source = store.feature_source("places").unwrap();
    let mut reader = source.reader(&FeatureQuery::all()).unwrap();
    assert_eq!(reader.next().unwrap().unwrap().id, "a");
    assert!(backend.released().is_empty());
    drop(reader);
    assert_eq!(backend.released().len(), 1);
}

#[test]
fn unsupported_filter_is_corrected_by_the_post_filter() {
    let (store, _) = store_with(StoreConfig::default());
    let query = FeatureQuery::all().with_filter(Filter::Unsupported {
        label: "population-over-100".into(),
        predicate: LocalPredicate::new(|feature| {
            matches!(feature.get("population"), Some(FieldValue::Long(p)) if *p > 100)
        }),
    });
    assert_eq!(collect_ids(&store, &query), vec!["b", "c", "e"]);
}

#[test]
fn count_under_partial_support_matches_materialized_results() -> Result<()> {
    let (store, _) = store_with(StoreConfig::default());
    let source = store.feature_source("places")?;
    let query = FeatureQuery::all().with_filter(Filter::Unsupported {
        label: "population-over-100".into(),
        predicate: LocalPredicate::new(|feature| {
            matches!(feature.get("population"), Some(FieldValue::Long(p)) if *p > 100)
        }),
    });
    assert_eq!(source.count(&query)?, 3);
    Ok(())
}

#[test]
fn count_clamps_to_offset_and_result_limit() -> Result<()> {
    let (store, _) = store_with(StoreConfig::default());
    let source = store.feature_source("places")?;

    let query = FeatureQuery::all()
        .with_filter(Filter::Compare {
            property: "population".into(),
            op: ComparisonOp::Gte,
            value: json!(0),
        })
        .with_start_index(2)
        .with_max_features(2);
    assert_eq!(source.count(&query)?, 2);

    let tail = FeatureQuery::all().with_start_index(4).with_max_features(10);
    assert_eq!(source.count(&tail)?, 1);

    let past_end = FeatureQuery::all().with_start_index(9);
    assert_eq!(source.count(&past_end)?, 0);
    Ok(())
}

#[test]
fn bounds_fold_all_result_geometries() -> Result<()> {
    let (store, _) = store_with(StoreConfig::default());
    let source = store.feature_source("places")?;
    let bounds = source.bounds(&FeatureQuery::all())?.expect("geometries present");
    assert_eq!(bounds, Envelope::new(-25.0, -20.0, 30.0, 15.0));
    Ok(())
}

#[test]
fn offset_paging_respects_start_index_and_cap() {
    let (store, _) = store_with(StoreConfig::default());
    let query = FeatureQuery::all().with_start_index(1).with_max_features(2);
    assert_eq!(collect_ids(&store, &query), vec!["b", "c"]);
}
