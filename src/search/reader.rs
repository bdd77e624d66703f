//! Result reconstruction: native responses to typed features.
//!
//! The reader is a finite, non-restartable iterator. Offset mode drains one
//! response; cursor mode issues follow-up fetches until an empty page and
//! releases the server-side cursor exactly once, on every exit path.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::filter::Filter;
use crate::geom::{geo_point_from_value, geo_shape_from_value, Geometry};
use crate::model::{AttributeType, Feature, FieldValue};
use crate::schema::dates::{DateFormatter, DEFAULT_DATE_FORMAT};
use crate::schema::walk::{AGGREGATION_FIELD, ID_FIELD, INDEX_FIELD, SCORE_FIELD, TYPE_FIELD};
use crate::schema::{FeatureSchema, FieldDescriptor};
use crate::search::client::SearchClient;
use crate::search::response::{SearchHit, SearchResponse};
use crate::search::translate::Translation;

/// Owns one in-flight cursor. Releases it exactly once: either explicitly on
/// natural exhaustion or from `Drop` when consumption is abandoned early.
struct ScrollGuard {
    client: Arc<dyn SearchClient>,
    cursor: Option<String>,
    ttl: Duration,
}

impl ScrollGuard {
    fn fetch_next(&mut self) -> Result<Option<SearchResponse>, StoreError> {
        let cursor = match &self.cursor {
            Some(cursor) => cursor.clone(),
            None => return Ok(None),
        };
        let response = self.client.scroll(&cursor, self.ttl).map_err(|e| match e {
            StoreError::InvalidCursor => StoreError::InvalidCursor,
            other => StoreError::CursorFetch {
                source: Box::new(other),
            },
        })?;
        if let Some(next) = &response.scroll_id {
            self.cursor = Some(next.clone());
        }
        Ok(Some(response))
    }

    fn release(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            let mut cursors = HashSet::new();
            cursors.insert(cursor);
            if let Err(e) = self.client.clear_scroll(&cursors) {
                // best-effort cleanup; the server expires the cursor anyway
                warn!(error = %e, "failed to release scroll cursor");
            }
        }
    }
}

impl Drop for ScrollGuard {
    fn drop(&mut self) {
        self.release();
    }
}

struct DecodedField {
    descriptor: FieldDescriptor,
    formatters: Vec<DateFormatter>,
}

/// Per-layer hit decoder built once from the schema.
struct FeatureDecoder {
    type_name: String,
    fields: Vec<DecodedField>,
}

impl FeatureDecoder {
    fn new(schema: &FeatureSchema) -> Self {
        let fields = schema
            .fields
            .iter()
            .map(|descriptor| {
                let mut formatters: Vec<DateFormatter> = descriptor
                    .date_formats
                    .iter()
                    .filter_map(|f| DateFormatter::for_format(f).ok())
                    .collect();
                if descriptor.kind == AttributeType::Date && formatters.is_empty() {
                    if let Ok(fallback) = DateFormatter::for_format(DEFAULT_DATE_FORMAT) {
                        formatters.push(fallback);
                    }
                }
                DecodedField {
                    descriptor: descriptor.clone(),
                    formatters,
                }
            })
            .collect();
        Self {
            type_name: schema.type_name.clone(),
            fields,
        }
    }

    fn decode(&self, hit: &SearchHit) -> Feature {
        let mut feature = Feature::new(hit.id.clone());
        for field in &self.fields {
            let descriptor = &field.descriptor;
            let value = match descriptor.source_path.as_str() {
                ID_FIELD => Some(FieldValue::String(hit.id.clone())),
                INDEX_FIELD => hit.index.clone().map(FieldValue::String),
                TYPE_FIELD => hit.doc_type.clone().map(FieldValue::String),
                SCORE_FIELD => hit.score.map(|s| FieldValue::Float(s as f32)),
                AGGREGATION_FIELD => None,
                path => {
                    let raw = if descriptor.stored {
                        hit.stored_first(path)
                    } else {
                        hit.source.as_ref().and_then(|src| source_value(src, path))
                    };
                    raw.and_then(|raw| convert_value(field, raw))
                }
            };
            if let Some(value) = value {
                feature.values.insert(descriptor.name.clone(), value);
            }
        }
        feature
    }

    fn bucket_feature(&self, ordinal: usize, bucket: &Map<String, Value>) -> Result<Feature, StoreError> {
        let payload = serde_json::to_vec(bucket)
            .map_err(|e| StoreError::AggregationPayload(e.to_string()))?;
        let mut feature = Feature::new(format!("{}.bucket.{ordinal}", self.type_name));
        feature
            .values
            .insert(AGGREGATION_FIELD.to_string(), FieldValue::Binary(payload));
        Ok(feature)
    }
}

/// Resolve a dotted path inside a source document. Arrays along the path
/// contribute their first element.
fn source_value<'a>(source: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut current: &Value = source.get(path.split('.').next()?)?;
    for segment in path.split('.').skip(1) {
        if let Value::Array(items) = current {
            current = items.first()?;
        }
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn convert_value(field: &DecodedField, raw: &Value) -> Option<FieldValue> {
    // multi-valued scalar fields decode from their first element
    let raw = match raw {
        Value::Array(items) if !field.descriptor.kind.is_geometry() => items.first()?,
        other => other,
    };
    match field.descriptor.kind {
        AttributeType::String => match raw {
            Value::String(s) => Some(FieldValue::String(s.clone())),
            Value::Number(n) => Some(FieldValue::String(n.to_string())),
            Value::Bool(b) => Some(FieldValue::String(b.to_string())),
            _ => None,
        },
        AttributeType::Integer => as_i64(raw).map(|v| FieldValue::Integer(v as i32)),
        AttributeType::Long => as_i64(raw).map(FieldValue::Long),
        AttributeType::Float => as_f64(raw).map(|v| FieldValue::Float(v as f32)),
        AttributeType::Double => as_f64(raw).map(FieldValue::Double),
        AttributeType::Boolean => match raw {
            Value::Bool(b) => Some(FieldValue::Boolean(*b)),
            Value::String(s) => s.parse().ok().map(FieldValue::Boolean),
            _ => None,
        },
        AttributeType::Date => field
            .formatters
            .iter()
            .find_map(|f| f.parse_value(raw))
            .map(FieldValue::Date),
        AttributeType::GeoPoint => {
            geo_point_from_value(raw).map(|p| FieldValue::Geometry(Geometry::Point(p)))
        }
        AttributeType::GeoShape => geo_shape_from_value(raw).map(FieldValue::Geometry),
        AttributeType::Binary => raw.as_str().and_then(|s| {
            base64::engine::general_purpose::STANDARD
                .decode(s)
                .ok()
                .map(FieldValue::Binary)
        }),
    }
}

fn as_i64(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_f64(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Lazy sequence of reconstructed features for one executed query.
pub struct FeatureReader {
    decoder: FeatureDecoder,
    hits: VecDeque<SearchHit>,
    buckets: VecDeque<Map<String, Value>>,
    emitted_buckets: usize,
    scroll: Option<ScrollGuard>,
    post_filter: Option<Filter>,
    remaining: usize,
}

impl FeatureReader {
    pub(crate) fn new(
        client: Arc<dyn SearchClient>,
        schema: &FeatureSchema,
        translation: &Translation,
        post_filter: Option<Filter>,
        first: SearchResponse,
    ) -> Self {
        let buckets: VecDeque<Map<String, Value>> =
            if translation.request.aggregations.is_some() {
                first
                    .aggregations
                    .iter()
                    .flat_map(|aggs| aggs.values())
                    .flat_map(|agg| agg.buckets.iter().cloned())
                    .collect()
            } else {
                VecDeque::new()
            };

        let scroll = if translation.scroll {
            first.scroll_id.as_ref().map(|cursor| ScrollGuard {
                client,
                cursor: Some(cursor.clone()),
                ttl: translation
                    .request
                    .scroll_ttl
                    .unwrap_or_else(|| Duration::from_secs(120)),
            })
        } else {
            None
        };

        Self {
            decoder: FeatureDecoder::new(schema),
            hits: first.hits.hits.into(),
            buckets,
            emitted_buckets: 0,
            scroll,
            post_filter,
            remaining: translation.result_limit,
        }
    }

    fn release_scroll(&mut self) {
        if let Some(guard) = &mut self.scroll {
            guard.release();
        }
    }

    fn next_feature(&mut self) -> Option<Result<Feature, StoreError>> {
        if let Some(bucket) = self.buckets.pop_front() {
            let ordinal = self.emitted_buckets;
            self.emitted_buckets += 1;
            return Some(self.decoder.bucket_feature(ordinal, &bucket));
        }

        loop {
            if self.remaining == 0 {
                self.release_scroll();
                return None;
            }
            match self.hits.pop_front() {
                Some(hit) => {
                    self.remaining -= 1;
                    let feature = self.decoder.decode(&hit);
                    if let Some(filter) = &self.post_filter {
                        if !filter.evaluate(&feature) {
                            continue;
                        }
                    }
                    return Some(Ok(feature));
                }
                None => {
                    let guard = self.scroll.as_mut()?;
                    match guard.fetch_next() {
                        Ok(Some(page)) if page.num_hits() > 0 => {
                            debug!(hits = page.num_hits(), "fetched scroll page");
                            self.hits = page.hits.hits.into();
                        }
                        Ok(_) => {
                            // cursor exhausted: normal termination
                            self.release_scroll();
                            return None;
                        }
                        Err(e) => {
                            self.release_scroll();
                            return Some(Err(e));
                        }
                    }
                }
            }
        }
    }
}

impl Iterator for FeatureReader {
    type Item = Result<Feature, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_feature()
    }
}

/// Decode the serialized bucket payload of an aggregation feature.
///
/// `Ok(None)` when the feature carries no payload; a present but corrupt
/// payload is a hard failure, never skipped.
pub fn decode_aggregation_payload(
    feature: &Feature,
) -> Result<Option<Map<String, Value>>, StoreError> {
    match feature.get(AGGREGATION_FIELD) {
        Some(FieldValue::Binary(bytes)) => serde_json::from_slice(bytes)
            .map(Some)
            .map_err(|e| StoreError::AggregationPayload(e.to_string())),
        Some(_) => Err(StoreError::AggregationPayload(
            "aggregation attribute is not binary".to_string(),
        )),
        None => Ok(None),
    }
}
