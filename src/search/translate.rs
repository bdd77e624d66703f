//! Query translation: declarative query descriptor to native request.
//!
//! Translation is a pure function of the query, the schema, the layer
//! configuration and the store configuration. Filter constructs without a
//! native equivalent degrade the translation to partial support: the
//! untranslated position becomes match-all so the native query over-matches,
//! and the reader corrects the difference with a local post-filter.

use serde_json::{json, Value};
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::filter::{dwithin_envelope, ComparisonOp, Filter};
use crate::geom::Envelope;
use crate::model::{AttributeType, GeometryKind, LayerConfiguration};
use crate::query::{FeatureQuery, SortDirection};
use crate::schema::walk::ID_FIELD;
use crate::schema::FeatureSchema;
use crate::search::geohash;
use crate::search::request::{SearchRequest, MATCH_ALL, MATCH_NONE};

/// Outcome of translating one query.
#[derive(Debug, Clone)]
pub struct Translation {
    pub request: SearchRequest,
    /// False when any filter construct had no native equivalent; the reader
    /// must post-filter.
    pub fully_supported: bool,
    /// Whether cursor streaming was selected over offset paging.
    pub scroll: bool,
    /// Overall cap on streamed results, in either mode.
    pub result_limit: usize,
}

pub struct QueryTranslator<'a> {
    schema: &'a FeatureSchema,
    layer: &'a LayerConfiguration,
    config: &'a StoreConfig,
}

impl<'a> QueryTranslator<'a> {
    pub fn new(
        schema: &'a FeatureSchema,
        layer: &'a LayerConfiguration,
        config: &'a StoreConfig,
    ) -> Self {
        Self {
            schema,
            layer,
            config,
        }
    }

    pub fn translate(&self, query: &FeatureQuery) -> Result<Translation, StoreError> {
        let mut request = SearchRequest::default();
        let mut natural_order = SortDirection::Ascending;

        // cursor streaming is a capability decision: no explicit sort, no
        // offset, no aggregation, and the store must allow it
        let scroll = query.sort.is_empty()
            && query.start_index.is_none()
            && !query.is_aggregation()
            && self.config.scroll_enabled;

        let result_limit = query
            .max_features
            .unwrap_or(self.config.default_max_features);

        if scroll {
            request.size = Some(self.config.effective_scroll_size() as usize);
            request.scroll_ttl = Some(self.config.effective_scroll_ttl());
        } else {
            for key in &query.sort {
                match &key.property {
                    Some(property) => {
                        let field = self
                            .schema
                            .source_path(property)
                            .unwrap_or(property.as_str());
                        request.add_sort(field, key.direction);
                    }
                    None => natural_order = key.direction,
                }
            }
            request.size = Some(result_limit);
            request.from = Some(query.start_index.unwrap_or(0));
        }

        if self.config.source_filtering_enabled {
            self.apply_projection(query, &mut request);
        }

        let mut fully_supported = true;
        request.query = match &query.filter {
            Some(filter) => self.translate_filter(filter, &mut fully_supported),
            None => MATCH_ALL.clone(),
        };
        if !fully_supported {
            debug!(
                type_name = %self.schema.type_name,
                "filter not fully supported natively, post-filtering will apply"
            );
        }

        // guarantee stable pagination ordering when an explicit sort rides
        // on a trivial query
        if !query.sort.is_empty() && request.is_match_all() && !request.has_sort_on(ID_FIELD) {
            request.add_sort(ID_FIELD, natural_order);
        }

        if let Some(hint) = &query.aggregation {
            let mut aggregations = match &hint.aggregation_definition {
                Some(definition) => serde_json::from_str::<Value>(definition)
                    .map_err(|e| StoreError::AggregationDefinition(e.to_string()))?,
                None => self.default_grid_aggregation()?,
            };

            if let Some(native_query) = &hint.query_definition {
                let parsed: Value = serde_json::from_str(native_query)
                    .map_err(|e| StoreError::AggregationDefinition(e.to_string()))?;
                request.query = json!({"bool": {"must": [request.query, parsed]}});
            }

            let envelope = query
                .filter
                .as_ref()
                .and_then(Filter::envelope)
                .filter(Envelope::is_finite)
                .unwrap_or(Envelope::WORLD);
            let precision = geohash::compute_precision(
                &envelope,
                self.config.grid_size,
                self.config.grid_threshold,
            );
            geohash::update_grid_precision(&mut aggregations, precision);
            request.aggregations = Some(aggregations);
            // only buckets are wanted, not individual hits
            request.size = Some(0);
        }

        Ok(Translation {
            request,
            fully_supported,
            scroll,
            result_limit,
        })
    }

    fn apply_projection(&self, query: &FeatureQuery, request: &mut SearchRequest) {
        match &query.properties {
            Some(properties) => {
                for property in properties {
                    if let Some(field) = self.schema.field(property) {
                        if field.stored {
                            request.add_stored_field(&field.source_path);
                        } else {
                            request.add_source_include(&field.source_path);
                        }
                    }
                }
            }
            None => {
                for attribute in &self.layer.attributes {
                    if !attribute.use_in_schema || attribute.kind == AttributeType::Binary {
                        continue;
                    }
                    if attribute.stored {
                        request.add_stored_field(&attribute.name);
                    } else {
                        request.add_source_include(&attribute.name);
                    }
                }
            }
        }
    }

    /// Structural recursion over the filter tree. Untranslatable subtrees
    /// become match-all and clear `supported`.
    fn translate_filter(&self, filter: &Filter, supported: &mut bool) -> Value {
        match filter {
            Filter::IncludeAll => MATCH_ALL.clone(),
            Filter::ExcludeAll => MATCH_NONE.clone(),
            Filter::And(children) => {
                let clauses: Vec<Value> = children
                    .iter()
                    .map(|c| self.translate_filter(c, supported))
                    .collect();
                json!({"bool": {"must": clauses}})
            }
            Filter::Or(children) => {
                let clauses: Vec<Value> = children
                    .iter()
                    .map(|c| self.translate_filter(c, supported))
                    .collect();
                json!({"bool": {"should": clauses, "minimum_should_match": 1}})
            }
            Filter::Not(inner) => {
                // a negation over an unsupported child would under-match;
                // degrade the whole negation instead
                let mut child_supported = true;
                let clause = self.translate_filter(inner, &mut child_supported);
                if !child_supported {
                    *supported = false;
                    return MATCH_ALL.clone();
                }
                json!({"bool": {"must_not": [clause]}})
            }
            Filter::Compare {
                property,
                op,
                value,
            } => match self.resolve(property) {
                Some((path, nested)) => {
                    let clause = match op {
                        ComparisonOp::Eq => json!({"term": {path.clone(): value}}),
                        ComparisonOp::Neq => {
                            json!({"bool": {"must_not": [{"term": {path.clone(): value}}]}})
                        }
                        ComparisonOp::Lt => json!({"range": {path.clone(): {"lt": value}}}),
                        ComparisonOp::Lte => json!({"range": {path.clone(): {"lte": value}}}),
                        ComparisonOp::Gt => json!({"range": {path.clone(): {"gt": value}}}),
                        ComparisonOp::Gte => json!({"range": {path.clone(): {"gte": value}}}),
                    };
                    wrap_nested(&path, nested, clause)
                }
                None => self.degrade(property, supported),
            },
            Filter::Between {
                property,
                lower,
                upper,
            } => match self.resolve(property) {
                Some((path, nested)) => wrap_nested(
                    &path,
                    nested,
                    json!({"range": {path.clone(): {"gte": lower, "lte": upper}}}),
                ),
                None => self.degrade(property, supported),
            },
            Filter::Like { property, pattern } => match self.schema.field(property) {
                Some(field) => {
                    let path = field.source_path.clone();
                    let clause = if field.analyzed {
                        // analyzed text goes through the query parser
                        json!({"query_string": {"default_field": path.clone(), "query": pattern}})
                    } else {
                        json!({"wildcard": {path.clone(): pattern}})
                    };
                    wrap_nested(&path, field.nested, clause)
                }
                None => self.degrade(property, supported),
            },
            Filter::IsNull { property } => match self.resolve(property) {
                Some((path, nested)) => wrap_nested(
                    &path,
                    nested,
                    json!({"bool": {"must_not": [{"exists": {"field": path.clone()}}]}}),
                ),
                None => self.degrade(property, supported),
            },
            Filter::IdIn(ids) => json!({"ids": {"values": ids}}),
            Filter::Bbox { property, envelope } => {
                self.spatial_envelope_query(property, envelope, supported)
            }
            Filter::Intersects { property, envelope } => {
                self.spatial_envelope_query(property, envelope, supported)
            }
            Filter::DWithin {
                property,
                center,
                distance_m,
            } => match self.schema.field(property) {
                Some(field) if field.geometry_kind == Some(GeometryKind::Point) => {
                    json!({"geo_distance": {
                        "distance": format!("{distance_m}m"),
                        field.source_path.clone(): {"lat": center.y, "lon": center.x}
                    }})
                }
                Some(field) => {
                    // distance against shapes has no exact native form;
                    // conservative envelope query plus post-filter
                    *supported = false;
                    let envelope = dwithin_envelope(*center, *distance_m);
                    self.geo_shape_envelope(&field.source_path, &envelope)
                }
                None => self.degrade(property, supported),
            },
            Filter::Unsupported { label, .. } => {
                debug!(label = %label, "filter construct has no native equivalent");
                *supported = false;
                MATCH_ALL.clone()
            }
        }
    }

    fn spatial_envelope_query(
        &self,
        property: &str,
        envelope: &Envelope,
        supported: &mut bool,
    ) -> Value {
        match self.schema.field(property) {
            Some(field) if field.geometry_kind == Some(GeometryKind::Point) => {
                json!({"geo_bounding_box": {field.source_path.clone(): {
                    "top_left": {"lat": envelope.max_y, "lon": envelope.min_x},
                    "bottom_right": {"lat": envelope.min_y, "lon": envelope.max_x}
                }}})
            }
            Some(field) if field.geometry_kind == Some(GeometryKind::Shape) => {
                self.geo_shape_envelope(&field.source_path, envelope)
            }
            _ => self.degrade(property, supported),
        }
    }

    fn geo_shape_envelope(&self, path: &str, envelope: &Envelope) -> Value {
        json!({"geo_shape": {path: {
            "shape": {
                "type": "envelope",
                "coordinates": [
                    [envelope.min_x, envelope.max_y],
                    [envelope.max_x, envelope.min_y]
                ]
            },
            "relation": "intersects"
        }}})
    }

    /// Resolve a display name to (source path, nested flag).
    fn resolve(&self, property: &str) -> Option<(String, bool)> {
        self.schema
            .field(property)
            .map(|f| (f.source_path.clone(), f.nested))
    }

    fn degrade(&self, property: &str, supported: &mut bool) -> Value {
        debug!(property, "property not in schema, degrading to match-all");
        *supported = false;
        MATCH_ALL.clone()
    }

    /// Default geohash-grid aggregation over the layer's geometry field.
    fn default_grid_aggregation(&self) -> Result<Value, StoreError> {
        let field = self.schema.geometry_field().ok_or_else(|| {
            StoreError::AggregationDefinition(format!(
                "no geometry field available for a grid aggregation on {}",
                self.schema.type_name
            ))
        })?;
        Ok(json!({"grid": {"geohash_grid": {"field": field.source_path}}}))
    }
}

fn wrap_nested(path: &str, nested: bool, clause: Value) -> Value {
    if !nested {
        return clause;
    }
    match path.rsplit_once('.') {
        Some((parent, _)) => json!({"nested": {"path": parent, "query": clause}}),
        None => clause,
    }
}
