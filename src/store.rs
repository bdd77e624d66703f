//! Feature store: per-collection state, layer-configuration cache, and the
//! per-type feature source.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::geom::Envelope;
use crate::model::{Feature, FieldValue, LayerConfiguration};
use crate::query::FeatureQuery;
use crate::schema::{self, FeatureSchema};
use crate::search::client::SearchClient;
use crate::search::reader::FeatureReader;
use crate::search::translate::{QueryTranslator, Translation};

/// Handle to one search index exposed as a feature collection.
///
/// Layer configurations are inferred lazily on first access and cached for
/// the lifetime of the store. The cache publishes whole values behind one
/// lock: concurrent readers never observe a partially updated configuration.
pub struct FeatureStore {
    client: Arc<dyn SearchClient>,
    index: String,
    config: StoreConfig,
    layers: RwLock<HashMap<String, Arc<LayerConfiguration>>>,
}

impl FeatureStore {
    pub fn new(
        client: Arc<dyn SearchClient>,
        index: impl Into<String>,
        config: StoreConfig,
    ) -> Self {
        Self {
            client,
            index: index.into(),
            config,
            layers: RwLock::new(HashMap::new()),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Enumerate available type names: the index's own types plus any
    /// configured layers.
    pub fn type_names(&self) -> Result<Vec<String>, StoreError> {
        let mut names = self.client.get_types(&self.index)?;
        for name in self.layers.read().keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        Ok(names)
    }

    /// Fetch the layer configuration for a type, inferring it from mapping
    /// metadata on first access.
    pub fn layer_configuration(
        &self,
        type_name: &str,
    ) -> Result<Arc<LayerConfiguration>, StoreError> {
        if let Some(existing) = self.layers.read().get(type_name) {
            return Ok(Arc::clone(existing));
        }

        let mapping = self
            .client
            .get_mapping(&self.index, type_name)
            .map_err(|e| StoreError::SchemaFetch {
                index: self.index.clone(),
                doc_type: type_name.to_string(),
                source: Box::new(e),
            })?
            .ok_or_else(|| StoreError::UnknownType(type_name.to_string()))?;

        debug!(type_name, "inferring layer configuration from mapping");
        let attributes = schema::walk(&mapping);
        let inferred =
            Arc::new(LayerConfiguration::new(type_name).with_attributes(attributes));

        // first writer wins; either way callers get one consistent value
        let mut layers = self.layers.write();
        Ok(Arc::clone(
            layers
                .entry(type_name.to_string())
                .or_insert(inferred),
        ))
    }

    /// Replace a layer configuration as a whole value.
    pub fn set_layer_configuration(&self, config: LayerConfiguration) {
        self.layers
            .write()
            .insert(config.source_type_name.clone(), Arc::new(config));
    }

    pub fn feature_source(self: &Arc<Self>, type_name: &str) -> Result<FeatureSource, StoreError> {
        // materialize the configuration up front so later calls are local
        self.layer_configuration(type_name)?;
        Ok(FeatureSource {
            store: Arc::clone(self),
            type_name: type_name.to_string(),
        })
    }
}

/// Query access to one type within the store's index.
pub struct FeatureSource {
    store: Arc<FeatureStore>,
    type_name: String,
}

impl FeatureSource {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Build the typed schema from the current layer configuration.
    pub fn schema(&self) -> Result<FeatureSchema, StoreError> {
        let layer = self.store.layer_configuration(&self.type_name)?;
        Ok(schema::build(&layer.attributes, &self.type_name))
    }

    /// Execute a query and stream its reconstructed features.
    pub fn reader(&self, query: &FeatureQuery) -> Result<FeatureReader, StoreError> {
        let layer = self.store.layer_configuration(&self.type_name)?;
        let schema = schema::build(&layer.attributes, &self.type_name);
        let translation =
            QueryTranslator::new(&schema, &layer, &self.store.config).translate(query)?;
        let response = self.execute(&translation)?;

        let post_filter = if translation.fully_supported {
            None
        } else {
            query.filter.clone()
        };
        Ok(FeatureReader::new(
            Arc::clone(&self.store.client),
            &schema,
            &translation,
            post_filter,
            response,
        ))
    }

    /// Count matching features.
    ///
    /// Under partial filter support the count must not trust the native
    /// total; it fully materializes through the post-filter path.
    pub fn count(&self, query: &FeatureQuery) -> Result<usize, StoreError> {
        let layer = self.store.layer_configuration(&self.type_name)?;
        let schema = schema::build(&layer.attributes, &self.type_name);
        let translation =
            QueryTranslator::new(&schema, &layer, &self.store.config).translate(query)?;

        if !translation.fully_supported {
            let mut count = 0usize;
            for feature in self.reader(query)? {
                feature?;
                count += 1;
            }
            return Ok(count);
        }

        let mut counting = translation.clone();
        counting.request.size = Some(0);
        counting.request.scroll_ttl = None;
        let response = self.execute(&counting)?;

        let total = response.total_hits() as usize;
        let from = query.start_index.unwrap_or(0);
        Ok(total.saturating_sub(from).min(translation.result_limit))
    }

    /// Total spatial bounds of the query's results, if any geometry exists.
    pub fn bounds(&self, query: &FeatureQuery) -> Result<Option<Envelope>, StoreError> {
        let mut bounds: Option<Envelope> = None;
        for feature in self.reader(query)? {
            let feature = feature?;
            for envelope in geometry_envelopes(&feature) {
                match bounds.as_mut() {
                    Some(acc) => acc.expand_to_include(&envelope),
                    None => bounds = Some(envelope),
                }
            }
        }
        Ok(bounds)
    }

    fn execute(
        &self,
        translation: &Translation,
    ) -> Result<crate::search::response::SearchResponse, StoreError> {
        self.store
            .client
            .search(&self.store.index, &self.type_name, &translation.request)
            .map_err(|e| StoreError::Search {
                index: self.store.index.clone(),
                doc_type: self.type_name.clone(),
                source: Box::new(e),
            })
    }
}

fn geometry_envelopes(feature: &Feature) -> impl Iterator<Item = Envelope> + '_ {
    feature.values.values().filter_map(|value| match value {
        FieldValue::Geometry(g) => Some(g.envelope()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::request::SearchRequest;
    use crate::search::response::SearchResponse;
    use serde_json::{json, Map, Value};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct MappingOnlyClient {
        mapping_fetches: AtomicUsize,
    }

    impl SearchClient for MappingOnlyClient {
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
            self.mapping_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(json!({
                "properties": {
                    "name": {"type": "keyword"},
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
            _request: &SearchRequest,
        ) -> Result<SearchResponse, StoreError> {
            Ok(SearchResponse::default())
        }

        fn scroll(&self, _cursor: &str, _ttl: Duration) -> Result<SearchResponse, StoreError> {
            Ok(SearchResponse::default())
        }

        fn clear_scroll(&self, _cursors: &HashSet<String>) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn store() -> Arc<FeatureStore> {
        Arc::new(FeatureStore::new(
            Arc::new(MappingOnlyClient {
                mapping_fetches: AtomicUsize::new(0),
            }),
            "idx",
            StoreConfig::default(),
        ))
    }

    #[test]
    fn layer_configuration_is_inferred_once_and_cached() {
        let store = store();
        let first = store.layer_configuration("places").unwrap();
        let second = store.layer_configuration("places").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.attribute("name").is_some());
        assert!(first.attribute("geom").is_some());
    }

    #[test]
    fn unknown_type_is_an_error() {
        let store = store();
        assert!(matches!(
            store.layer_configuration("missing"),
            Err(StoreError::UnknownType(_))
        ));
    }

    #[test]
    fn replaced_configuration_is_visible_as_a_whole() {
        let store = store();
        let mut edited = (*store.layer_configuration("places").unwrap()).clone();
        edited.attribute_mut("name").unwrap().custom_name = Some("title".to_string());
        edited.attribute_mut("geom").unwrap().default_geometry = Some(true);
        store.set_layer_configuration(edited);

        let source = store.feature_source("places").unwrap();
        let schema = source.schema().unwrap();
        assert!(schema.field("title").is_some());
        assert!(schema.field("name").is_none());
        assert_eq!(schema.default_geometry.as_deref(), Some("geom"));
    }

    #[test]
    fn type_names_include_configured_layers() {
        let store = store();
        store.set_layer_configuration(LayerConfiguration::new("views"));
        let mut names = store.type_names().unwrap();
        names.sort();
        assert_eq!(names, vec!["places", "views"]);
    }
}
