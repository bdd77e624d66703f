//! Document search indices exposed as typed feature collections.
//!
//! A [`store::FeatureStore`] wraps one index behind a [`search::SearchClient`]
//! and infers a typed schema per document type from mapping metadata. Its
//! [`store::FeatureSource`]s translate declarative [`query::FeatureQuery`]s
//! into native search requests and reconstruct responses as typed
//! [`model::Feature`]s, post-filtering locally whenever a filter construct
//! had no exact native equivalent.
//!
//! ```no_run
//! use std::sync::Arc;
//! use featurestore_search::{FeatureStore, StoreConfig};
//! use featurestore_search::query::FeatureQuery;
//! use featurestore_search::search::RestSearchClient;
//!
//! # fn main() -> Result<(), featurestore_search::StoreError> {
//! let client = Arc::new(RestSearchClient::new("http://localhost:9200")?);
//! let store = Arc::new(FeatureStore::new(client, "places", StoreConfig::default()));
//! let source = store.feature_source("places")?;
//! for feature in source.reader(&FeatureQuery::all())? {
//!     println!("{}", feature?.id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod geom;
pub mod model;
pub mod query;
pub mod schema;
pub mod search;
pub mod store;

pub use config::StoreConfig;
pub use error::StoreError;
pub use filter::Filter;
pub use model::{Attribute, AttributeType, Feature, FieldValue, LayerConfiguration};
pub use store::{FeatureSource, FeatureStore};
