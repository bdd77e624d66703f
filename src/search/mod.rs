//! Query execution layer.
//!
//! - **[`client`]**: the abstract search capability the store consumes.
//! - **[`request`]** / **[`response`]**: native wire documents.
//! - **[`translate`]**: declarative query to native request.
//! - **[`geohash`]**: grid-aggregation precision computation.
//! - **[`reader`]**: native responses to typed features, offset and cursor.
//! - **[`rest`]**: blocking REST adapter implementing the capability.

pub mod client;
pub mod geohash;
pub mod reader;
pub mod request;
pub mod response;
pub mod rest;
pub mod translate;

pub use client::SearchClient;
pub use reader::{decode_aggregation_payload, FeatureReader};
pub use request::SearchRequest;
pub use response::{SearchHit, SearchResponse};
pub use rest::RestSearchClient;
pub use translate::{QueryTranslator, Translation};
