//! Error taxonomy for store operations.
//!
//! Hard failures always identify the operation and the index/type involved.
//! Degradations (unmappable mapping leaves, unresolvable SRIDs, partially
//! supported filters) are `tracing` diagnostics, not errors.

use thiserror::Error;

/// Boxed transport-layer cause. Retry policy belongs to the transport
/// implementation, never to this crate.
pub type TransportCause = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Connectivity or protocol failure in the underlying search capability.
    #[error("transport failure during {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: TransportCause,
    },

    /// Mapping metadata could not be fetched for schema inference.
    #[error("failed to fetch mapping for type {doc_type} in index {index}")]
    SchemaFetch {
        index: String,
        doc_type: String,
        #[source]
        source: Box<StoreError>,
    },

    /// Search execution failed.
    #[error("search failed for type {doc_type} in index {index}")]
    Search {
        index: String,
        doc_type: String,
        #[source]
        source: Box<StoreError>,
    },

    /// A cursor follow-up fetch failed.
    #[error("cursor fetch failed")]
    CursorFetch {
        #[source]
        source: Box<StoreError>,
    },

    /// The search engine rejected a cursor token as invalid.
    #[error("cursor token rejected by the search engine")]
    InvalidCursor,

    /// The requested type name does not exist in the index.
    #[error("unknown type name: {0}")]
    UnknownType(String),

    /// An aggregation bucket payload could not be decoded. Never skipped
    /// silently: a corrupt payload would produce wrong answers downstream.
    #[error("malformed aggregation payload: {0}")]
    AggregationPayload(String),

    /// An aggregation definition string from a query hint failed to parse.
    #[error("invalid aggregation definition: {0}")]
    AggregationDefinition(String),

    /// A date format pattern could not be interpreted.
    #[error("invalid date format pattern: {0}")]
    InvalidDateFormat(String),
}

impl StoreError {
    pub fn transport(
        operation: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StoreError::Transport {
            operation,
            source: Box::new(source),
        }
    }
}
