//! Value objects shared across the crate: inferred attributes, layer
//! configurations, and reconstructed features.

pub mod types;

pub use types::{
    Attribute, AttributeType, Feature, FieldValue, GeometryKind, LayerConfiguration,
};
