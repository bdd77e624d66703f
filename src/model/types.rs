//! Attribute model, layer configuration, and feature value structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::geom::Geometry;

/// Scalar and geometry kinds an inferred attribute can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeType {
    String,
    Integer,
    Long,
    Float,
    Double,
    Boolean,
    Date,
    GeoPoint,
    GeoShape,
    Binary,
}

impl AttributeType {
    pub fn is_geometry(self) -> bool {
        matches!(self, AttributeType::GeoPoint | AttributeType::GeoShape)
    }
}

/// Geometry flavor of a geometry-typed attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    Shape,
}

/// One inferred field of a layer.
///
/// Produced by the mapping walker, optionally edited through the layer
/// configuration API, and consumed by the schema builder and translator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    /// Dotted source path of the field.
    pub name: String,
    pub kind: AttributeType,
    /// EPSG code, set for geometry attributes (4326 for engine geometries).
    pub srid: Option<u32>,
    pub geometry_kind: Option<GeometryKind>,
    /// Whether the field is stored separately from the source document.
    pub stored: bool,
    /// Whether the field goes through an analyzer (full-text).
    pub analyzed: bool,
    /// Whether the field lives under a `nested`-typed container.
    pub nested: bool,
    /// Valid date formats, in declaration order. Non-empty iff `kind` is Date.
    pub date_formats: Vec<String>,
    /// Whether the attribute participates in the built schema.
    pub use_in_schema: bool,
    /// Display-name override set through the configuration API.
    pub custom_name: Option<String>,
    /// Marks this attribute as the layer's default geometry.
    pub default_geometry: Option<bool>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: AttributeType) -> Self {
        Self {
            name: name.into(),
            kind,
            srid: None,
            geometry_kind: None,
            stored: false,
            analyzed: false,
            nested: false,
            date_formats: Vec::new(),
            use_in_schema: true,
            custom_name: None,
            default_geometry: None,
        }
    }

    /// Name the attribute is exposed under (custom name wins).
    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.name)
    }

    pub fn is_default_geometry(&self) -> bool {
        self.default_geometry == Some(true)
    }
}

/// Ordered attribute set for one source type.
///
/// Built lazily on first schema access, cached by the store, and replaced
/// as a whole value when edited. Clones are deep copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerConfiguration {
    /// Name of the source type the layer reads from.
    pub source_type_name: String,
    /// Name the layer is published under. Defaults to the source type name.
    pub display_name: String,
    pub attributes: Vec<Attribute>,
}

impl LayerConfiguration {
    pub fn new(source_type_name: impl Into<String>) -> Self {
        let source_type_name = source_type_name.into();
        Self {
            display_name: source_type_name.clone(),
            source_type_name,
            attributes: Vec::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<Attribute>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.iter_mut().find(|a| a.name == name)
    }
}

/// A typed value inside a reconstructed feature.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Date(DateTime<Utc>),
    Geometry(Geometry),
    Binary(Vec<u8>),
}

impl FieldValue {
    /// Numeric view used by comparison filters. Dates compare as epoch
    /// milliseconds.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(f64::from(*v)),
            FieldValue::Long(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(f64::from(*v)),
            FieldValue::Double(v) => Some(*v),
            FieldValue::Date(v) => Some(v.timestamp_millis() as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_geometry(&self) -> Option<&Geometry> {
        match self {
            FieldValue::Geometry(g) => Some(g),
            _ => None,
        }
    }
}

/// One reconstructed record.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: String,
    /// Values keyed by schema display name. Absent keys mean null.
    pub values: BTreeMap<String, FieldValue>,
}

impl Feature {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }
}
