//! Feature type builder: turns a configured attribute list into the typed
//! schema used by translation and reconstruction.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{Attribute, AttributeType, GeometryKind};

/// A resolved coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crs {
    pub epsg: u32,
}

impl Crs {
    pub const WGS84: Crs = Crs { epsg: 4326 };

    /// Resolve an EPSG code. Only geographic/projected systems the crate can
    /// reason about are accepted; anything else is unresolvable.
    pub fn from_epsg(epsg: u32) -> Option<Crs> {
        match epsg {
            4326 | 4269 | 3857 => Some(Crs { epsg }),
            _ => None,
        }
    }
}

/// One field of a built schema, with the metadata the translator and the
/// record decoder need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Display name (custom name wins over the raw mapping path).
    pub name: String,
    /// Full dotted source path of the backing field.
    pub source_path: String,
    pub kind: AttributeType,
    pub crs: Option<Crs>,
    pub geometry_kind: Option<GeometryKind>,
    pub analyzed: bool,
    pub nested: bool,
    pub stored: bool,
    /// Valid date formats in declaration order, for Date fields.
    pub date_formats: Vec<String>,
}

/// Typed record schema for one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub type_name: String,
    /// Fields in configured attribute order; never re-sorted.
    pub fields: Vec<FieldDescriptor>,
    /// Display name of the default geometry field, when exactly one
    /// attribute claims it.
    pub default_geometry: Option<String>,
}

impl FeatureSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Resolve a display name to its full source path.
    pub fn source_path(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.source_path.as_str())
    }

    /// The field to aggregate over when a query does not name one.
    pub fn geometry_field(&self) -> Option<&FieldDescriptor> {
        if let Some(default) = &self.default_geometry {
            return self.field(default);
        }
        self.fields.iter().find(|f| f.kind.is_geometry())
    }
}

/// Build a schema from a configured attribute list.
///
/// Deterministic: identical input produces identical output, in input order.
pub fn build(attributes: &[Attribute], type_name: &str) -> FeatureSchema {
    let mut fields = Vec::new();
    let mut default_geometry: Option<String> = None;
    let mut conflicting_defaults = false;

    for attribute in attributes {
        if !attribute.use_in_schema {
            continue;
        }
        let name = attribute.display_name().to_string();

        let crs = if attribute.kind.is_geometry() {
            let resolved = attribute.srid.and_then(Crs::from_epsg);
            if resolved.is_none() {
                warn!(
                    attribute = %attribute.name,
                    srid = ?attribute.srid,
                    "unable to resolve CRS, skipping attribute"
                );
                continue;
            }
            if attribute.is_default_geometry() {
                if default_geometry.is_some() {
                    conflicting_defaults = true;
                }
                default_geometry = Some(name.clone());
            }
            resolved
        } else {
            None
        };

        fields.push(FieldDescriptor {
            name,
            source_path: attribute.name.clone(),
            kind: attribute.kind,
            crs,
            geometry_kind: attribute.geometry_kind,
            analyzed: attribute.analyzed,
            nested: attribute.nested,
            stored: attribute.stored,
            date_formats: attribute.date_formats.clone(),
        });
    }

    // never guess a default geometry: zero or conflicting claims leave it unset
    if conflicting_defaults {
        warn!(type_name, "conflicting default geometry declarations, leaving unset");
        default_geometry = None;
    }

    FeatureSchema {
        type_name: type_name.to_string(),
        fields,
        default_geometry,
    }
}
