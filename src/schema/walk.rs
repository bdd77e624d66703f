//! Schema-inference walker over nested mapping metadata.
//!
//! Depth-first traversal of the engine's mapping document, accumulating a
//! dotted property path and producing one [`Attribute`] per recognizable
//! leaf. Leaves with types the model cannot express are dropped silently;
//! that is intentional, not an error.

use serde_json::{Map, Value};
use tracing::debug;

use crate::model::{Attribute, AttributeType, GeometryKind};
use crate::schema::dates::{DateFormatter, DEFAULT_DATE_FORMAT};

/// Synthetic attribute names present in every walk result. They carry result
/// metadata (identifier, index, type, relevance score) plus the binary
/// aggregation payload used for bucket results.
pub const ID_FIELD: &str = "_id";
pub const INDEX_FIELD: &str = "_index";
pub const TYPE_FIELD: &str = "_type";
pub const SCORE_FIELD: &str = "_score";
pub const AGGREGATION_FIELD: &str = "_aggregation";

/// Walk a mapping document and return the inferred attribute list.
///
/// The synthetic attributes are always present and come first, regardless of
/// mapping content; an empty mapping yields only those.
pub fn walk(mapping: &Map<String, Value>) -> Vec<Attribute> {
    let mut attributes = synthetic_attributes();
    walk_into(&mut attributes, mapping, "", false, false);
    attributes
}

fn synthetic_attributes() -> Vec<Attribute> {
    let mut score = Attribute::new(SCORE_FIELD, AttributeType::Float);
    score.use_in_schema = true;
    vec![
        Attribute::new(ID_FIELD, AttributeType::String),
        Attribute::new(INDEX_FIELD, AttributeType::String),
        Attribute::new(TYPE_FIELD, AttributeType::String),
        score,
        Attribute::new(AGGREGATION_FIELD, AttributeType::Binary),
    ]
}

fn walk_into(
    out: &mut Vec<Attribute>,
    map: &Map<String, Value>,
    prefix: &str,
    seen_properties: bool,
    nested: bool,
) {
    // nesting is decided once per subtree root and only propagates downward
    let nested = nested
        || map.get("type").and_then(Value::as_str) == Some("nested");

    for (key, value) in map {
        match value {
            Value::Object(child) if key != "_timestamp" => {
                // a synthetic `properties` group is structural, not a field
                let unwraps_properties = !seen_properties && key == "properties";
                let child_prefix = if unwraps_properties {
                    prefix.to_string()
                } else {
                    join_path(prefix, key)
                };

                if is_geo_point_shape(child) {
                    // collapse the whole container into a single point leaf
                    add_leaf(
                        out,
                        &format!("{child_prefix}.coordinates"),
                        "geo_point",
                        child,
                        nested,
                    );
                } else {
                    walk_into(out, child, &child_prefix, unwraps_properties, nested);
                }
            }
            _ if key == "_timestamp" => {
                add_leaf(out, "_timestamp", "date", map, nested);
            }
            _ if key == "type" => {
                if let Some(type_name) = value.as_str() {
                    if type_name != "nested" && !prefix.is_empty() {
                        add_leaf(out, prefix, type_name, map, nested);
                    }
                }
            }
            _ => {}
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// A container shaped like an engine geo point: numeric `lat`/`lon` leaves,
/// directly or under a `properties` group.
fn is_geo_point_shape(map: &Map<String, Value>) -> bool {
    let candidate = match map.get("properties") {
        Some(Value::Object(props)) => props,
        _ => map,
    };
    let numeric_leaf = |name: &str| {
        candidate
            .get(name)
            .and_then(Value::as_object)
            .and_then(|leaf| leaf.get("type"))
            .and_then(Value::as_str)
            .map(|t| matches!(t, "float" | "double" | "integer" | "long"))
            .unwrap_or(false)
    };
    numeric_leaf("lat") && numeric_leaf("lon")
}

fn add_leaf(
    out: &mut Vec<Attribute>,
    path: &str,
    type_name: &str,
    map: &Map<String, Value>,
    nested: bool,
) {
    let mut attribute = match type_name {
        "geo_point" => {
            let mut a = Attribute::new(path, AttributeType::GeoPoint);
            a.srid = Some(4326);
            a.geometry_kind = Some(GeometryKind::Point);
            a
        }
        "geo_shape" => {
            let mut a = Attribute::new(path, AttributeType::GeoShape);
            a.srid = Some(4326);
            a.geometry_kind = Some(GeometryKind::Shape);
            a
        }
        "string" | "keyword" | "text" => {
            let mut a = Attribute::new(path, AttributeType::String);
            a.analyzed = type_name == "text";
            a
        }
        "integer" | "short" | "byte" => Attribute::new(path, AttributeType::Integer),
        "long" => Attribute::new(path, AttributeType::Long),
        "float" | "half_float" => Attribute::new(path, AttributeType::Float),
        "double" => Attribute::new(path, AttributeType::Double),
        "boolean" => Attribute::new(path, AttributeType::Boolean),
        "date" => {
            let mut a = Attribute::new(path, AttributeType::Date);
            a.date_formats = resolve_date_formats(path, map);
            a
        }
        "binary" => Attribute::new(path, AttributeType::Binary),
        other => {
            debug!(path, leaf_type = other, "dropping unmappable mapping leaf");
            return;
        }
    };

    attribute.stored = map.get("store").and_then(Value::as_bool).unwrap_or(false);
    attribute.nested = nested;
    out.push(attribute);
}

/// Resolve the `format` declaration of a date leaf on a `||`-delimited
/// basis. Invalid candidates are dropped with a diagnostic; an empty result
/// falls back to the generic default.
fn resolve_date_formats(path: &str, map: &Map<String, Value>) -> Vec<String> {
    let declared = map.get("format").and_then(Value::as_str);
    let mut valid = Vec::new();
    if let Some(declared) = declared {
        for candidate in declared.split("||") {
            let candidate = candidate.trim();
            if candidate.is_empty() {
                continue;
            }
            match DateFormatter::for_format(candidate) {
                Ok(_) => valid.push(candidate.to_string()),
                Err(_) => {
                    debug!(path, format = candidate, "unable to parse date format");
                }
            }
        }
    }
    if valid.is_empty() {
        valid.push(DEFAULT_DATE_FORMAT.to_string());
    }
    valid
}
