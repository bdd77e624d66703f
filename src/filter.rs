//! Filter expression tree and its local evaluation.
//!
//! The tree is the input the translator consumes; evaluation is the
//! post-filter pass applied when a filter is only partially supported by the
//! native query language. Evaluation and translation must agree: a feature
//! accepted here is the ground truth for what the query means.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::geom::{haversine_distance_m, Envelope, Geometry, Point};
use crate::model::{Feature, FieldValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// A host predicate with no native equivalent. Translation degrades to
/// match-all and the predicate runs locally in the post-filter.
#[derive(Clone)]
pub struct LocalPredicate(Arc<dyn Fn(&Feature) -> bool + Send + Sync>);

impl LocalPredicate {
    pub fn new(f: impl Fn(&Feature) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn matches(&self, feature: &Feature) -> bool {
        (self.0)(feature)
    }
}

impl fmt::Debug for LocalPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LocalPredicate")
    }
}

/// Filter expression tree.
#[derive(Debug, Clone)]
pub enum Filter {
    IncludeAll,
    ExcludeAll,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// Property comparison against a literal.
    Compare {
        property: String,
        op: ComparisonOp,
        value: Value,
    },
    /// Inclusive range test.
    Between {
        property: String,
        lower: Value,
        upper: Value,
    },
    /// Wildcard pattern match: `*` matches any run, `?` one character.
    Like {
        property: String,
        pattern: String,
    },
    IsNull {
        property: String,
    },
    /// Identifier membership.
    IdIn(Vec<String>),
    /// Geometry envelope overlap.
    Bbox {
        property: String,
        envelope: Envelope,
    },
    /// Geometry envelope intersection with an arbitrary envelope-bounded
    /// shape. Local semantics are envelope overlap.
    Intersects {
        property: String,
        envelope: Envelope,
    },
    /// Great-circle within-distance test against a center point, in meters.
    /// Shapes measure to the nearest point of their envelope.
    DWithin {
        property: String,
        center: Point,
        distance_m: f64,
    },
    /// Opaque host predicate; always forces post-filtering.
    Unsupported {
        label: String,
        predicate: LocalPredicate,
    },
}

impl Filter {
    /// Evaluate against a reconstructed feature. Absent values never match
    /// except through `IsNull` and negations.
    pub fn evaluate(&self, feature: &Feature) -> bool {
        match self {
            Filter::IncludeAll => true,
            Filter::ExcludeAll => false,
            Filter::And(children) => children.iter().all(|c| c.evaluate(feature)),
            Filter::Or(children) => children.iter().any(|c| c.evaluate(feature)),
            Filter::Not(inner) => !inner.evaluate(feature),
            Filter::Compare {
                property,
                op,
                value,
            } => feature
                .get(property)
                .map(|actual| compare(actual, *op, value))
                .unwrap_or(false),
            Filter::Between {
                property,
                lower,
                upper,
            } => feature
                .get(property)
                .map(|actual| {
                    compare(actual, ComparisonOp::Gte, lower)
                        && compare(actual, ComparisonOp::Lte, upper)
                })
                .unwrap_or(false),
            Filter::Like { property, pattern } => feature
                .get(property)
                .and_then(FieldValue::as_str)
                .map(|s| wildcard_match(pattern, s))
                .unwrap_or(false),
            Filter::IsNull { property } => feature.get(property).is_none(),
            Filter::IdIn(ids) => ids.iter().any(|id| id == &feature.id),
            Filter::Bbox { property, envelope }
            | Filter::Intersects { property, envelope } => feature
                .get(property)
                .and_then(FieldValue::as_geometry)
                .map(|g| envelope.intersects(&g.envelope()))
                .unwrap_or(false),
            Filter::DWithin {
                property,
                center,
                distance_m,
            } => feature
                .get(property)
                .and_then(FieldValue::as_geometry)
                .map(|g| within_distance(*center, *distance_m, g))
                .unwrap_or(false),
            Filter::Unsupported { predicate, .. } => predicate.matches(feature),
        }
    }

    /// Spatial bound of the filter, if any. `None` means unbounded; callers
    /// assume the whole world.
    pub fn envelope(&self) -> Option<Envelope> {
        match self {
            Filter::And(children) => {
                let mut acc: Option<Envelope> = None;
                for child in children {
                    if let Some(e) = child.envelope() {
                        acc = Some(match acc {
                            // a degenerate intersection still bounds the query
                            Some(prev) => prev.intersection(&e).unwrap_or(e),
                            None => e,
                        });
                    }
                }
                acc
            }
            Filter::Or(children) => {
                let mut acc: Option<Envelope> = None;
                for child in children {
                    let e = child.envelope()?;
                    acc = Some(match acc {
                        Some(prev) => prev.union(&e),
                        None => e,
                    });
                }
                acc
            }
            Filter::Bbox { envelope, .. } | Filter::Intersects { envelope, .. } => Some(*envelope),
            Filter::DWithin {
                center, distance_m, ..
            } => Some(dwithin_envelope(*center, *distance_m)),
            _ => None,
        }
    }
}

/// Haversine distance test. Points measure exactly; shapes measure to the
/// nearest point of their envelope, so a shape is never rejected while any
/// part of its bound lies inside the circle.
fn within_distance(center: Point, distance_m: f64, geometry: &Geometry) -> bool {
    let target = match geometry {
        Geometry::Point(p) => *p,
        Geometry::Shape { envelope, .. } => Point::new(
            center.x.clamp(envelope.min_x, envelope.max_x),
            center.y.clamp(envelope.min_y, envelope.max_y),
        ),
    };
    haversine_distance_m(center, target) <= distance_m
}

/// Approximate envelope of a within-distance test, in degrees.
pub(crate) fn dwithin_envelope(center: Point, distance_m: f64) -> Envelope {
    // one degree of latitude is ~111.32 km; good enough for an envelope
    let degrees = distance_m / 111_320.0;
    Envelope::new(
        center.x - degrees,
        center.y - degrees,
        center.x + degrees,
        center.y + degrees,
    )
    .clamped_to_world()
}

fn compare(actual: &FieldValue, op: ComparisonOp, literal: &Value) -> bool {
    // numeric (and date-as-millis) comparison when both sides coerce
    if let (Some(a), Some(b)) = (actual.as_f64(), literal_as_f64(actual, literal)) {
        return match op {
            ComparisonOp::Eq => a == b,
            ComparisonOp::Neq => a != b,
            ComparisonOp::Lt => a < b,
            ComparisonOp::Lte => a <= b,
            ComparisonOp::Gt => a > b,
            ComparisonOp::Gte => a >= b,
        };
    }
    match (actual, literal) {
        (FieldValue::String(a), Value::String(b)) => match op {
            ComparisonOp::Eq => a == b,
            ComparisonOp::Neq => a != b,
            ComparisonOp::Lt => a < b,
            ComparisonOp::Lte => a <= b,
            ComparisonOp::Gt => a > b,
            ComparisonOp::Gte => a >= b,
        },
        (FieldValue::Boolean(a), Value::Bool(b)) => match op {
            ComparisonOp::Eq => a == b,
            ComparisonOp::Neq => a != b,
            _ => false,
        },
        _ => false,
    }
}

fn literal_as_f64(actual: &FieldValue, literal: &Value) -> Option<f64> {
    if let Some(n) = literal.as_f64() {
        return Some(n);
    }
    // date fields compare against ISO literals as epoch millis
    if matches!(actual, FieldValue::Date(_)) {
        if let Some(s) = literal.as_str() {
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp_millis() as f64);
            }
        }
    }
    None
}

/// Glob-style match supporting `*` and `?`.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    // iterative backtracking over the last star position
    let (mut pi, mut ti) = (0usize, 0usize);
    let (mut star, mut star_ti) = (None::<usize>, 0usize);
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Geometry;
    use serde_json::json;

    fn feature(values: Vec<(&str, FieldValue)>) -> Feature {
        let mut f = Feature::new("f.1");
        for (k, v) in values {
            f.values.insert(k.to_string(), v);
        }
        f
    }

    #[test]
    fn comparisons_coerce_across_numeric_types() {
        let f = feature(vec![("n", FieldValue::Long(42))]);
        let gt = Filter::Compare {
            property: "n".into(),
            op: ComparisonOp::Gt,
            value: json!(41.5),
        };
        assert!(gt.evaluate(&f));
        let eq = Filter::Compare {
            property: "n".into(),
            op: ComparisonOp::Eq,
            value: json!(42),
        };
        assert!(eq.evaluate(&f));
    }

    #[test]
    fn absent_values_fail_comparisons_but_satisfy_is_null() {
        let f = feature(vec![]);
        let cmp = Filter::Compare {
            property: "missing".into(),
            op: ComparisonOp::Eq,
            value: json!(1),
        };
        assert!(!cmp.evaluate(&f));
        let null = Filter::IsNull {
            property: "missing".into(),
        };
        assert!(null.evaluate(&f));
    }

    #[test]
    fn wildcard_patterns() {
        let f = feature(vec![("s", FieldValue::String("portland".into()))]);
        let like = |pattern: &str| Filter::Like {
            property: "s".into(),
            pattern: pattern.into(),
        };
        assert!(like("port*").evaluate(&f));
        assert!(like("*land").evaluate(&f));
        assert!(like("p?rtland").evaluate(&f));
        assert!(!like("seattle*").evaluate(&f));
    }

    #[test]
    fn bbox_matches_point_geometry() {
        let f = feature(vec![(
            "geom",
            FieldValue::Geometry(Geometry::Point(Point::new(-122.6, 45.5))),
        )]);
        let inside = Filter::Bbox {
            property: "geom".into(),
            envelope: Envelope::new(-123.0, 45.0, -122.0, 46.0),
        };
        let outside = Filter::Bbox {
            property: "geom".into(),
            envelope: Envelope::new(0.0, 0.0, 1.0, 1.0),
        };
        assert!(inside.evaluate(&f));
        assert!(!outside.evaluate(&f));
    }

    #[test]
    fn dwithin_is_a_circle_not_its_bounding_square() {
        let dwithin = |x: f64, y: f64| {
            let f = feature(vec![(
                "geom",
                FieldValue::Geometry(Geometry::Point(Point::new(x, y))),
            )]);
            Filter::DWithin {
                property: "geom".into(),
                center: Point::new(0.0, 0.0),
                distance_m: 111_320.0,
            }
            .evaluate(&f)
        };
        assert!(dwithin(0.9, 0.0));
        assert!(dwithin(0.0, -0.9));
        // inside the bounding square of the radius but outside the circle
        assert!(!dwithin(0.9, 0.9));
        assert!(!dwithin(1.5, 0.0));
    }

    #[test]
    fn dwithin_measures_shapes_by_their_nearest_envelope_point() {
        let shape = |envelope: Envelope| {
            feature(vec![(
                "geom",
                FieldValue::Geometry(Geometry::Shape {
                    geojson: json!({"type": "Polygon"}),
                    envelope,
                }),
            )])
        };
        let within = Filter::DWithin {
            property: "geom".into(),
            center: Point::new(0.0, 0.0),
            distance_m: 111_320.0,
        };
        assert!(within.evaluate(&shape(Envelope::new(0.5, -0.1, 3.0, 0.1))));
        assert!(!within.evaluate(&shape(Envelope::new(2.0, 2.0, 3.0, 3.0))));
    }

    #[test]
    fn logical_combinators() {
        let f = feature(vec![("n", FieldValue::Integer(5))]);
        let gt3 = Filter::Compare {
            property: "n".into(),
            op: ComparisonOp::Gt,
            value: json!(3),
        };
        let lt4 = Filter::Compare {
            property: "n".into(),
            op: ComparisonOp::Lt,
            value: json!(4),
        };
        assert!(Filter::And(vec![gt3.clone(), Filter::Not(Box::new(lt4.clone()))]).evaluate(&f));
        assert!(Filter::Or(vec![lt4, gt3]).evaluate(&f));
        assert!(!Filter::ExcludeAll.evaluate(&f));
    }

    #[test]
    fn id_membership() {
        let f = feature(vec![]);
        assert!(Filter::IdIn(vec!["f.1".into(), "f.2".into()]).evaluate(&f));
        assert!(!Filter::IdIn(vec!["f.9".into()]).evaluate(&f));
    }

    #[test]
    fn envelope_extraction_intersects_under_and_unions_under_or() {
        let a = Filter::Bbox {
            property: "g".into(),
            envelope: Envelope::new(0.0, 0.0, 10.0, 10.0),
        };
        let b = Filter::Bbox {
            property: "g".into(),
            envelope: Envelope::new(5.0, 5.0, 15.0, 15.0),
        };
        let and = Filter::And(vec![a.clone(), b.clone()]);
        assert_eq!(and.envelope(), Some(Envelope::new(5.0, 5.0, 10.0, 10.0)));
        let or = Filter::Or(vec![a, b]);
        assert_eq!(or.envelope(), Some(Envelope::new(0.0, 0.0, 15.0, 15.0)));
        // a non-spatial sibling leaves an Or unbounded
        let mixed = Filter::Or(vec![
            Filter::IncludeAll,
            Filter::Bbox {
                property: "g".into(),
                envelope: Envelope::new(0.0, 0.0, 1.0, 1.0),
            },
        ]);
        assert_eq!(mixed.envelope(), None);
    }

    #[test]
    fn dates_compare_against_iso_literals() {
        use chrono::TimeZone;
        let dt = chrono::Utc.timestamp_millis_opt(1_600_000_000_000).unwrap();
        let f = feature(vec![("when", FieldValue::Date(dt))]);
        let after = Filter::Compare {
            property: "when".into(),
            op: ComparisonOp::Gt,
            value: json!("2020-01-01T00:00:00Z"),
        };
        assert!(after.evaluate(&f));
    }
}
