//! Minimal geometry values for WGS84 features.
//!
//! Only what the filter/aggregation paths need: points, axis-aligned
//! envelopes and opaque GeoJSON shapes with a computed envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Valid longitude range.
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Valid latitude range.
pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;

/// A WGS84 position. `x` is longitude, `y` is latitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding envelope in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    /// The whole-world envelope assumed when a query carries no spatial bound.
    pub const WORLD: Envelope = Envelope {
        min_x: MIN_LON,
        min_y: MIN_LAT,
        max_x: MAX_LON,
        max_y: MAX_LAT,
    };

    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// A degenerate envelope around a single point.
    pub fn from_point(p: Point) -> Self {
        Self::new(p.x, p.y, p.x, p.y)
    }

    pub fn width(&self) -> f64 {
        (self.max_x - self.min_x).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.max_y - self.min_y).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Grow to include `other`.
    pub fn expand_to_include(&mut self, other: &Envelope) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    /// Intersection with `other`, if any.
    pub fn intersection(&self, other: &Envelope) -> Option<Envelope> {
        if !self.intersects(other) {
            return None;
        }
        Some(Envelope::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        ))
    }

    /// Union with `other`.
    pub fn union(&self, other: &Envelope) -> Envelope {
        let mut e = *self;
        e.expand_to_include(other);
        e
    }

    /// Clamp to valid WGS84 bounds.
    pub fn clamped_to_world(&self) -> Envelope {
        Envelope::new(
            self.min_x.max(MIN_LON),
            self.min_y.max(MIN_LAT),
            self.max_x.min(MAX_LON),
            self.max_y.min(MAX_LAT),
        )
    }

    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
    }
}

/// A decoded geometry value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Point),
    /// Opaque GeoJSON shape with its envelope precomputed for local
    /// filter evaluation.
    Shape {
        geojson: Value,
        envelope: Envelope,
    },
}

impl Geometry {
    pub fn envelope(&self) -> Envelope {
        match self {
            Geometry::Point(p) => Envelope::from_point(*p),
            Geometry::Shape { envelope, .. } => *envelope,
        }
    }
}

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two lon/lat points, in meters (haversine).
pub fn haversine_distance_m(a: Point, b: Point) -> f64 {
    let lat_a = a.y.to_radians();
    let lat_b = b.y.to_radians();
    let d_lat = (b.y - a.y).to_radians();
    let d_lon = (b.x - a.x).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Decode a geo-point field value. The engine accepts three encodings:
/// a `"lat,lon"` string, a `[lon, lat]` array, and a `{lat, lon}` object.
pub fn geo_point_from_value(value: &Value) -> Option<Point> {
    match value {
        Value::String(s) => {
            let (lat, lon) = s.split_once(',')?;
            let lat: f64 = lat.trim().parse().ok()?;
            let lon: f64 = lon.trim().parse().ok()?;
            Some(Point::new(lon, lat))
        }
        Value::Array(items) => {
            if items.len() < 2 {
                return None;
            }
            let lon = items[0].as_f64()?;
            let lat = items[1].as_f64()?;
            Some(Point::new(lon, lat))
        }
        Value::Object(map) => {
            let lat = map.get("lat")?.as_f64()?;
            let lon = map.get("lon")?.as_f64()?;
            Some(Point::new(lon, lat))
        }
        _ => None,
    }
}

/// Decode a geo-shape field value from its GeoJSON representation.
pub fn geo_shape_from_value(value: &Value) -> Option<Geometry> {
    let map = value.as_object()?;
    if let Some(coords) = map.get("coordinates") {
        let mut envelope: Option<Envelope> = None;
        fold_coordinates(coords, &mut envelope);
        let envelope = envelope?;
        // GeoJSON point shapes collapse to plain points
        if map.get("type").and_then(Value::as_str) == Some("Point") {
            return Some(Geometry::Point(Point::new(envelope.min_x, envelope.min_y)));
        }
        return Some(Geometry::Shape {
            geojson: value.clone(),
            envelope,
        });
    }
    // geometry collections carry their members under "geometries"
    if let Some(Value::Array(members)) = map.get("geometries") {
        let mut envelope: Option<Envelope> = None;
        for member in members {
            if let Some(geom) = geo_shape_from_value(member) {
                let e = geom.envelope();
                match envelope.as_mut() {
                    Some(acc) => acc.expand_to_include(&e),
                    None => envelope = Some(e),
                }
            }
        }
        return Some(Geometry::Shape {
            geojson: value.clone(),
            envelope: envelope?,
        });
    }
    None
}

fn fold_coordinates(value: &Value, envelope: &mut Option<Envelope>) {
    match value {
        Value::Array(items) => {
            if items.len() >= 2 && items[0].is_number() && items[1].is_number() {
                if let (Some(x), Some(y)) = (items[0].as_f64(), items[1].as_f64()) {
                    let e = Envelope::from_point(Point::new(x, y));
                    match envelope.as_mut() {
                        Some(acc) => acc.expand_to_include(&e),
                        None => *envelope = Some(e),
                    }
                }
            } else {
                for item in items {
                    fold_coordinates(item, envelope);
                }
            }
        }
        _ => {}
    }
}
