//! Grid-aggregation precision computation.
//!
//! Precision is chosen so the number of geohash cells covering the query
//! envelope tracks the configured target cell count: finer as the envelope
//! shrinks, capped so the cell count never grossly exceeds the target.

use serde_json::Value;

use crate::geom::Envelope;

pub const MIN_PRECISION: u8 = 1;
pub const MAX_PRECISION: u8 = 12;

/// Geohash cell dimensions in degrees at a given precision. Each precision
/// level adds 5 bits, split longitude-first.
fn cell_dims(precision: u8) -> (f64, f64) {
    let bits = 5 * u32::from(precision);
    let lon_bits = (bits + 1) / 2;
    let lat_bits = bits / 2;
    (
        360.0 / (1u64 << lon_bits) as f64,
        180.0 / (1u64 << lat_bits) as f64,
    )
}

/// Number of cells needed to cover `envelope` at `precision`.
fn cells_at(envelope: &Envelope, precision: u8) -> u64 {
    let (cell_w, cell_h) = cell_dims(precision);
    let cols = (envelope.width() / cell_w).ceil().max(1.0);
    let rows = (envelope.height() / cell_h).ceil().max(1.0);
    (cols * rows) as u64
}

/// Compute the grid precision for an aggregation over `envelope`.
///
/// Smallest precision whose estimated cell count reaches `grid_size`, backed
/// off one level when the overshoot exceeds the density threshold. The result
/// is monotonically non-decreasing as the envelope shrinks.
pub fn compute_precision(envelope: &Envelope, grid_size: u64, grid_threshold: f64) -> u8 {
    let envelope = envelope.clamped_to_world();
    let grid_size = grid_size.max(1);
    for precision in MIN_PRECISION..=MAX_PRECISION {
        let cells = cells_at(&envelope, precision);
        if cells >= grid_size {
            if precision > MIN_PRECISION && cells as f64 * grid_threshold > grid_size as f64 {
                return precision - 1;
            }
            return precision;
        }
    }
    MAX_PRECISION
}

/// Set the computed precision on every geohash-grid node of an aggregation
/// document that does not pin its own value.
pub fn update_grid_precision(aggregations: &mut Value, precision: u8) {
    match aggregations {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                if key == "geohash_grid" {
                    if let Value::Object(grid) = value {
                        grid.entry("precision")
                            .or_insert_with(|| Value::from(precision));
                    }
                } else {
                    update_grid_precision(value, precision);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                update_grid_precision(item, precision);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn unit_envelope_precision_is_deterministic() {
        let envelope = Envelope::new(0.0, 0.0, 1.0, 1.0);
        let p1 = compute_precision(&envelope, 100, 0.01);
        let p2 = compute_precision(&envelope, 100, 0.01);
        assert_eq!(p1, p2);
        assert_eq!(p1, 5);
    }

    #[test]
    fn world_envelope_stays_coarse() {
        let world = compute_precision(&Envelope::WORLD, 10_000, 0.05);
        let city = compute_precision(&Envelope::new(-122.7, 45.4, -122.5, 45.6), 10_000, 0.05);
        assert!(world <= city);
    }

    #[test]
    fn precision_never_leaves_valid_range() {
        let tiny = Envelope::new(0.0, 0.0, 1e-9, 1e-9);
        assert!(compute_precision(&tiny, 1_000_000, 0.05) <= MAX_PRECISION);
        assert!(compute_precision(&Envelope::WORLD, 1, 0.05) >= MIN_PRECISION);
    }

    #[test]
    fn pinned_precision_is_preserved_and_missing_is_filled() {
        let mut aggs = json!({
            "pinned": {"geohash_grid": {"field": "geom", "precision": 2}},
            "open": {"geohash_grid": {"field": "geom"}}
        });
        update_grid_precision(&mut aggs, 7);
        assert_eq!(aggs["pinned"]["geohash_grid"]["precision"], json!(2));
        assert_eq!(aggs["open"]["geohash_grid"]["precision"], json!(7));
    }

    proptest! {
        /// Shrinking the envelope never coarsens the grid.
        #[test]
        fn precision_monotone_in_shrinking_envelope(
            width in 0.001f64..360.0,
            height in 0.001f64..180.0,
            shrink in 0.01f64..1.0,
            grid_size in 1u64..100_000,
            threshold in 0.0f64..1.0,
        ) {
            let outer = Envelope::new(-width / 2.0, -height / 2.0, width / 2.0, height / 2.0);
            let inner = Envelope::new(
                -width * shrink / 2.0,
                -height * shrink / 2.0,
                width * shrink / 2.0,
                height * shrink / 2.0,
            );
            let coarse = compute_precision(&outer, grid_size, threshold);
            let fine = compute_precision(&inner, grid_size, threshold);
            prop_assert!(fine >= coarse);
        }
    }
}
