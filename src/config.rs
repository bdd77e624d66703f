//! Store-level configuration.

use std::time::Duration;

/// Fallback page size when a query requests unlimited results.
pub const DEFAULT_MAX_FEATURES: usize = 1000;

/// Page size used for cursor streaming when none is configured.
pub const DEFAULT_SCROLL_SIZE: u64 = 20;

/// Keep-alive for server-side cursors between fetches.
pub const DEFAULT_SCROLL_TTL: Duration = Duration::from_secs(120);

/// Target cell count for grid aggregations.
pub const DEFAULT_GRID_SIZE: u64 = 10_000;

/// Density threshold controlling grid precision scaling.
pub const DEFAULT_GRID_THRESHOLD: f64 = 0.05;

/// Behavioral knobs for a [`FeatureStore`](crate::store::FeatureStore).
///
/// All options have working defaults; hosts override the ones their
/// deployment needs.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Restrict returned fields to the projected/usable attribute set.
    /// When disabled every field of each document comes back.
    pub source_filtering_enabled: bool,
    /// Page size when the caller does not cap the result set.
    pub default_max_features: usize,
    /// Whether cursor ("scroll") streaming may be selected at all.
    pub scroll_enabled: bool,
    /// Per-fetch page size in cursor mode.
    pub scroll_size: Option<u64>,
    /// Cursor keep-alive passed on every fetch.
    pub scroll_ttl: Option<Duration>,
    /// Target number of cells for grid aggregations.
    pub grid_size: u64,
    /// Density threshold for grid precision scaling.
    pub grid_threshold: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            source_filtering_enabled: false,
            default_max_features: DEFAULT_MAX_FEATURES,
            scroll_enabled: false,
            scroll_size: None,
            scroll_ttl: None,
            grid_size: DEFAULT_GRID_SIZE,
            grid_threshold: DEFAULT_GRID_THRESHOLD,
        }
    }
}

impl StoreConfig {
    pub fn effective_scroll_size(&self) -> u64 {
        self.scroll_size.unwrap_or(DEFAULT_SCROLL_SIZE)
    }

    pub fn effective_scroll_ttl(&self) -> Duration {
        self.scroll_ttl.unwrap_or(DEFAULT_SCROLL_TTL)
    }
}
