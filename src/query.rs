//! Declarative query descriptor consumed by the translator.

use crate::filter::Filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

/// One sort key. `property: None` states the natural order used as a
/// tie-break rather than a field sort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub property: Option<String>,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn ascending(property: impl Into<String>) -> Self {
        Self {
            property: Some(property.into()),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(property: impl Into<String>) -> Self {
        Self {
            property: Some(property.into()),
            direction: SortDirection::Descending,
        }
    }

    pub fn natural(direction: SortDirection) -> Self {
        Self {
            property: None,
            direction,
        }
    }
}

/// Free-form aggregation override payload carried by a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationHint {
    /// Native aggregation definition (JSON object string).
    pub aggregation_definition: Option<String>,
    /// Native query definition AND-ed with the translated filter.
    pub query_definition: Option<String>,
}

/// Declarative query over one feature type.
#[derive(Debug, Clone, Default)]
pub struct FeatureQuery {
    pub filter: Option<Filter>,
    pub sort: Vec<SortKey>,
    /// Projected property names; `None` means all properties.
    pub properties: Option<Vec<String>>,
    pub start_index: Option<usize>,
    pub max_features: Option<usize>,
    pub aggregation: Option<AggregationHint>,
}

impl FeatureQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortKey>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_properties(mut self, properties: Vec<String>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn with_start_index(mut self, start: usize) -> Self {
        self.start_index = Some(start);
        self
    }

    pub fn with_max_features(mut self, max: usize) -> Self {
        self.max_features = Some(max);
        self
    }

    pub fn with_aggregation(mut self, hint: AggregationHint) -> Self {
        self.aggregation = Some(hint);
        self
    }

    pub fn is_aggregation(&self) -> bool {
        self.aggregation.is_some()
    }
}
