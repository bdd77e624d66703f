//! Schema inference: mapping walker, date-format capability, and the
//! feature type builder.

pub mod builder;
pub mod dates;
pub mod walk;

pub use builder::{build, Crs, FeatureSchema, FieldDescriptor};
pub use dates::{DateFormatter, DEFAULT_DATE_FORMAT};
pub use walk::{walk, AGGREGATION_FIELD, ID_FIELD, INDEX_FIELD, SCORE_FIELD, TYPE_FIELD};
