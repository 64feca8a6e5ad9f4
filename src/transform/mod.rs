//! Structural date transform
//!
//! Walks a `Document` with an explicit work stack, copies every reachable
//! container exactly once, and rewrites values stored under the configured
//! date fields into `YYYY-MM-DD HH:mm:ss` in the configured zone.

pub mod date;
pub mod engine;
pub mod fields;
pub mod options;

pub use engine::{convert_date_fields, DateTransformer};
pub use fields::{clear_field_set_cache, FieldSet, FieldSetCache};
pub use options::{TransformOptions, DEFAULT_FIELD_NAMES, DEFAULT_ZONE};
