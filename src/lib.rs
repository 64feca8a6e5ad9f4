//! # Datecast - Date Field Localization for API Payloads
//!
//! Rewrites timestamp fields anywhere in a JSON-like payload into a canonical
//! `YYYY-MM-DD HH:mm:ss` string in a chosen timezone, without disturbing the
//! rest of the payload.
//!
//! ## Modules
//!
//! - **document**: arena-backed payload model with shared and cyclic containers
//! - **transform**: the date transform, its options and its field set cache
//! - **envelope**: `{code, message, data}` success and failure bodies
//!
//! ## Quick Start
//!
//! ```rust
//! use datecast::{convert_date_fields, Document, TransformOptions};
//! use serde_json::json;
//!
//! let payload = Document::from_json(json!({
//!     "id": 1,
//!     "createdAt": "2023-07-08T12:34:56Z",
//!     "tags": ["a", "b"]
//! }));
//!
//! let options = TransformOptions::default().with_zone(chrono_tz::UTC);
//! let converted = convert_date_fields(&payload, &options);
//!
//! assert_eq!(
//!     converted.to_json().unwrap(),
//!     json!({"id": 1, "createdAt": "2023-07-08 12:34:56", "tags": ["a", "b"]})
//! );
//! ```
//!
//! ### Response envelopes
//!
//! ```rust
//! use datecast::envelope::{ok, Reply};
//! use datecast::Document;
//! use serde_json::json;
//!
//! let body = ok(Reply::new().data(Document::from_json(json!({
//!     "updatedAt": "2023-07-08T12:34:56Z"
//! }))));
//!
//! // Default zone is Asia/Shanghai
//! assert_eq!(
//!     serde_json::to_value(&body).unwrap(),
//!     json!({"code": 0, "message": "success", "data": {"updatedAt": "2023-07-08 20:34:56"}})
//! );
//! ```

use anyhow::{Context, Result};
use std::io::{BufRead, Write};

pub mod document;
pub mod envelope;
pub mod error;
pub mod transform;

// Re-export commonly used types for convenience
pub use document::{Document, Fields, Node, NodeId, OpaqueValue, Value};
pub use envelope::{fail, ok, Envelope, Reply};
pub use error::{ConfigError, DocumentError};
pub use transform::{
    clear_field_set_cache, convert_date_fields, DateTransformer, FieldSet, FieldSetCache,
    TransformOptions,
};

/// Convert a newline-delimited JSON stream, one output line per input record.
///
/// Blank lines are skipped. Returns the number of records written.
pub fn convert_json_stream<R: BufRead, W: Write>(
    reader: R,
    writer: &mut W,
    options: &TransformOptions,
) -> Result<usize> {
    let transformer = DateTransformer::new(options.clone());
    let mut count = 0;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read line")?;
        if line.trim().is_empty() {
            continue;
        }

        let value: serde_json::Value = serde_json::from_str(&line)
            .with_context(|| format!("Failed to parse JSON on line {}", line_no + 1))?;
        let document = Document::from_json(value);
        let converted = transformer.transform(&document);

        converted
            .write_json(&mut *writer)
            .context("Failed to write record")?;
        writeln!(writer).context("Failed to write record")?;
        count += 1;
    }

    Ok(count)
}
