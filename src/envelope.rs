//! `{code, message, data}` response envelopes
//!
//! `ok` runs its payload through the date transform before attaching it,
//! `fail` attaches its payload untouched.

use std::borrow::Cow;
use std::io;

use serde::Serialize;

use crate::document::Document;
use crate::error::DocumentError;
use crate::transform::{DateTransformer, FieldSetCache, TransformOptions};

pub const OK_MESSAGE: &str = "success";
pub const OK_CODE: i64 = 0;
pub const FAIL_MESSAGE: &str = "fail";
pub const FAIL_CODE: i64 = 400;

/// Everything a caller may put into an envelope. Unset fields take the
/// defaults of whichever builder consumes the reply.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    message: Option<String>,
    code: Option<i64>,
    data: Option<Document>,
    options: TransformOptions,
}

impl Reply {
    pub fn new() -> Self {
        Reply::default()
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn data(mut self, data: Document) -> Self {
        self.data = Some(data);
        self
    }

    /// Transform options used by `ok`; ignored by `fail`
    pub fn options(mut self, options: TransformOptions) -> Self {
        self.options = options;
        self
    }
}

impl From<&str> for Reply {
    fn from(message: &str) -> Self {
        Reply::new().message(message)
    }
}

impl From<String> for Reply {
    fn from(message: String) -> Self {
        Reply::new().message(message)
    }
}

/// A finished response body
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Document>,
}

impl Envelope {
    /// Write the envelope as compact JSON text, with no depth limit on `data`
    pub fn write_json<W: io::Write>(&self, mut writer: W) -> Result<(), DocumentError> {
        write!(writer, "{{\"code\":{},\"message\":", self.code)?;
        serde_json::to_writer(&mut writer, &self.message).map_err(io::Error::from)?;
        if let Some(data) = &self.data {
            writer.write_all(b",\"data\":")?;
            data.write_json(&mut writer)?;
        }
        writer.write_all(b"}")?;
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String, DocumentError> {
        let mut buf = Vec::new();
        self.write_json(&mut buf)?;
        String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
    }
}

/// Build a success envelope, converting date fields through the global cache
pub fn ok(reply: impl Into<Reply>) -> Envelope {
    ok_with_cache(reply, FieldSetCache::global())
}

/// Build a success envelope, converting date fields through `cache`
pub fn ok_with_cache(reply: impl Into<Reply>, cache: &FieldSetCache) -> Envelope {
    let reply = reply.into();
    let data = match reply.data {
        Some(doc) if !doc.root().is_null() => {
            let transformer = DateTransformer::with_cache(reply.options, cache);
            Some(convert_owned(&transformer, doc))
        }
        _ => None,
    };

    Envelope {
        code: reply.code.unwrap_or(OK_CODE),
        message: message_or(reply.message, OK_MESSAGE),
        data,
    }
}

/// Build a failure envelope. Data is attached exactly as given.
pub fn fail(reply: impl Into<Reply>) -> Envelope {
    let reply = reply.into();
    Envelope {
        code: reply.code.unwrap_or(FAIL_CODE),
        message: message_or(reply.message, FAIL_MESSAGE),
        data: reply.data.filter(|doc| !doc.root().is_null()),
    }
}

/// An unset or empty message falls back to `default`
fn message_or(message: Option<String>, default: &str) -> String {
    message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn convert_owned(transformer: &DateTransformer, doc: Document) -> Document {
    if let Cow::Owned(converted) = transformer.transform(&doc) {
        return converted;
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Value;
    use serde_json::json;

    fn records() -> Document {
        Document::from_json(json!([
            {"id": 1, "createdAt": "2023-07-08T12:34:56Z"},
            {"id": 2, "updatedAt": 1_688_819_696_000i64}
        ]))
    }

    #[test]
    fn test_ok_with_message_only() {
        let envelope = ok("Operation successful");

        assert_eq!(envelope.code, 0);
        assert_eq!(envelope.message, "Operation successful");
        assert!(envelope.data.is_none());
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"code": 0, "message": "Operation successful"})
        );
    }

    #[test]
    fn test_ok_defaults() {
        let envelope = ok(Reply::new());
        assert_eq!(envelope.code, OK_CODE);
        assert_eq!(envelope.message, OK_MESSAGE);
    }

    #[test]
    fn test_ok_converts_data() {
        let envelope = ok(Reply::new().data(records()).code(201));

        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "code": 201,
                "message": "success",
                "data": [
                    {"id": 1, "createdAt": "2023-07-08 20:34:56"},
                    {"id": 2, "updatedAt": "2023-07-08 20:34:56"}
                ]
            })
        );
    }

    #[test]
    fn test_ok_respects_options() {
        let options = TransformOptions::default()
            .with_zone(chrono_tz::UTC)
            .with_field_names(["createdAt"]);
        let envelope = ok(Reply::from("done").data(records()).options(options));

        assert_eq!(
            envelope.data.unwrap().to_json().unwrap(),
            json!([
                {"id": 1, "createdAt": "2023-07-08 12:34:56"},
                {"id": 2, "updatedAt": 1_688_819_696_000i64}
            ])
        );
    }

    #[test]
    fn test_ok_with_conversion_disabled_keeps_data() {
        let options = TransformOptions::default().with_enabled(false);
        let envelope = ok(Reply::new().data(records()).options(options));

        assert_eq!(
            envelope.data.unwrap().to_json().unwrap(),
            records().to_json().unwrap()
        );
    }

    #[test]
    fn test_null_data_is_omitted() {
        let envelope = ok(Reply::new().data(Document::new()));
        assert!(envelope.data.is_none());

        let envelope = fail(Reply::new().data(Document::new()));
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_scalar_data_is_attached() {
        let envelope = ok(Reply::new().data(Document::from_json(json!(42))));
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"code": 0, "message": "success", "data": 42})
        );
    }

    #[test]
    fn test_fail_defaults() {
        let envelope = fail(Reply::new());
        assert_eq!(envelope.code, FAIL_CODE);
        assert_eq!(envelope.message, FAIL_MESSAGE);

        let envelope = fail("not found");
        assert_eq!(envelope.code, 400);
        assert_eq!(envelope.message, "not found");
    }

    #[test]
    fn test_fail_never_converts() {
        let envelope = fail(Reply::new().code(422).message("invalid").data(records()));

        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "code": 422,
                "message": "invalid",
                "data": [
                    {"id": 1, "createdAt": "2023-07-08T12:34:56Z"},
                    {"id": 2, "updatedAt": 1_688_819_696_000i64}
                ]
            })
        );
    }

    #[test]
    fn test_ok_with_private_cache() {
        let cache = FieldSetCache::new();
        ok_with_cache(Reply::new().data(records()), &cache);
        ok_with_cache(Reply::new().data(records()), &cache);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_empty_message_falls_back_to_default() {
        assert_eq!(ok("").message, OK_MESSAGE);
        assert_eq!(ok(Reply::new().message("").code(201)).message, OK_MESSAGE);
        assert_eq!(fail(Reply::new().message("")).message, FAIL_MESSAGE);
        assert_eq!(fail(" ").message, " ");
    }

    /// `{"child": ... {"createdAt": ...}}` nested `depth` maps below the root
    fn deep_payload(depth: usize) -> Document {
        let mut doc = Document::new();
        let root = doc.add_map();
        let mut current = root;
        for _ in 0..depth {
            let next = doc.add_map();
            doc.insert(current, "child", Value::Node(next)).unwrap();
            current = next;
        }
        doc.insert(current, "createdAt", Value::from("2023-07-08T12:34:56Z")).unwrap();
        doc.set_root(Value::Node(root)).unwrap();
        doc
    }

    #[test]
    fn test_deep_ok_payload_writes_out() {
        let depth = 200_000;
        let options = TransformOptions::default().with_zone(chrono_tz::UTC);
        let envelope = ok(Reply::from("fetched").data(deep_payload(depth)).options(options));

        let text = envelope.to_json_string().unwrap();
        assert!(text.starts_with(r#"{"code":0,"message":"fetched","data":{"child":{"child":"#));
        assert_eq!(text.matches(r#"{"child":"#).count(), depth);
        let tail = format!(r#"{{"createdAt":"2023-07-08 12:34:56"}}{}"#, "}".repeat(depth + 1));
        assert!(text.ends_with(&tail));
    }

    #[test]
    fn test_deep_ok_payload_fails_serde_cleanly() {
        let envelope = ok(Reply::new().data(deep_payload(200_000)));

        let err = serde_json::to_string(&envelope).unwrap_err();
        assert!(err.to_string().contains("write_json"));
    }

    #[test]
    fn test_written_envelope_matches_serde() {
        let envelope = ok(Reply::new().message("say \"hi\"").data(records()));
        assert_eq!(
            envelope.to_json_string().unwrap(),
            serde_json::to_string(&envelope).unwrap()
        );

        let envelope = fail("missing");
        assert_eq!(
            envelope.to_json_string().unwrap(),
            r#"{"code":400,"message":"missing"}"#
        );
    }
}
