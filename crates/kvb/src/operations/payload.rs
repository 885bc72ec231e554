//! 📦 Payload: a document body that is either structured (we encode it) or already
//! serialized by the caller (we splice it in verbatim, no questions asked).
//!
//! 🧠 Knowledge graph:
//! - `Json`: a `serde_json::Value`, encoded at render time.
//! - `Raw`: caller-provided JSON text. Emitted as-is via `RawValue`, field order and all.
//!   Bytes are welcome too (`raw_bytes`, `From<Vec<u8>>`), as long as they are UTF-8.
//!   JSON on the wire is UTF-8, so anything else fails the render with an encoding error.
//! - `Unencodable`: a `Serialize` value that blew up during conversion. We hold on to the
//!   reason and fail the render later, so builders stay infallible and the failure shows
//!   up exactly where the bulk protocol says it should: when the operation renders.

use serde::Serialize;
use serde_json::Value;
use serde_json::value::RawValue;

use crate::error::BulkError;

/// 📦 A document (or partial document, or upsert, or script params) headed for the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// 🧱 Structured value, encoded by serde_json on render.
    Json(Value),
    /// 📜 Pre-serialized JSON text. Must be a single line. Emitted verbatim.
    Raw(String),
    /// 💀 A value that could not be converted to JSON. Rendering will fail with this reason.
    Unencodable(String),
}

impl Payload {
    /// 🔄 Convert anything `Serialize` into a payload.
    ///
    /// Conversion failures (maps with non-string keys, a `Serialize` impl that errors on
    /// purpose, ...) are parked in [`Payload::Unencodable`] and surface on render.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Payload::Json(value),
            Err(err) => Payload::Unencodable(err.to_string()),
        }
    }

    /// 📜 Wrap caller-serialized JSON text.
    pub fn raw(text: impl Into<String>) -> Self {
        Payload::Raw(text.into())
    }

    /// 📜 Wrap caller-serialized JSON bytes, e.g. straight out of a file or a socket.
    ///
    /// Invalid UTF-8 is parked in [`Payload::Unencodable`] and fails on render, like any
    /// other payload that cannot become JSON.
    pub fn raw_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        match String::from_utf8(bytes.into()) {
            Ok(text) => Payload::Raw(text),
            Err(err) => Payload::Unencodable(format!("pre-serialized payload is not valid UTF-8: {err}")),
        }
    }

    /// 🧪 Encode into a raw JSON fragment, ready to be spliced into a wire object.
    pub(crate) fn to_raw_value(&self, field: &'static str) -> Result<Box<RawValue>, BulkError> {
        match self {
            Payload::Json(value) => {
                serde_json::value::to_raw_value(value).map_err(|err| BulkError::encoding(field, err))
            }
            Payload::Raw(text) => {
                // -- ⚠️ one newline in here and every line after it belongs to the wrong operation
                if memchr::memchr(b'\n', text.as_bytes()).is_some() {
                    return Err(BulkError::encoding(
                        field,
                        "pre-serialized payload contains a newline, which would break NDJSON framing",
                    ));
                }
                RawValue::from_string(text.clone()).map_err(|err| BulkError::encoding(field, err))
            }
            Payload::Unencodable(reason) => Err(BulkError::encoding(field, reason)),
        }
    }

    /// 📄 Encode as a standalone wire line (the Index source line).
    pub(crate) fn to_line(&self, field: &'static str) -> Result<String, BulkError> {
        Ok(self.to_raw_value(field)?.get().to_string())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::raw_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn the_one_where_raw_text_survives_untouched() -> anyhow::Result<()> {
        // 🧪 field order is the caller's business. "b" before "a" stays "b" before "a".
        let payload = Payload::raw(r#"{"b":2,"a":1}"#);
        assert_eq!(payload.to_line("doc")?, r#"{"b":2,"a":1}"#);
        Ok(())
    }

    #[test]
    fn the_one_where_raw_bytes_are_spliced_in_like_raw_text() -> anyhow::Result<()> {
        let payload = Payload::from(br#"{"z":"\u00e9t\u00e9","a":1}"#.to_vec());
        assert_eq!(payload.to_line("doc")?, r#"{"z":"\u00e9t\u00e9","a":1}"#);
        let payload = Payload::raw_bytes("{\"caf\u{e9}\":true}");
        assert_eq!(payload.to_line("doc")?, "{\"caf\u{e9}\":true}");
        Ok(())
    }

    #[test]
    fn the_one_where_bytes_that_are_not_utf8_fail_the_render() {
        // 🧪 0xff never appears in UTF-8. The builder takes it, the render refuses it.
        let payload = Payload::from(vec![b'{', 0xff, b'}']);
        assert!(matches!(payload, Payload::Unencodable(_)));
        let err = payload.to_line("doc").expect_err("invalid UTF-8 must not reach the wire");
        assert!(matches!(err, BulkError::Encoding { field: "doc", .. }));
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn the_one_where_a_pretty_printed_raw_doc_is_turned_away_at_the_door() {
        let payload = Payload::raw("{\n  \"a\": 1\n}");
        let err = payload.to_line("doc").expect_err("newlines must not reach the wire");
        assert!(matches!(err, BulkError::Encoding { field: "doc", .. }));
    }

    #[test]
    fn the_one_where_raw_text_is_not_even_json() {
        let err = Payload::raw("definitely not json")
            .to_line("doc")
            .expect_err("garbage in, error out");
        assert!(matches!(err, BulkError::Encoding { .. }));
    }

    #[test]
    fn the_one_where_non_string_map_keys_wait_until_render_to_fail() {
        // 🧪 serde_json cannot key an object by a tuple. The builder shrugs, render does not.
        let mut cursed = HashMap::new();
        cursed.insert((1, 2), "tuple keys are a cry for help");
        let payload = Payload::json(&cursed);
        assert!(matches!(payload, Payload::Unencodable(_)));
        assert!(payload.to_raw_value("upsert").is_err());
    }

    #[test]
    fn the_one_where_structured_values_encode_compactly() -> anyhow::Result<()> {
        let payload = Payload::from(json!({"a": [1, 2, 3]}));
        assert_eq!(payload.to_line("doc")?, r#"{"a":[1,2,3]}"#);
        Ok(())
    }
}
