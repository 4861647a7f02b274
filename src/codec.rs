//! Mapping between the wire form (search store JSON) and the store form
//! (snapshot archive BSON).
//!
//! Both forms share field names. They differ in two places:
//!
//! | Aspect | Wire form | Store form |
//! |--------|-----------|------------|
//! | `timestamp` | RFC 3339 string | BSON datetime |
//! | identity | never in the body | `_id` |
//!
//! Raw archive documents are converted generically, so documents that are
//! not full [`Stats`] (legacy daily imports) replay just as well.

use crate::error::{CollectorError, Result};
use crate::stats::Stats;
use bson::{Bson, Document};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// A JSON object body, as sent to or received from the search store.
pub type JsonObject = serde_json::Map<String, Value>;

/// Identity field of archived documents.
pub const ID_FIELD: &str = "_id";

/// Field holding the snapshot instant.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Encode any snapshot type into its wire-form object.
pub fn to_wire<T: Serialize>(value: &T) -> Result<JsonObject> {
    match serde_json::to_value(value) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(CollectorError::Codec(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(CollectorError::Codec(e.to_string())),
    }
}

/// Convert a wire-form body into a store-form document.
///
/// An RFC 3339 `timestamp` becomes a BSON datetime; a `timestamp` that does
/// not parse is kept as a string.
pub fn wire_to_document(body: &JsonObject) -> Result<Document> {
    let mut doc = bson::to_document(body).map_err(|e| CollectorError::Codec(e.to_string()))?;
    let parsed = match doc.get(TIMESTAMP_FIELD) {
        Some(Bson::String(raw)) => DateTime::parse_from_rfc3339(raw).ok(),
        _ => None,
    };
    if let Some(ts) = parsed {
        doc.insert(
            TIMESTAMP_FIELD,
            Bson::DateTime(bson::DateTime::from_chrono(ts.with_timezone(&Utc))),
        );
    }
    Ok(doc)
}

/// Convert a store-form document into a wire-form object, field by field.
///
/// `_id` is converted like any other field; stripping it is the
/// reconciler's job.
pub fn document_to_wire(doc: Document) -> JsonObject {
    doc.into_iter()
        .map(|(key, value)| (key, bson_to_json(value)))
        .collect()
}

/// Encode a snapshot into its store form, optionally under a given identity.
pub fn stats_to_document(stats: &Stats, id: Option<&str>) -> Result<Document> {
    let mut doc = wire_to_document(&to_wire(stats)?)?;
    if let Some(id) = id.filter(|id| !id.is_empty()) {
        doc.insert(ID_FIELD, id);
    }
    Ok(doc)
}

/// Decode a store-form document into a snapshot and its identity.
pub fn stats_from_document(doc: Document) -> Result<(Option<String>, Stats)> {
    let mut object = document_to_wire(doc);
    let id = match object.remove(ID_FIELD) {
        Some(Value::String(id)) if !id.is_empty() => Some(id),
        _ => None,
    };
    let stats = serde_json::from_value(Value::Object(object))
        .map_err(|e| CollectorError::Codec(e.to_string()))?;
    Ok((id, stats))
}

fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::Double(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Bson::String(s) => Value::String(s),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::Document(doc) => Value::Object(document_to_wire(doc)),
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Int32(i) => Value::from(i),
        Bson::Int64(i) => Value::from(i),
        Bson::DateTime(dt) => {
            Value::String(dt.to_chrono().to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::Timestamp(ts) => Value::from(ts.time),
        other => other.into_relaxed_extjson(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
