//! Record decoder
//!
//! Turns one transport record into a [`TelemetryRecord`]:
//! base64 → UTF-8 → JSON object → required fields present.
//! Field values are taken as sent, so a present field never fails to decode.
//! Every failure is returned as a [`DecodeError`] value; nothing here panics
//! or performs I/O.

use crate::event::StreamRecord;
use base64::{engine::general_purpose::STANDARD, Engine};
use hotelflow_common::types::TelemetryRecord;
use serde_json::Value;
use thiserror::Error;

/// Why a single record could not be decoded.
///
/// Decode failures are structural, so they are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record carries no payload")]
    MissingPayload,

    #[error("payload is not valid base64: {0}")]
    Base64(String),

    #[error("payload is not valid UTF-8: {0}")]
    Utf8(String),

    #[error("payload is not valid JSON: {0}")]
    Json(String),

    #[error("payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),

    #[error("payload is missing required field `{0}`")]
    MissingField(&'static str),
}

/// Decode one transport record.
pub fn decode(record: &StreamRecord) -> Result<TelemetryRecord, DecodeError> {
    let payload = record.payload().ok_or(DecodeError::MissingPayload)?;
    decode_payload(payload)
}

/// Decode a base64-encoded JSON payload.
pub fn decode_payload(encoded: &str) -> Result<TelemetryRecord, DecodeError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| DecodeError::Base64(e.to_string()))?;

    let text = String::from_utf8(bytes).map_err(|e| DecodeError::Utf8(e.to_string()))?;

    let value: Value =
        serde_json::from_str(&text).map_err(|e| DecodeError::Json(e.to_string()))?;

    let fields = match value {
        Value::Object(fields) => fields,
        other => return Err(DecodeError::NotAnObject(json_kind(&other))),
    };

    TelemetryRecord::from_object(&fields).map_err(|missing| DecodeError::MissingField(missing.0))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
