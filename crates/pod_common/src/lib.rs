//! Common types and errors for podsync
//!
//! This crate provides the shared document model and error taxonomy used
//! across all pod components.

pub mod crypto;
pub mod telemetry;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Core error types for pod operations
#[derive(Error, Debug)]
pub enum PodError {
    #[error("invalid signature on document {id}")]
    InvalidSignature { id: String },

    #[error("document {id} time {time} outside acceptable window")]
    InvalidTime { id: String, time: i64 },

    #[error("malformed document: {0}")]
    InvalidFormat(String),

    #[error("dependency not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PodError>;

/// A (collection namespace, document type) pair identifying one collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocRef {
    pub index: String,
    pub doc_type: String,
}

impl DocRef {
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
        }
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.doc_type)
    }
}

/// Well-known field names shared by all signed pod documents
pub const FIELD_ISSUER: &str = "issuer";
pub const FIELD_SIGNATURE: &str = "signature";
pub const FIELD_HASH: &str = "hash";
pub const FIELD_TIME: &str = "time";

/// A parsed remote document: id plus its JSON object body.
///
/// The body is kept as a `serde_json::Map`, which is key-ordered, so the
/// canonical signable form falls out of plain serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: String,
    body: Map<String, Value>,
}

impl RawDocument {
    /// Build from an already-parsed JSON value. Non-objects are rejected.
    pub fn from_value(id: impl Into<String>, value: Value) -> Result<Self> {
        match value {
            Value::Object(body) => Ok(Self {
                id: id.into(),
                body,
            }),
            other => Err(PodError::InvalidFormat(format!(
                "expected JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse from raw JSON text.
    pub fn parse(id: impl Into<String>, raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| PodError::InvalidFormat(format!("invalid JSON: {}", e)))?;
        Self::from_value(id, value)
    }

    /// Issuer public key (base58), if present.
    pub fn issuer(&self) -> Option<&str> {
        self.str_field(FIELD_ISSUER)
    }

    /// Issuer signature (base58), if present.
    pub fn signature(&self) -> Option<&str> {
        self.str_field(FIELD_SIGNATURE)
    }

    /// Logical timestamp read from the named time field.
    pub fn time(&self, field: &str) -> Option<i64> {
        self.body.get(field).and_then(Value::as_i64)
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    /// Canonical signable byte form: the body with the signature field
    /// removed, serialized with sorted keys.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut signable = self.body.clone();
        signable.remove(FIELD_SIGNATURE);
        // Map is a BTreeMap underneath, so this is deterministic.
        serde_json::to_vec(&Value::Object(signable)).unwrap_or_default()
    }

    /// Full body as a JSON value, for storage.
    pub fn to_value(&self) -> Value {
        Value::Object(self.body.clone())
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
