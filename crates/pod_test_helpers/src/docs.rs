//! Signed and anonymous document builders for tests

use crate::keys::TestKey;
use pod_common::crypto::content_hash_hex;
use pod_common::{RawDocument, FIELD_HASH, FIELD_ISSUER, FIELD_SIGNATURE};
use serde_json::Value;

/// Build a correctly signed document: sets `issuer`, then signs the canonical
/// byte form and sets `signature`.
pub fn signed_doc(key: &TestKey, id: &str, mut body: Value) -> (String, Value) {
    let obj = body.as_object_mut().expect("document body must be an object");
    obj.insert(FIELD_ISSUER.to_string(), Value::String(key.pubkey.clone()));

    let unsigned = RawDocument::from_value(id, body.clone()).expect("valid document body");
    let signature = key.sign_b58(&unsigned.canonical_bytes());

    let obj = body.as_object_mut().expect("document body must be an object");
    obj.insert(FIELD_SIGNATURE.to_string(), Value::String(signature));
    (id.to_string(), body)
}

/// Build a signed document, then tamper with one field after signing.
pub fn tampered_doc(key: &TestKey, id: &str, body: Value, field: &str, new_value: Value) -> (String, Value) {
    let (id, mut doc) = signed_doc(key, id, body);
    doc.as_object_mut()
        .expect("document body must be an object")
        .insert(field.to_string(), new_value);
    (id, doc)
}

/// Build an anonymous document carrying a content hash instead of a
/// signature.
pub fn anonymous_doc(id: &str, mut body: Value) -> (String, Value) {
    let unhashed = RawDocument::from_value(id, body.clone()).expect("valid document body");
    let mut value = unhashed.to_value();
    if let Some(obj) = value.as_object_mut() {
        obj.remove(FIELD_SIGNATURE);
        obj.remove(FIELD_HASH);
    }
    let hash = content_hash_hex(&serde_json::to_vec(&value).expect("serializable body"));

    let obj = body.as_object_mut().expect("document body must be an object");
    obj.insert(FIELD_HASH.to_string(), Value::String(hash));
    (id.to_string(), body)
}
