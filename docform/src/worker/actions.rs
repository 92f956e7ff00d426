//! Document operations run by the worker.
//!
//! Editor text is sent wrapped in a draft envelope (unless it already is
//! one) and base64-of-UTF-8 encoded.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Map, Value, json};

use super::WorkerClient;
use crate::{error::WorkerError, schema::SCHEMA_KEY};

/// Schema id of a document envelope.
pub const ENVELOPE_SCHEMA: &str = "https://gobl.org/draft-0/envelope";

/// Empty draft envelope around `doc`.
pub fn new_envelope(doc: Value) -> Value {
    json!({
        SCHEMA_KEY: ENVELOPE_SCHEMA,
        "doc": doc,
        "head": {"draft": true},
    })
}

pub fn encode_base64(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Text to send for `editor_text`.
///
/// Envelopes go as they are; any other document replaces the `doc` of
/// `envelope` (or of a fresh draft envelope).
pub fn document_payload(editor_text: &str, envelope: Option<&Value>) -> Result<String, WorkerError> {
    let doc: Value = serde_json::from_str(editor_text)
        .map_err(|e| WorkerError::local(format!("invalid document: {e}")))?;
    if doc.get(SCHEMA_KEY).and_then(Value::as_str) == Some(ENVELOPE_SCHEMA) {
        return Ok(editor_text.to_string());
    }

    let wrapped = match envelope.cloned() {
        Some(Value::Object(mut env)) => {
            env.insert("doc".into(), doc);
            Value::Object(env)
        }
        _ => new_envelope(doc),
    };
    serde_json::to_string(&wrapped).map_err(|e| WorkerError::local(e.to_string()))
}

fn parse_result(raw: &str) -> Result<Value, WorkerError> {
    serde_json::from_str(raw).map_err(|e| WorkerError::local(format!("invalid worker response: {e}")))
}

fn data_payload(editor_text: &str, envelope: Option<&Value>) -> Result<Map<String, Value>, WorkerError> {
    let data = encode_base64(&document_payload(editor_text, envelope)?);
    let mut payload = Map::new();
    payload.insert("data".into(), Value::String(data));
    Ok(payload)
}

impl WorkerClient {
    /// Calculate the document and return the built envelope.
    pub async fn build(&self, editor_text: &str, envelope: Option<&Value>) -> Result<Value, WorkerError> {
        let mut payload = data_payload(editor_text, envelope)?;
        payload.insert("draft".into(), Value::Bool(true));
        payload.insert("envelop".into(), Value::Bool(true));
        parse_result(&self.send("build", Value::Object(payload)).await?)
    }

    /// Sign the document with `private_key` (a JWK).
    pub async fn sign(
        &self,
        editor_text: &str,
        envelope: Option<&Value>,
        private_key: &Value,
    ) -> Result<Value, WorkerError> {
        let mut payload = data_payload(editor_text, envelope)?;
        payload.insert("privatekey".into(), private_key.clone());
        parse_result(&self.send("sign", Value::Object(payload)).await?)
    }

    pub async fn validate(&self, editor_text: &str, envelope: Option<&Value>) -> Result<(), WorkerError> {
        let payload = data_payload(editor_text, envelope)?;
        self.send("validate", Value::Object(payload)).await.map(|_| ())
    }

    /// Schema of the correction options available for the document.
    pub async fn correction_schema(
        &self,
        editor_text: &str,
        envelope: Option<&Value>,
    ) -> Result<Value, WorkerError> {
        let mut payload = data_payload(editor_text, envelope)?;
        payload.insert("schema".into(), Value::Bool(true));
        parse_result(&self.send("correct", Value::Object(payload)).await?)
    }

    /// Apply correction `options` (JSON text) and return the corrected envelope.
    pub async fn correct(
        &self,
        editor_text: &str,
        envelope: Option<&Value>,
        options: &str,
    ) -> Result<Value, WorkerError> {
        let mut payload = data_payload(editor_text, envelope)?;
        payload.insert("options".into(), Value::String(encode_base64(options)));
        parse_result(&self.send("correct", Value::Object(payload)).await?)
    }
}
