//! Error types for schema handling and the document worker boundary.
//!
//! Structural no-ops on the field tree are not errors: tree operations
//! report them with `bool`/`Option` return values. The types here cover
//! collaborator failures only.

use serde::{Deserialize, Serialize};

/// Errors raised while loading or interpreting a schema.
///
/// The resolver never hands these to the tree builder; it logs them and
/// substitutes the empty schema instead.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The schema declares a `type` outside the supported set.
    #[error("unsupported schema type `{ty}` at {path}")]
    UnsupportedType { path: String, ty: String },

    /// A schema node is not a JSON object.
    #[error("schema node at {path} is not an object")]
    NotAnObject { path: String },

    /// An internal pointer does not lead anywhere in the fetched document.
    #[error("pointer `{pointer}` not found in {document}")]
    PointerNotFound { document: String, pointer: String },

    /// The fetch collaborator failed.
    #[error("failed to fetch {id}: {reason}")]
    Fetch { id: String, reason: String },

    /// The fetched text is not JSON.
    #[error("invalid schema json in {id}: {source}")]
    Json {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Structured error reported by the document-processing worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("worker error {code}: {message}")]
pub struct WorkerError {
    pub message: String,
    #[serde(default)]
    pub code: i64,
}

impl WorkerError {
    /// Build an error that did not originate from the worker itself.
    pub fn local(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: 0,
        }
    }

    /// Interpret a rejection payload: either a JSON `{ message, code }`
    /// object or a bare message string.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<WorkerError>(raw) {
            Ok(err) => err,
            Err(_) => Self::local(raw),
        }
    }

    /// Flatten [`message`](Self::message) into `"path: message"` lines.
    pub fn messages(&self) -> Vec<String> {
        crate::worker::format_errors(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_structured_payload() {
        let err = WorkerError::parse(r#"{"message":"doc: (a: bad.).","code":422}"#);
        assert_eq!(err.code, 422);
        assert_eq!(err.message, "doc: (a: bad.).");
    }

    #[test]
    fn parse_plain_payload() {
        let err = WorkerError::parse("calculation failed");
        assert_eq!(err.code, 0);
        assert_eq!(err.message, "calculation failed");
    }
}
