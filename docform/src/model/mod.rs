//! The form model: a schema bound to a JSON value as a navigable tree of
//! fields.
//!
//! - [`tree`] - construction, lookup and serialization
//! - [`edit`] - structural edits (add, delete, duplicate, rename, reorder)
//! - [`defaults`] - default values for new fields
//! - [`focus`] - document-order focus traversal
//! - [`control`] - rendering hints derived from schema shape
//!
//! ```
//! use std::sync::Arc;
//! use docform::{model::{FieldValue, FormTree}, schema::Schema};
//! use serde_json::json;
//!
//! let schema = Schema::from_value(&json!({
//!     "$id": "https://example.com/party",
//!     "type": "object",
//!     "required": ["name"],
//!     "properties": {"name": {"type": "string"}}
//! }))
//! .unwrap();
//!
//! let tree = FormTree::new(Arc::new(schema), FieldValue::Undefined);
//! assert_eq!(
//!     tree.value(),
//!     json!({"$schema": "https://example.com/party", "name": ""})
//! );
//! ```

pub mod control;
pub mod defaults;
pub mod edit;
pub mod field;
pub mod focus;
pub mod tree;

pub use control::{ControlMeta, ControlType, SelectOption};
pub use defaults::DefaultValues;
pub use field::{Field, FieldError, FieldFlags, FieldOption, FieldValue, NodeId};
pub use tree::{FormTree, OutlineRow, TreeOptions, random_salt, to_json_text};
