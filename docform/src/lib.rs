//! # docform
//!
//! A schema-driven form model for JSON documents.
//!
//! docform resolves JSON Schemas (following `$ref`s across documents), builds
//! a tree of fields from a schema and a document, and keeps both in sync
//! while fields are edited, added, removed and reordered.
//!
//! ## Features
//!
//! - Schema resolution with per-id caching and shared subtrees
//! - Field tree with stable ids, control types and per-field validation
//! - Default documents generated from the schema
//! - Keyboard-style focus traversal over the tree
//! - An editor session that debounces rebuilds and discards stale ones
//! - A client for the document worker (build, sign, validate, correct)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docform::{FormConfig, FormEditor, schema::FileFetcher};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let editor = FormEditor::new(FileFetcher::new(), FormConfig::load(".docform.toml")?);
//! editor.update_schema("schemas/party.json");
//! editor.rebuild().await;
//! println!("{}", editor.editor_text());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`schema`] - Schema model, fetching and `$ref` resolution
//! - [`model`] - Field tree, defaults, edits and focus traversal
//! - [`editor`] - Editor session tying text and tree together
//! - [`worker`] - Document worker client
//! - [`config`] - `.docform.toml` configuration

#[macro_use]
extern crate log;

/// Configuration file model.
pub mod config;

/// Editor session state and field operations.
pub mod editor;

pub mod error;

/// Field tree model.
///
/// Fields live in an arena owned by [`model::FormTree`] and are addressed by
/// [`model::NodeId`] handles.
pub mod model;

pub mod schedule;

/// JSON Schema loading and resolution.
pub mod schema;

/// Document worker client.
pub mod worker;

pub use config::FormConfig;
pub use editor::FormEditor;
pub use error::{SchemaError, WorkerError};
pub use model::{Field, FieldValue, FormTree, NodeId};
pub use schema::{Schema, SchemaResolver};
pub use serde_json::Value;
pub use worker::format_errors;
