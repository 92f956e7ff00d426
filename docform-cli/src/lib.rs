//! # docform-cli
//!
//! Command line driver for [`docform`] forms.
//!
//! Every subcommand loads `.docform.toml`, resolves a schema through the
//! configured routes, builds a form tree from a JSON document (or a fresh
//! default document) and applies one operation to it.
//!
//! ## Modules
//!
//! - [`ctx`] - Shared context: configuration, fetcher and document I/O
//! - [`commands`] - Subcommand handlers

#[macro_use]
extern crate log;

/// Application context and document loading.
pub mod ctx;

/// Handlers for the `docform` subcommands.
pub mod commands;
