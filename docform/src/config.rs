//! Configuration types for the form model and its editor session.
//!
//! Configuration is typically stored in a `.docform.toml` file:
//!
//! ```toml
//! [defaults]
//! max_depth = 8
//! boolean = "true"
//! include_recommended = false
//!
//! [editor]
//! rebuild_debounce_ms = 200
//! flush_debounce_ms = 500
//!
//! [focus]
//! attempts = 5
//! delay_ms = 200
//!
//! [[schema.routes]]
//! pattern = "^https://gobl.org/"
//! dir = "./schemas"
//! ```

use std::{path::Path, time::Duration};

use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".docform.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct FormConfig {
    /// Default value generation.
    pub defaults: DefaultsConfig,
    /// Editor session timing.
    pub editor: EditorConfig,
    /// Focus application after structural edits.
    pub focus: FocusConfig,
    /// Schema resolution.
    pub schema: SchemaConfig,
}

/// Settings for the default value generator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Nesting limit for expanding required properties.
    pub max_depth: usize,
    /// Default for boolean fields.
    pub boolean: BooleanDefault,
    /// Also expand properties listed under `recommended`.
    pub include_recommended: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            boolean: BooleanDefault::True,
            include_recommended: false,
        }
    }
}

/// What a freshly added boolean field holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BooleanDefault {
    True,
    False,
    /// Leave the field undefined.
    Omit,
}

impl BooleanDefault {
    pub fn value(self) -> Option<bool> {
        match self {
            BooleanDefault::True => Some(true),
            BooleanDefault::False => Some(false),
            BooleanDefault::Omit => None,
        }
    }
}

/// Debounce windows of the editor session.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    /// Quiescence window before a schema change rebuilds the tree.
    pub rebuild_debounce_ms: u64,
    /// Quiescence window before key/value edits are flushed to the editor text.
    pub flush_debounce_ms: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            rebuild_debounce_ms: 200,
            flush_debounce_ms: 500,
        }
    }
}

impl EditorConfig {
    pub fn rebuild_window(&self) -> Duration {
        Duration::from_millis(self.rebuild_debounce_ms)
    }

    pub fn flush_window(&self) -> Duration {
        Duration::from_millis(self.flush_debounce_ms)
    }
}

/// Bounded retry used when focusing freshly rendered fields.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct FocusConfig {
    /// Number of attempts before giving up.
    pub attempts: u32,
    /// Delay before each attempt.
    pub delay_ms: u64,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay_ms: 200,
        }
    }
}

impl FocusConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Schema resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct SchemaConfig {
    /// `$ref` path fragments whose targets are displayed as numbers.
    pub numeric_families: Vec<String>,
    /// URL patterns served from a local directory instead of the network.
    pub routes: Vec<SchemaRoute>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            numeric_families: vec!["/num/amount".into(), "/num/percentage".into()],
            routes: Vec::new(),
        }
    }
}

/// Maps schema URLs matching `pattern` to files under `dir`.
///
/// The last path segment of the URL, plus `.json`, names the file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SchemaRoute {
    /// Regular expression matched against the absolute schema URL.
    pub pattern: String,
    /// Directory holding the schema documents.
    pub dir: String,
}

impl FormConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// JSON Schema describing this configuration.
    pub fn json_schema() -> serde_json::Value {
        let schema = schemars::schema_for!(FormConfig);
        serde_json::to_value(&schema).unwrap_or_default()
    }
}
