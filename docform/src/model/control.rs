use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::field::FieldOption;
use crate::schema::Schema;

/// Key given to the first entry of a freshly created dictionary.
pub const DICTIONARY_ENTRY_KEY: &str = "key";

/// Rendering classification of a field, independent of its JSON type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlType {
    Text,
    Select,
    Date,
    Dictionary,
}

impl ControlType {
    /// Classify a schema.
    ///
    /// An enumeration wins over a date format, which wins over a
    /// pattern-keyed dictionary.
    pub fn of(schema: &Schema) -> Self {
        if schema.one_of.is_some() || schema.any_of.is_some() {
            ControlType::Select
        } else if schema.format.as_deref() == Some("date") {
            ControlType::Date
        } else if schema.pattern_properties.is_some() {
            ControlType::Dictionary
        } else {
            ControlType::Text
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ControlType::Text => "text",
            ControlType::Select => "select",
            ControlType::Date => "date",
            ControlType::Dictionary => "dictionary",
        }
    }
}

/// One entry of a select control.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectOption {
    pub label: String,
    pub value: Value,
}

/// Rendering hints extracted from a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMeta {
    None,
    /// Choices sorted by label.
    Select(Vec<SelectOption>),
    /// Template of a new dictionary entry.
    Dictionary(FieldOption),
}

impl ControlMeta {
    pub fn of(schema: &Schema) -> Self {
        match ControlType::of(schema) {
            ControlType::Select => {
                let mut options: Vec<SelectOption> = schema
                    .variants()
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|v| {
                        v.value.clone().map(|value| SelectOption {
                            label: v.label.clone(),
                            value,
                        })
                    })
                    .collect();
                options.sort_by(|a, b| a.label.cmp(&b.label));
                ControlMeta::Select(options)
            }
            ControlType::Dictionary => ControlMeta::Dictionary(FieldOption {
                key: DICTIONARY_ENTRY_KEY.to_string(),
                required: false,
                schema: dictionary_entry_schema(schema),
            }),
            ControlType::Text | ControlType::Date => ControlMeta::None,
        }
    }
}

/// Entry schema of a dictionary, untyped when none is declared.
pub(crate) fn dictionary_entry_schema(schema: &Schema) -> Arc<Schema> {
    schema
        .dictionary_entry()
        .cloned()
        .unwrap_or_else(|| Arc::new(Schema::default()))
}
