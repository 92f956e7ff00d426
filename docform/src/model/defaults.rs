//! Minimal schema-conformant values for new fields.

use chrono::{Local, NaiveDate};
use serde_json::{Map, Value};

use super::{
    control::{ControlType, DICTIONARY_ENTRY_KEY, dictionary_entry_schema},
    field::FieldOption,
};
use crate::{
    config::DefaultsConfig,
    schema::{Schema, SchemaType},
};

/// Computes default values from schemas.
///
/// Generation is pure: the same option always yields an equal value.
#[derive(Debug, Clone)]
pub struct DefaultValues {
    config: DefaultsConfig,
    today: NaiveDate,
}

impl Default for DefaultValues {
    fn default() -> Self {
        Self::new(DefaultsConfig::default())
    }
}

impl DefaultValues {
    pub fn new(config: DefaultsConfig) -> Self {
        Self {
            config,
            today: Local::now().date_naive(),
        }
    }

    /// Pin the date used for `date` fields.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn config(&self) -> &DefaultsConfig {
        &self.config
    }

    /// Default value for `option`, or `None` to leave it undefined.
    pub fn for_option(&self, option: &FieldOption) -> Option<Value> {
        self.for_schema(&option.schema, self.config.max_depth)
    }

    /// Default value for `schema` with `depth` levels of nesting left.
    pub fn for_schema(&self, schema: &Schema, depth: usize) -> Option<Value> {
        match ControlType::of(schema) {
            ControlType::Date => {
                return Some(Value::String(self.today.format("%Y-%m-%d").to_string()));
            }
            ControlType::Select => {
                let first = schema
                    .variants()
                    .unwrap_or_default()
                    .iter()
                    .find_map(|v| v.value.clone());
                if first.is_some() {
                    return first;
                }
            }
            ControlType::Dictionary => {
                let entry = dictionary_entry_schema(schema);
                let value = self
                    .for_schema(&entry, depth.saturating_sub(1))
                    .unwrap_or(Value::Null);
                let mut map = Map::new();
                map.insert(DICTIONARY_ENTRY_KEY.to_string(), value);
                return Some(Value::Object(map));
            }
            ControlType::Text => {}
        }

        match schema.kind? {
            SchemaType::Object => Some(Value::Object(self.object_value(schema, depth))),
            SchemaType::Array => {
                if depth == 0 {
                    return Some(Value::Array(Vec::new()));
                }
                let first = schema
                    .item_schema(0)
                    .map(|item| self.for_schema(item, depth - 1).unwrap_or(Value::Null));
                Some(Value::Array(first.into_iter().collect()))
            }
            SchemaType::String => Some(Value::String(String::new())),
            SchemaType::Number | SchemaType::Integer => Some(Value::from(0)),
            SchemaType::Boolean => self.config.boolean.value().map(Value::Bool),
            SchemaType::Null => Some(Value::Null),
        }
    }

    fn object_value(&self, schema: &Schema, depth: usize) -> Map<String, Value> {
        let mut out = Map::new();
        if depth == 0 {
            return out;
        }

        let recommended = self
            .config
            .include_recommended
            .then_some(schema.recommended.as_slice())
            .unwrap_or_default();

        for key in schema.required.iter().chain(recommended) {
            if out.contains_key(key) {
                continue;
            }
            let Some(property) = schema.property(key) else {
                continue;
            };
            if property.calculated {
                continue;
            }
            if let Some(value) = self.for_schema(property, depth - 1) {
                out.insert(key.clone(), value);
            }
        }
        out
    }
}
