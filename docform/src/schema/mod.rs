//! Typed view over resolved JSON Schema documents.
//!
//! A [`Schema`] is produced once the [`resolver`] has inlined every `$ref`.
//! It is immutable afterwards and shared through [`Arc`], so subtrees of the
//! same document are structurally shared between fields.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::SchemaError;

/// Schema fetch collaborators.
pub mod fetch;

/// `$ref` dereferencing and the schema cache.
pub mod resolver;

pub use fetch::{FileFetcher, RoutedFetcher, SchemaFetcher, StaticFetcher};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use resolver::{SchemaCache, SchemaResolver};

/// Property that designates the schema of a document.
pub const SCHEMA_KEY: &str = "$schema";

/// Extension keyword marking derived, read-only fields.
pub const CALCULATED_KEY: &str = "calculated";

/// Closed set of JSON Schema `type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl SchemaType {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "object" => SchemaType::Object,
            "array" => SchemaType::Array,
            "string" => SchemaType::String,
            "number" => SchemaType::Number,
            "integer" => SchemaType::Integer,
            "boolean" => SchemaType::Boolean,
            "null" => SchemaType::Null,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
            SchemaType::Null => "null",
        }
    }
}

/// Array item schemas.
#[derive(Debug, Clone, PartialEq)]
pub enum Items {
    /// Every element uses the same schema.
    Single(Arc<Schema>),
    /// Element `i` uses schema `i`.
    Tuple(Vec<Arc<Schema>>),
}

/// One `oneOf`/`anyOf` alternative, reduced to what a select control needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    /// The `const` of the alternative, if it declares one.
    pub value: Option<Value>,
    /// Human readable label (`description`, then `title`, then the const).
    pub label: String,
}

/// A fully dereferenced schema node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub id: Option<String>,
    /// `None` when the node has no (usable) `type`.
    pub kind: Option<SchemaType>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub format: Option<String>,
    pub pattern: Option<String>,
    pub required: Vec<String>,
    pub recommended: Vec<String>,
    /// Named properties in declaration order.
    pub properties: Vec<(String, Arc<Schema>)>,
    /// Pattern-keyed properties in declaration order.
    pub pattern_properties: Option<Vec<(String, Arc<Schema>)>>,
    pub items: Option<Items>,
    pub one_of: Option<Vec<Variant>>,
    pub any_of: Option<Vec<Variant>>,
    pub calculated: bool,
    /// Keywords without a typed counterpart.
    pub extra: Map<String, Value>,
}

impl Schema {
    /// Placeholder used whenever resolution fails.
    pub fn empty() -> Self {
        let mut extra = Map::new();
        extra.insert("$comment".into(), Value::String("empty-schema".into()));
        extra.insert(
            SCHEMA_KEY.into(),
            Value::String("http://json-schema.org/draft/2020-12/schema".into()),
        );
        Schema {
            id: Some(String::new()),
            kind: Some(SchemaType::Object),
            description: Some(String::new()),
            extra,
            ..Default::default()
        }
    }

    /// Whether this is the placeholder produced by [`Schema::empty`].
    pub fn is_placeholder(&self) -> bool {
        self.extra.get("$comment").and_then(Value::as_str) == Some("empty-schema")
    }

    /// Parse a dereferenced schema value.
    ///
    /// # Errors
    ///
    /// Fails when a node is not an object or declares an unsupported `type`.
    pub fn from_value(value: &Value) -> Result<Self, SchemaError> {
        Self::parse_node(value, "#")
    }

    fn parse_node(value: &Value, path: &str) -> Result<Self, SchemaError> {
        let obj = match value {
            Value::Object(obj) => obj,
            // `true` accepts anything: treat it as an untyped schema.
            Value::Bool(true) => return Ok(Schema::default()),
            _ => {
                return Err(SchemaError::NotAnObject {
                    path: path.to_string(),
                });
            }
        };

        let mut schema = Schema::default();

        for (k, v) in obj {
            match k.as_str() {
                "$id" => schema.id = v.as_str().map(str::to_string),
                "type" => schema.kind = parse_type(v, path)?,
                "title" => schema.title = v.as_str().map(str::to_string),
                "description" => schema.description = v.as_str().map(str::to_string),
                "format" => schema.format = v.as_str().map(str::to_string),
                "pattern" => schema.pattern = v.as_str().map(str::to_string),
                "required" => schema.required = string_list(v),
                "recommended" => schema.recommended = string_list(v),
                CALCULATED_KEY => schema.calculated = v.as_bool().unwrap_or(false),
                "properties" => {
                    schema.properties = parse_map(v, &format!("{path}/properties"))?;
                }
                "patternProperties" => {
                    schema.pattern_properties =
                        Some(parse_map(v, &format!("{path}/patternProperties"))?);
                }
                "items" => {
                    let items_path = format!("{path}/items");
                    schema.items = Some(match v {
                        Value::Array(list) => Items::Tuple(
                            list.iter()
                                .enumerate()
                                .map(|(i, s)| {
                                    Self::parse_node(s, &format!("{items_path}/{i}")).map(Arc::new)
                                })
                                .collect::<Result<_, _>>()?,
                        ),
                        other => Items::Single(Arc::new(Self::parse_node(other, &items_path)?)),
                    });
                }
                "oneOf" => schema.one_of = Some(parse_variants(v)),
                "anyOf" => schema.any_of = Some(parse_variants(v)),
                _ => {
                    schema.extra.insert(k.clone(), v.clone());
                }
            }
        }

        Ok(schema)
    }

    /// Serialize back to a JSON Schema value.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        if let Some(id) = &self.id {
            out.insert("$id".into(), Value::String(id.clone()));
        }
        if let Some(kind) = self.kind {
            out.insert("type".into(), Value::String(kind.as_str().into()));
        }
        for (k, v) in [
            ("title", &self.title),
            ("description", &self.description),
            ("format", &self.format),
            ("pattern", &self.pattern),
        ] {
            if let Some(v) = v {
                out.insert(k.into(), Value::String(v.clone()));
            }
        }
        if !self.required.is_empty() {
            out.insert("required".into(), self.required.clone().into());
        }
        if !self.recommended.is_empty() {
            out.insert("recommended".into(), self.recommended.clone().into());
        }
        if self.calculated {
            out.insert(CALCULATED_KEY.into(), Value::Bool(true));
        }
        if !self.properties.is_empty() {
            out.insert("properties".into(), map_value(&self.properties));
        }
        if let Some(pp) = &self.pattern_properties {
            out.insert("patternProperties".into(), map_value(pp));
        }
        match &self.items {
            Some(Items::Single(s)) => {
                out.insert("items".into(), s.to_value());
            }
            Some(Items::Tuple(list)) => {
                out.insert(
                    "items".into(),
                    Value::Array(list.iter().map(|s| s.to_value()).collect()),
                );
            }
            None => {}
        }
        for (k, variants) in [("oneOf", &self.one_of), ("anyOf", &self.any_of)] {
            if let Some(variants) = variants {
                out.insert(k.into(), variants_value(variants));
            }
        }
        for (k, v) in &self.extra {
            out.insert(k.clone(), v.clone());
        }
        Value::Object(out)
    }

    pub fn is_object(&self) -> bool {
        self.kind == Some(SchemaType::Object)
    }

    pub fn is_array(&self) -> bool {
        self.kind == Some(SchemaType::Array)
    }

    /// Schema of a named property.
    pub fn property(&self, key: &str) -> Option<&Arc<Schema>> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, s)| s)
    }

    /// Declaration rank of a named property.
    pub fn property_rank(&self, key: &str) -> Option<usize> {
        self.properties.iter().position(|(k, _)| k == key)
    }

    pub fn is_required(&self, key: &str) -> bool {
        self.required.iter().any(|k| k == key)
    }

    /// Alternatives of a `oneOf`, falling back to `anyOf`.
    pub fn variants(&self) -> Option<&[Variant]> {
        self.one_of.as_deref().or(self.any_of.as_deref())
    }

    /// Schema shared by the entries of a pattern-keyed dictionary.
    ///
    /// Prefers the catch-all `.*` pattern, then the first declared one.
    pub fn dictionary_entry(&self) -> Option<&Arc<Schema>> {
        let pp = self.pattern_properties.as_ref()?;
        pp.iter()
            .find(|(k, _)| k == ".*")
            .or_else(|| pp.first())
            .map(|(_, s)| s)
    }

    /// Schema of array element `index`.
    pub fn item_schema(&self, index: usize) -> Option<&Arc<Schema>> {
        match self.items.as_ref()? {
            Items::Single(s) => Some(s),
            Items::Tuple(list) => list.get(index),
        }
    }

    /// Key of a root field built from this schema: the last path segment of
    /// its id, lowercased.
    pub fn root_key(&self) -> String {
        self.id
            .as_deref()
            .and_then(|id| id.split('#').next())
            .and_then(|id| id.rsplit('/').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("root")
            .to_lowercase()
    }
}

fn parse_type(v: &Value, path: &str) -> Result<Option<SchemaType>, SchemaError> {
    let unsupported = |ty: &str| SchemaError::UnsupportedType {
        path: path.to_string(),
        ty: ty.to_string(),
    };
    match v {
        Value::String(s) => SchemaType::parse(s).map(Some).ok_or_else(|| unsupported(s)),
        // `["string", "null"]`: the first non-null member drives the field.
        Value::Array(list) => {
            let names: Vec<&str> = list.iter().filter_map(Value::as_str).collect();
            let pick = names
                .iter()
                .find(|s| **s != "null")
                .or_else(|| names.first());
            match pick {
                Some(s) => SchemaType::parse(s).map(Some).ok_or_else(|| unsupported(s)),
                None => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

fn string_list(v: &Value) -> Vec<String> {
    v.as_array()
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_map(v: &Value, path: &str) -> Result<Vec<(String, Arc<Schema>)>, SchemaError> {
    let Some(obj) = v.as_object() else {
        return Err(SchemaError::NotAnObject {
            path: path.to_string(),
        });
    };
    obj.iter()
        .map(|(k, s)| {
            Schema::parse_node(s, &format!("{path}/{k}")).map(|s| (k.clone(), Arc::new(s)))
        })
        .collect()
}

fn parse_variants(v: &Value) -> Vec<Variant> {
    let Some(list) = v.as_array() else {
        return Vec::new();
    };
    list.iter()
        .map(|entry| {
            let value = entry.get("const").cloned();
            let label = entry
                .get("description")
                .or_else(|| entry.get("title"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| value.as_ref().map(const_label))
                .unwrap_or_default();
            Variant { value, label }
        })
        .collect()
}

fn const_label(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn map_value(entries: &[(String, Arc<Schema>)]) -> Value {
    Value::Object(
        entries
            .iter()
            .map(|(k, s)| (k.clone(), s.to_value()))
            .collect(),
    )
}

fn variants_value(variants: &[Variant]) -> Value {
    Value::Array(
        variants
            .iter()
            .map(|v| {
                let mut m = Map::new();
                if let Some(c) = &v.value {
                    m.insert("const".into(), c.clone());
                }
                m.insert("description".into(), Value::String(v.label.clone()));
                Value::Object(m)
            })
            .collect(),
    )
}
