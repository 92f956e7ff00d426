use std::{collections::HashMap, fmt, sync::Arc};

use serde::Serialize;
use serde_json::Value;

use super::control::ControlType;
use crate::schema::{Schema, SchemaType};

/// Handle of a field inside its [`FormTree`](super::FormTree).
///
/// Handles stay valid until the field is removed from the tree. The slot
/// of a removed field is reused by the next insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Value held at a field position.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    /// Nothing at this position.
    #[default]
    Undefined,
    Json(Value),
    /// Text that could not be parsed as JSON.
    Unparsed(String),
}

impl FieldValue {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            FieldValue::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, FieldValue::Undefined)
    }

    /// Undefined, `null` or the empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Undefined => true,
            FieldValue::Json(Value::Null) => true,
            FieldValue::Json(Value::String(s)) => s.is_empty(),
            _ => false,
        }
    }

    /// JSON form of the value. Unparsed text is kept verbatim as a string.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            FieldValue::Undefined => None,
            FieldValue::Json(v) => Some(v.clone()),
            FieldValue::Unparsed(raw) => Some(Value::String(raw.clone())),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Json(value)
    }
}

impl From<Option<Value>> for FieldValue {
    fn from(value: Option<Value>) -> Self {
        value.map_or(FieldValue::Undefined, FieldValue::Json)
    }
}

/// A schema-eligible child that can be added to a container.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOption {
    /// Key the child is inserted under, before collision suffixes.
    pub key: String,
    /// Listed in the container's `required`.
    pub required: bool,
    /// Schema of the child.
    pub schema: Arc<Schema>,
}

/// Validity problem attached to a field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("Required field")]
    Missing,
    #[error("Invalid format {pattern}")]
    Pattern { pattern: String },
    #[error("Expected {expected} value")]
    TypeMismatch { expected: &'static str },
    #[error("Invalid JSON")]
    Unparsed,
}

/// State flags of a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldFlags {
    pub root: bool,
    pub required: bool,
    /// May be deleted.
    pub disposable: bool,
    pub duplicable: bool,
    /// Derived and read-only, inherited from ancestors.
    pub calculated: bool,
    pub editable: bool,
    /// The key itself may be renamed.
    pub editable_key: bool,
    /// No addable options remain.
    pub complete: bool,
    pub empty: bool,
    pub error: bool,
}

/// One node of the form tree.
#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) schema: Arc<Schema>,
    pub(crate) value: FieldValue,
    pub(crate) key: String,
    /// Id segment under the parent, fixed until the key changes.
    pub(crate) slug: String,
    pub(crate) id: String,
    pub(crate) index: usize,
    pub(crate) level: usize,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) children_map: HashMap<String, NodeId>,
    pub(crate) options: Vec<FieldOption>,
    pub(crate) control: ControlType,
    pub(crate) is: FieldFlags,
    pub(crate) error: Option<FieldError>,
    /// Container whose value is not an object/array; `value` keeps it as is.
    pub(crate) malformed: bool,
}

impl Field {
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Raw value of a leaf. Containers report [`FieldValue::Undefined`]
    /// unless malformed; use [`FormTree::to_value`](super::FormTree::to_value).
    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    /// Property name, dictionary key or array position.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// `-`-joined path from the salted root id, see
    /// [`FormTree::find_field_by_id`](super::FormTree::find_field_by_id).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Position among the siblings.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Depth below the root, which is level 0.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children ordered by index.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Child stored under `key`.
    pub fn child(&self, key: &str) -> Option<NodeId> {
        self.children_map.get(key).copied()
    }

    /// Children that can still be added.
    pub fn options(&self) -> &[FieldOption] {
        &self.options
    }

    pub fn control_type(&self) -> ControlType {
        self.control
    }

    pub fn flags(&self) -> FieldFlags {
        self.is
    }

    /// Validity problem of a leaf, as of the last check.
    pub fn error(&self) -> Option<&FieldError> {
        self.error.as_ref()
    }

    pub fn is_object(&self) -> bool {
        self.schema.kind == Some(SchemaType::Object)
    }

    pub fn is_array(&self) -> bool {
        self.schema.kind == Some(SchemaType::Array)
    }

    pub fn is_container(&self) -> bool {
        self.is_object() || self.is_array()
    }

    /// Object keyed by free-form entries rather than named properties.
    pub fn is_dictionary(&self) -> bool {
        self.is_object() && self.control == ControlType::Dictionary
    }

    pub(crate) fn is_leaf(&self) -> bool {
        !self.is_container() || self.malformed
    }
}

/// Reduce a key to characters that are safe inside a field id.
pub(crate) fn slugify(key: &str) -> String {
    let slug: String = key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    if slug.is_empty() { "_".to_string() } else { slug }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_values() {
        assert!(FieldValue::Undefined.is_blank());
        assert!(FieldValue::from(json!(null)).is_blank());
        assert!(FieldValue::from(json!("")).is_blank());
        assert!(!FieldValue::from(json!(0)).is_blank());
        assert!(!FieldValue::Unparsed("{".into()).is_blank());
    }

    #[test]
    fn slugs_drop_separator_characters() {
        assert_eq!(slugify("x-tax.code"), "xtaxcode");
        assert_eq!(slugify("$schema"), "$schema");
        assert_eq!(slugify("---"), "_");
        assert_eq!(slugify("line_2"), "line_2");
    }
}
