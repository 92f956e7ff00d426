use std::{
    collections::{HashMap, HashSet},
    ops::{Index, IndexMut},
    sync::Arc,
};

use chrono::NaiveDate;
use rand::{Rng, distributions::Alphanumeric};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use super::{
    control::{ControlMeta, ControlType, DICTIONARY_ENTRY_KEY, dictionary_entry_schema},
    defaults::DefaultValues,
    field::{Field, FieldError, FieldFlags, FieldOption, FieldValue, NodeId, slugify},
};
use crate::{
    config::DefaultsConfig,
    schema::{Items, SCHEMA_KEY, Schema, SchemaType},
};

const SALT_LEN: usize = 5;

/// Construction settings of a [`FormTree`].
#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
    pub defaults: DefaultsConfig,
    /// Fixed id salt instead of a random one. Characters that cannot appear
    /// in an id segment are dropped.
    pub salt: Option<String>,
    /// Fixed date for `date` defaults.
    pub today: Option<NaiveDate>,
}

/// Row of [`FormTree::outline`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlineRow {
    pub level: usize,
    pub id: String,
    pub key: String,
    pub control: ControlType,
    #[serde(rename = "type")]
    pub kind: Option<&'static str>,
    pub flags: FieldFlags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A schema bound to a value as a tree of fields.
///
/// Fields live in an arena and refer to each other through [`NodeId`]
/// handles. The parent's `children` list is the only owning edge: removing
/// a field frees its whole subtree.
#[derive(Debug, Clone)]
pub struct FormTree {
    pub(crate) nodes: Vec<Option<Field>>,
    /// Vacant arena slots, reused by later insertions.
    pub(crate) free: Vec<NodeId>,
    pub(crate) root: NodeId,
    pub(crate) salt: String,
    pub(crate) defaults: DefaultValues,
    pub(crate) patterns: HashMap<String, Option<Regex>>,
}

impl Index<NodeId> for FormTree {
    type Output = Field;

    fn index(&self, id: NodeId) -> &Field {
        match self.nodes.get(id.0) {
            Some(Some(field)) => field,
            _ => panic!("stale field handle {id}"),
        }
    }
}

impl IndexMut<NodeId> for FormTree {
    fn index_mut(&mut self, id: NodeId) -> &mut Field {
        match self.nodes.get_mut(id.0) {
            Some(Some(field)) => field,
            _ => panic!("stale field handle {id}"),
        }
    }
}

impl FormTree {
    /// Build a tree with default options.
    pub fn new(schema: Arc<Schema>, value: impl Into<FieldValue>) -> Self {
        Self::with_options(schema, value, TreeOptions::default())
    }

    /// Build a tree from editor text. Unparseable text becomes an error
    /// value on the root.
    pub fn from_text(schema: Arc<Schema>, text: &str, options: TreeOptions) -> Self {
        let value = if text.trim().is_empty() {
            FieldValue::Undefined
        } else {
            match serde_json::from_str::<Value>(text) {
                Ok(v) => FieldValue::Json(v),
                Err(e) => {
                    debug!("editor text is not JSON: {e}");
                    FieldValue::Unparsed(text.to_string())
                }
            }
        };
        Self::with_options(schema, value, options)
    }

    pub fn with_options(
        schema: Arc<Schema>,
        value: impl Into<FieldValue>,
        options: TreeOptions,
    ) -> Self {
        let mut defaults = DefaultValues::new(options.defaults);
        if let Some(today) = options.today {
            defaults = defaults.with_today(today);
        }
        let salt = slugify(&options.salt.unwrap_or_else(random_salt));

        let mut value = value.into();
        if matches!(value, FieldValue::Undefined | FieldValue::Json(Value::Null)) {
            value = FieldValue::Json(root_default(&defaults, &schema));
        }

        let mut tree = FormTree {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NodeId(0),
            salt,
            defaults,
            patterns: HashMap::new(),
        };
        let key = schema.root_key();
        let root = tree.build(schema, value, key, 0, 0, None);
        let slug = slugify(&tree[root].key);
        let root_id = format!("{}_{slug}", tree.salt);
        tree[root].id = root_id;
        tree[root].slug = slug;
        tree.root = root;
        tree.refresh_ids(root);
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn get(&self, id: NodeId) -> Option<&Field> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn defaults(&self) -> &DefaultValues {
        &self.defaults
    }

    /// Rendering hints of a field.
    pub fn control_meta(&self, id: NodeId) -> ControlMeta {
        ControlMeta::of(&self[id].schema)
    }

    /// Number of live fields.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a `-`-joined field id by walking down from the root.
    pub fn find_field_by_id(&self, id: &str) -> Option<NodeId> {
        let mut segments = id.split('-');
        let root = self.root;
        if segments.next()? != self[root].id {
            return None;
        }
        segments.try_fold(root, |node, slug| {
            self[node]
                .children
                .iter()
                .copied()
                .find(|c| self[*c].slug == slug)
        })
    }

    /// Serialize the subtree at `id`. `None` means undefined.
    pub fn to_value(&self, id: NodeId) -> Option<Value> {
        let field = &self[id];
        if field.is_leaf() {
            return field.value.to_json();
        }
        if field.is_array() {
            let items = field
                .children
                .iter()
                .map(|c| self.to_value(*c).unwrap_or(Value::Null))
                .collect();
            return Some(Value::Array(items));
        }
        let mut out = Map::new();
        for c in &field.children {
            if let Some(v) = self.to_value(*c) {
                out.insert(self[*c].key.clone(), v);
            }
        }
        Some(Value::Object(out))
    }

    /// Serialized document.
    pub fn value(&self) -> Value {
        self.to_value(self.root).unwrap_or(Value::Null)
    }

    /// Canonical text of the document, indented by four spaces.
    pub fn to_json(&self) -> String {
        to_json_text(&self.value())
    }

    /// Fields in document order.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self[id].children.iter().rev().copied());
        }
        out
    }

    pub fn outline(&self) -> Vec<OutlineRow> {
        self.walk()
            .into_iter()
            .map(|id| {
                let f = &self[id];
                OutlineRow {
                    level: f.level,
                    id: f.id.clone(),
                    key: f.key.clone(),
                    control: f.control,
                    kind: f.schema.kind.map(SchemaType::as_str),
                    flags: f.is,
                    value: if f.is_leaf() { f.value.to_json() } else { None },
                    error: f.error.as_ref().map(ToString::to_string),
                }
            })
            .collect()
    }

    /// Recompute the validity of a leaf from its current value.
    pub fn revalidate(&mut self, id: NodeId) -> Option<&FieldError> {
        if self.contains(id) && self[id].is_leaf() {
            let error = self.leaf_error(id);
            let field = &mut self[id];
            field.is.error = error.is_some();
            field.error = error;
        }
        self.get(id)?.error.as_ref()
    }

    pub(crate) fn build(
        &mut self,
        schema: Arc<Schema>,
        value: FieldValue,
        key: String,
        index: usize,
        level: usize,
        parent: Option<NodeId>,
    ) -> NodeId {
        let control = ControlType::of(&schema);
        let parent_field = parent.map(|p| &self[p]);
        let calculated = schema.calculated || parent_field.is_some_and(|p| p.is.calculated);
        let in_dictionary = parent_field.is_some_and(Field::is_dictionary);
        let in_array = parent_field.is_some_and(Field::is_array);
        let required = parent_field.is_some_and(|p| {
            p.is_object() && !p.is_dictionary() && p.schema.is_required(&key)
        });

        let is = FieldFlags {
            root: parent.is_none(),
            required,
            disposable: parent.is_some() && key != SCHEMA_KEY,
            duplicable: in_array || in_dictionary,
            calculated,
            editable: !calculated,
            editable_key: in_dictionary && !calculated,
            ..Default::default()
        };

        let malformed = match (&schema.kind, &value) {
            (Some(SchemaType::Object), FieldValue::Json(Value::Object(_))) => false,
            (Some(SchemaType::Array), FieldValue::Json(Value::Array(_))) => false,
            (Some(SchemaType::Object | SchemaType::Array), FieldValue::Undefined) => false,
            (Some(SchemaType::Object | SchemaType::Array), _) => true,
            _ => false,
        };

        let container = schema.is_object() || schema.is_array();
        let (own, entries) = if container && !malformed {
            (FieldValue::Undefined, value)
        } else {
            (value, FieldValue::Undefined)
        };

        let id = self.alloc(Field {
            schema,
            value: own,
            slug: String::new(),
            key,
            id: String::new(),
            index,
            level,
            parent,
            children: Vec::new(),
            children_map: HashMap::new(),
            options: Vec::new(),
            control,
            is,
            error: None,
            malformed,
        });

        if container && !malformed {
            self.build_children(id, entries);
        }

        self.finish(id);
        id
    }

    fn build_children(&mut self, id: NodeId, value: FieldValue) {
        let schema = self[id].schema.clone();
        let level = self[id].level + 1;
        let mut children = Vec::new();
        let mut used = HashSet::new();

        match value {
            FieldValue::Json(Value::Object(map)) => {
                let dictionary = self[id].is_dictionary();
                for (key, v) in map {
                    let child_schema = if dictionary {
                        dictionary_entry_schema(&schema)
                    } else {
                        schema
                            .property(&key)
                            .cloned()
                            .unwrap_or_else(|| Arc::new(Schema::default()))
                    };
                    let index = children.len();
                    let slug = unique_slug(&key, |s| used.contains(s));
                    used.insert(slug.clone());
                    let child = self.build(child_schema, v.into(), key, index, level, Some(id));
                    self[child].slug = slug;
                    children.push(child);
                }
            }
            FieldValue::Json(Value::Array(list)) => {
                for (i, v) in list.into_iter().enumerate() {
                    let child_schema = schema
                        .item_schema(i)
                        .cloned()
                        .unwrap_or_else(|| Arc::new(Schema::default()));
                    let child = self.build(child_schema, v.into(), i.to_string(), i, level, Some(id));
                    self[child].slug = i.to_string();
                    children.push(child);
                }
            }
            _ => {}
        }

        self[id].children = children;
        self.rebuild_map(id);
    }

    /// Recompute options, derived flags and validity of `id`.
    pub(crate) fn finish(&mut self, id: NodeId) {
        let options = self.derive_options(id);
        let error = if self[id].is_leaf() {
            self.leaf_error(id)
        } else {
            None
        };
        let field = &mut self[id];
        field.is.complete = options.is_empty();
        field.options = options;
        field.is.empty = if field.is_leaf() {
            field.value.is_undefined()
        } else {
            field.children.is_empty()
        };
        field.is.error = error.is_some();
        field.error = error;
    }

    pub(crate) fn rebuild_map(&mut self, id: NodeId) {
        let map = self[id]
            .children
            .iter()
            .map(|c| (self[*c].key.clone(), *c))
            .collect();
        self[id].children_map = map;
    }

    /// Rebuild the ids of every descendant of `id` from their slugs.
    pub(crate) fn refresh_ids(&mut self, id: NodeId) {
        let base = self[id].id.clone();
        let children = self[id].children.clone();
        for c in children {
            let child = &mut self[c];
            child.id = format!("{base}-{}", child.slug);
            self.refresh_ids(c);
        }
    }

    /// Slug for `key` under `parent` that no sibling other than `except`
    /// already uses.
    pub(crate) fn fresh_slug(&self, parent: NodeId, key: &str, except: Option<NodeId>) -> String {
        let siblings = &self[parent].children;
        unique_slug(key, |slug| {
            siblings
                .iter()
                .any(|c| Some(*c) != except && self[*c].slug == slug)
        })
    }

    fn alloc(&mut self, field: Field) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = Some(field);
                id
            }
            None => {
                self.nodes.push(Some(field));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn derive_options(&self, id: NodeId) -> Vec<FieldOption> {
        let field = &self[id];
        if field.is_leaf() || field.is.calculated {
            return Vec::new();
        }
        let schema = &field.schema;

        if field.is_dictionary() {
            return vec![FieldOption {
                key: DICTIONARY_ENTRY_KEY.to_string(),
                required: false,
                schema: dictionary_entry_schema(schema),
            }];
        }

        if field.is_array() {
            let next = match &schema.items {
                Some(Items::Single(item)) => Some(item.clone()),
                Some(Items::Tuple(list)) => list.get(field.children.len()).cloned(),
                None => None,
            };
            return next
                .map(|schema| FieldOption {
                    key: "item".to_string(),
                    required: false,
                    schema,
                })
                .into_iter()
                .collect();
        }

        schema
            .properties
            .iter()
            .filter(|(_, s)| !s.calculated)
            .filter(|(k, _)| !field.children_map.contains_key(k))
            .map(|(k, s)| FieldOption {
                key: k.clone(),
                required: schema.is_required(k),
                schema: s.clone(),
            })
            .collect()
    }

    fn leaf_error(&mut self, id: NodeId) -> Option<FieldError> {
        let field = &self[id];
        if matches!(field.value, FieldValue::Unparsed(_)) {
            return Some(FieldError::Unparsed);
        }
        if field.malformed {
            let expected = field.schema.kind.map_or("object", SchemaType::as_str);
            return Some(FieldError::TypeMismatch { expected });
        }

        if field.is.required && field.value.is_blank() {
            return Some(FieldError::Missing);
        }
        let text = match &field.value {
            FieldValue::Json(Value::String(s)) => Some(s.clone()),
            _ => None,
        };
        if let (Some(pattern), Some(text)) = (field.schema.pattern.clone(), text) {
            if let Some(re) = self.pattern(&pattern) {
                if !re.is_match(&text) {
                    return Some(FieldError::Pattern { pattern });
                }
            }
        }

        None
    }

    fn pattern(&mut self, pattern: &str) -> Option<&Regex> {
        self.patterns
            .entry(pattern.to_string())
            .or_insert_with(|| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("ignoring invalid pattern {pattern}: {e}");
                    None
                }
            })
            .as_ref()
    }
}

/// Root value for an empty document: the default object with the schema
/// designator as its first key.
fn root_default(defaults: &DefaultValues, schema: &Schema) -> Value {
    let generated = defaults.for_schema(schema, defaults.config().max_depth);
    let mut out = Map::new();
    out.insert(
        SCHEMA_KEY.to_string(),
        Value::String(schema.id.clone().unwrap_or_default()),
    );
    if let Some(Value::Object(map)) = generated {
        for (k, v) in map {
            if k != SCHEMA_KEY {
                out.insert(k, v);
            }
        }
    }
    Value::Object(out)
}

/// `slugify(key)`, suffixed with `_1`, `_2`, ... while `taken`.
fn unique_slug(key: &str, taken: impl Fn(&str) -> bool) -> String {
    let plain = slugify(key);
    let mut slug = plain.clone();
    let mut n = 0;
    while taken(&slug) {
        n += 1;
        slug = format!("{plain}_{n}");
    }
    slug
}

/// Random prefix for field ids.
pub fn random_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LEN)
        .map(char::from)
        .collect()
}

/// Pretty-print with four-space indentation.
pub fn to_json_text(value: &Value) -> String {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    match value.serialize(&mut ser) {
        Ok(()) => String::from_utf8(buf).unwrap_or_default(),
        Err(e) => {
            warn!("failed to serialize document: {e}");
            String::new()
        }
    }
}
