//! Schema reference resolution.
//!
//! [`SchemaResolver`] turns a schema id (`https://host/doc#/pointer`) into a
//! fully dereferenced [`Schema`]:
//!
//! 1. the absolute document is fetched once and cached,
//! 2. the optional internal pointer is walked into it,
//! 3. every `$ref` is replaced by its target merged with the referencing
//!    node's own keywords,
//! 4. `$defs` sections are stripped and each node gets an explicit `$id`.
//!
//! Resolution never fails: a document that cannot be fetched or parsed
//! becomes [`Schema::empty`].

use std::{collections::HashMap, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use serde_json::{Map, Value};

use super::{SCHEMA_KEY, Schema, SchemaFetcher, SchemaType};
use crate::{config::SchemaConfig, error::SchemaError};

/// Comment attached to nodes that would otherwise recurse forever.
pub const RECURSIVE_REF_COMMENT: &str = "recursive-ref";

/// Session-wide cache of fetched documents and resolved schemas.
///
/// Populated lazily and never evicted; [`SchemaCache::clear`] is the full
/// reload.
#[derive(Debug, Default)]
pub struct SchemaCache {
    documents: HashMap<String, Arc<Value>>,
    derefs: HashMap<String, Value>,
    resolved: HashMap<String, Arc<Schema>>,
    roots: HashMap<String, Arc<Schema>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fetched documents.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn contains_document(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    pub fn clear(&mut self) {
        self.documents.clear();
        self.derefs.clear();
        self.resolved.clear();
        self.roots.clear();
    }
}

/// Dereferences schemas fetched through `F`.
pub struct SchemaResolver<F> {
    fetcher: F,
    cache: SchemaCache,
    numeric_families: Vec<String>,
}

impl<F: SchemaFetcher> SchemaResolver<F> {
    pub fn new(fetcher: F) -> Self {
        Self::with_config(fetcher, &SchemaConfig::default())
    }

    pub fn with_config(fetcher: F, config: &SchemaConfig) -> Self {
        Self {
            fetcher,
            cache: SchemaCache::new(),
            numeric_families: config.numeric_families.clone(),
        }
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Drop everything fetched so far.
    pub fn reset(&mut self) {
        self.cache.clear();
    }

    /// Resolve `id` to a dereferenced schema.
    ///
    /// Repeated calls with the same id return the same [`Arc`].
    pub async fn resolve(&mut self, id: &str) -> Arc<Schema> {
        if let Some(schema) = self.cache.resolved.get(id) {
            debug!("schema cache hit for {id}");
            return schema.clone();
        }

        let value = match self.fetch_node(id).await {
            Ok(node) => {
                let mut stack = vec![id.to_string()];
                self.deref_node(id, (*node).clone(), &mut stack).await
            }
            Err(e) => {
                warn!("{e}; using empty schema");
                return Arc::new(Schema::empty());
            }
        };

        let schema = Arc::new(typed_or_empty(id, &value));
        self.cache.resolved.insert(id.to_string(), schema.clone());
        schema
    }

    /// Resolve `id` as the root of a document.
    ///
    /// The result carries a synthetic, calculated and required `$schema`
    /// property as its first property.
    pub async fn resolve_root(&mut self, id: &str) -> Arc<Schema> {
        if let Some(schema) = self.cache.roots.get(id) {
            return schema.clone();
        }
        let base = self.resolve(id).await;
        let root = Arc::new(with_designator(&base, id));
        if !base.is_placeholder() {
            self.cache.roots.insert(id.to_string(), root.clone());
        }
        root
    }

    /// Resolve an inline schema value whose relative `$ref`s are anchored at `id`.
    pub async fn resolve_value(&mut self, id: &str, schema: Value) -> Arc<Schema> {
        let mut stack = vec![id.to_string()];
        let value = self.deref_node(id, schema, &mut stack).await;
        Arc::new(typed_or_empty(id, &value))
    }

    /// Like [`resolve_value`](Self::resolve_value), for a document root.
    pub async fn resolve_root_value(&mut self, id: &str, schema: Value) -> Arc<Schema> {
        let base = self.resolve_value(id, schema).await;
        Arc::new(with_designator(&base, id))
    }

    async fn fetch_document(&mut self, abs_id: &str) -> Result<Arc<Value>, SchemaError> {
        if let Some(doc) = self.cache.documents.get(abs_id) {
            return Ok(doc.clone());
        }

        let text = self
            .fetcher
            .fetch(abs_id)
            .await
            .map_err(|e| SchemaError::Fetch {
                id: abs_id.to_string(),
                reason: format!("{e:#}"),
            })?;
        let doc: Value = serde_json::from_str(&text).map_err(|source| SchemaError::Json {
            id: abs_id.to_string(),
            source,
        })?;

        let doc = Arc::new(doc);
        self.cache.documents.insert(abs_id.to_string(), doc.clone());
        Ok(doc)
    }

    async fn fetch_node(&mut self, id: &str) -> Result<Arc<Value>, SchemaError> {
        let (abs_id, pointer) = split_id(id);
        let doc = self.fetch_document(abs_id).await?;
        match pointer {
            None => Ok(doc),
            Some(pointer) => walk_pointer(&doc, pointer)
                .cloned()
                .map(Arc::new)
                .ok_or_else(|| SchemaError::PointerNotFound {
                    document: abs_id.to_string(),
                    pointer: pointer.to_string(),
                }),
        }
    }

    fn load_ref<'a>(
        &'a mut self,
        ref_id: String,
        stack: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Value> {
        async move {
            if let Some(cached) = self.cache.derefs.get(&ref_id) {
                return cached.clone();
            }
            match self.fetch_node(&ref_id).await {
                Ok(node) => {
                    stack.push(ref_id.clone());
                    let value = self.deref_node(&ref_id, (*node).clone(), stack).await;
                    stack.pop();
                    self.cache.derefs.insert(ref_id, value.clone());
                    value
                }
                Err(e) => {
                    warn!("{e}; using empty schema");
                    Schema::empty().to_value()
                }
            }
        }
        .boxed()
    }

    fn deref_node<'a>(
        &'a mut self,
        id: &'a str,
        node: Value,
        stack: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Value> {
        async move {
            let Value::Object(mut obj) = node else {
                return node;
            };

            let reference = obj.remove("$ref");
            obj.remove("$defs");
            obj.insert("$id".into(), Value::String(id.to_string()));

            for key in ["properties", "patternProperties"] {
                if let Some(Value::Object(entries)) = obj.get_mut(key).map(std::mem::take) {
                    let mut out = Map::new();
                    for (k, v) in entries {
                        let resolved = self.deref_node(id, v, stack).await;
                        out.insert(k, resolved);
                    }
                    obj.insert(key.into(), Value::Object(out));
                }
            }

            for key in ["items", "oneOf", "anyOf"] {
                match obj.get_mut(key).map(std::mem::take) {
                    Some(Value::Array(list)) => {
                        let mut out = Vec::with_capacity(list.len());
                        for v in list {
                            out.push(self.deref_node(id, v, stack).await);
                        }
                        obj.insert(key.into(), Value::Array(out));
                    }
                    Some(single @ Value::Object(_)) => {
                        let resolved = self.deref_node(id, single, stack).await;
                        obj.insert(key.into(), resolved);
                    }
                    Some(other) => {
                        obj.insert(key.into(), other);
                    }
                    None => {}
                }
            }

            let Some(Value::String(reference)) = reference else {
                return Value::Object(obj);
            };

            let ref_id = join_ref(id, &reference);
            let target = if stack.contains(&ref_id) {
                debug!("recursive $ref {ref_id}");
                let mut placeholder = Map::new();
                placeholder.insert(
                    "$comment".into(),
                    Value::String(RECURSIVE_REF_COMMENT.into()),
                );
                Value::Object(placeholder)
            } else {
                self.load_ref(ref_id.clone(), stack).await
            };

            let mut merged = match target {
                Value::Object(target) => target,
                _ => Map::new(),
            };
            for (k, v) in obj {
                merged.insert(k, v);
            }
            if self.is_numeric_family(&ref_id) {
                merged.insert("type".into(), Value::String("number".into()));
            }
            Value::Object(merged)
        }
        .boxed()
    }

    fn is_numeric_family(&self, ref_id: &str) -> bool {
        self.numeric_families.iter().any(|f| ref_id.contains(f.as_str()))
    }
}

fn typed_or_empty(id: &str, value: &Value) -> Schema {
    match Schema::from_value(value) {
        Ok(schema) => schema,
        Err(e) => {
            warn!("schema {id} rejected: {e}; using empty schema");
            Schema::empty()
        }
    }
}

fn with_designator(base: &Schema, id: &str) -> Schema {
    let mut root = base.clone();
    let designator = Schema {
        id: Some(id.to_string()),
        title: Some(SCHEMA_KEY.to_string()),
        kind: Some(SchemaType::String),
        calculated: true,
        ..Default::default()
    };

    root.properties.retain(|(k, _)| k != SCHEMA_KEY);
    root.properties
        .insert(0, (SCHEMA_KEY.to_string(), Arc::new(designator)));
    root.required.retain(|k| k != SCHEMA_KEY);
    root.required.insert(0, SCHEMA_KEY.to_string());
    if root.kind.is_none() {
        root.kind = Some(SchemaType::Object);
    }
    root
}

/// Split `abs#/pointer` into its document id and pointer.
fn split_id(id: &str) -> (&str, Option<&str>) {
    match id.split_once('#') {
        Some((abs, rest)) => {
            let pointer = rest.trim_start_matches('/');
            (abs, (!pointer.is_empty()).then_some(pointer))
        }
        None => (id, None),
    }
}

/// Walk a `/`-delimited JSON pointer.
fn walk_pointer<'a>(doc: &'a Value, pointer: &str) -> Option<&'a Value> {
    let mut node = doc;
    for raw in pointer.split('/') {
        if raw.is_empty() || raw == "#" {
            continue;
        }
        let segment = raw.replace("~1", "/").replace("~0", "~");
        node = match node {
            Value::Object(obj) => obj.get(&segment)?,
            Value::Array(list) => list.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Resolve a `$ref` relative to the id of the node holding it.
fn join_ref(base_id: &str, reference: &str) -> String {
    let (abs, _) = split_id(base_id);
    if reference.starts_with('#') {
        return format!("{abs}{reference}");
    }
    if reference.contains("://") || reference.starts_with('/') {
        return reference.to_string();
    }

    let (dir, _) = abs.rsplit_once('/').unwrap_or(("", abs));
    let mut segments: Vec<&str> = dir.split('/').collect();
    for part in reference.split('/') {
        match part {
            "." => {}
            ".." => {
                // Never climb above `scheme://host`.
                if segments.len() > 3 || !dir.contains("://") {
                    segments.pop();
                }
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
