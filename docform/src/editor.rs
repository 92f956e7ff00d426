//! Editing session tying the editor text, the schema and the form tree.
//!
//! Observers subscribe to two snapshots: the editor text and the form tree.
//! Schema and text changes rebuild the tree after a quiescence window; a
//! rebuild superseded by a newer request is discarded. Field edits mutate
//! the current tree and write it back to the editor text.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::{
    config::FormConfig,
    model::{FieldValue, FormTree, NodeId, TreeOptions, random_salt, to_json_text},
    schedule::{Debouncer, Generation, retry},
    schema::{SCHEMA_KEY, SchemaFetcher, SchemaResolver},
};

/// Editor text as last published.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorSnapshot {
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Form tree as last published.
#[derive(Debug, Clone)]
pub struct ModelSnapshot {
    pub value: Option<Arc<FormTree>>,
    pub updated_at: DateTime<Utc>,
}

struct Inner<F> {
    config: FormConfig,
    resolver: tokio::sync::Mutex<SchemaResolver<F>>,
    schema_url: Mutex<Option<String>>,
    /// Id salt shared by every tree of the session.
    salt: String,
    tree: Mutex<Option<FormTree>>,
    editor: watch::Sender<EditorSnapshot>,
    model: watch::Sender<ModelSnapshot>,
    generation: Generation,
    rebuilder: Debouncer,
    flusher: Debouncer,
}

/// Form editing session. Cheap to clone.
///
/// Scheduling methods spawn tasks and must run inside a tokio runtime.
pub struct FormEditor<F> {
    inner: Arc<Inner<F>>,
}

impl<F> Clone for FormEditor<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<F: SchemaFetcher + 'static> FormEditor<F> {
    pub fn new(fetcher: F, config: FormConfig) -> Self {
        let resolver = SchemaResolver::with_config(fetcher, &config.schema);
        let now = Utc::now();
        let (editor, _) = watch::channel(EditorSnapshot {
            value: String::new(),
            updated_at: now,
        });
        let (model, _) = watch::channel(ModelSnapshot {
            value: None,
            updated_at: now,
        });

        Self {
            inner: Arc::new(Inner {
                rebuilder: Debouncer::new(config.editor.rebuild_window()),
                flusher: Debouncer::new(config.editor.flush_window()),
                config,
                resolver: tokio::sync::Mutex::new(resolver),
                schema_url: Mutex::new(None),
                salt: random_salt(),
                tree: Mutex::new(None),
                editor,
                model,
                generation: Generation::new(),
            }),
        }
    }

    pub fn config(&self) -> &FormConfig {
        &self.inner.config
    }

    pub fn subscribe_editor(&self) -> watch::Receiver<EditorSnapshot> {
        self.inner.editor.subscribe()
    }

    pub fn subscribe_model(&self) -> watch::Receiver<ModelSnapshot> {
        self.inner.model.subscribe()
    }

    pub fn editor_text(&self) -> String {
        self.inner.editor.borrow().value.clone()
    }

    pub fn model(&self) -> Option<Arc<FormTree>> {
        self.inner.model.borrow().value.clone()
    }

    pub fn schema_url(&self) -> Option<String> {
        lock(&self.inner.schema_url).clone()
    }

    /// Replace the editor text and schedule a rebuild of the tree.
    pub fn set_editor_text(&self, text: impl Into<String>) {
        self.publish_editor(text.into());
        self.schedule_rebuild();
    }

    /// Switch the document schema and schedule a rebuild.
    ///
    /// A JSON object in the editor gets `url` as its `$schema`. Blank text
    /// is left alone so that the rebuild generates a default document.
    pub fn update_schema(&self, url: &str) {
        *lock(&self.inner.schema_url) = Some(url.to_string());

        let text = self.editor_text();
        if let Ok(Value::Object(mut doc)) = serde_json::from_str::<Value>(&text) {
            let mut out = Map::new();
            out.insert(SCHEMA_KEY.to_string(), Value::String(url.to_string()));
            doc.remove(SCHEMA_KEY);
            out.extend(doc);
            self.publish_editor(to_json_text(&Value::Object(out)));
        }

        self.schedule_rebuild();
    }

    fn schedule_rebuild(&self) {
        let editor = self.clone();
        debug!("rebuild scheduled");
        self.inner.rebuilder.call(async move {
            editor.rebuild().await;
        });
    }

    /// Rebuild the tree from the current schema and editor text now.
    ///
    /// Returns `false` when a newer rebuild superseded this one.
    pub async fn rebuild(&self) -> bool {
        let ticket = self.inner.generation.begin();
        let Some(url) = self.schema_url() else {
            *lock(&self.inner.tree) = None;
            self.publish_model(None);
            return true;
        };

        let schema = self.inner.resolver.lock().await.resolve_root(&url).await;
        if !self.inner.generation.is_current(ticket) {
            debug!("discarding superseded rebuild for {url}");
            return false;
        }

        let text = self.editor_text();
        let options = TreeOptions {
            defaults: self.inner.config.defaults.clone(),
            salt: Some(self.inner.salt.clone()),
            today: None,
        };
        let tree = FormTree::from_text(schema, &text, options);
        let json = tree.to_json();
        if !tree[tree.root()].flags().error && json != text {
            self.publish_editor(json);
        }
        let snapshot = Arc::new(tree.clone());
        *lock(&self.inner.tree) = Some(tree);
        self.publish_model(Some(snapshot));
        true
    }

    /// Publish the current tree again, e.g. after reordering.
    pub fn refresh_ui(&self) {
        let snapshot = lock(&self.inner.tree).clone().map(Arc::new);
        self.publish_model(snapshot);
    }

    /// Write the current tree into the editor text.
    pub fn update_editor(&self) {
        let text = lock(&self.inner.tree).as_ref().map(FormTree::to_json);
        if let Some(text) = text {
            self.publish_editor(text);
        }
    }

    fn schedule_flush(&self) {
        let editor = self.clone();
        self.inner.flusher.call(async move {
            editor.update_editor();
        });
    }

    fn with_field<R>(&self, id: &str, op: impl FnOnce(&mut FormTree, NodeId) -> R) -> Option<R> {
        let mut guard = lock(&self.inner.tree);
        let tree = guard.as_mut()?;
        let node = tree.find_field_by_id(id)?;
        Some(op(tree, node))
    }

    pub fn change_field_key(&self, id: &str, key: &str) -> bool {
        let changed = self
            .with_field(id, |tree, node| tree.set_key(node, key))
            .unwrap_or(false);
        if changed {
            self.refresh_ui();
            self.schedule_flush();
        }
        changed
    }

    pub fn change_field_value(&self, id: &str, value: impl Into<FieldValue>) -> bool {
        let changed = self
            .with_field(id, |tree, node| {
                let changed = tree.set_value(node, value);
                if changed {
                    tree.revalidate(node);
                }
                changed
            })
            .unwrap_or(false);
        if changed {
            self.refresh_ui();
            self.schedule_flush();
        }
        changed
    }

    pub fn delete_field(&self, id: &str) -> bool {
        let deleted = self
            .with_field(id, |tree, node| tree.delete(node))
            .unwrap_or(false);
        if deleted {
            self.after_structural_edit();
        }
        deleted
    }

    /// Returns the id of the copy.
    pub fn duplicate_field(&self, id: &str) -> Option<String> {
        let new_id = self
            .with_field(id, |tree, node| {
                tree.duplicate(node).map(|c| tree[c].id().to_string())
            })
            .flatten()?;
        self.after_structural_edit();
        Some(new_id)
    }

    /// Add the option named `option_key` to the container `parent_id`.
    ///
    /// Returns the id of the new field.
    pub fn add_field(&self, parent_id: &str, option_key: &str, position: Option<usize>) -> Option<String> {
        let new_id = self
            .with_field(parent_id, |tree, node| {
                let option = tree[node]
                    .options()
                    .iter()
                    .find(|o| o.key == option_key)
                    .cloned()?;
                tree.add_child_field(node, &option, None, position)
                    .map(|c| tree[c].id().to_string())
            })
            .flatten()?;
        self.after_structural_edit();
        Some(new_id)
    }

    /// Move a field. With `update` the editor text is rewritten at once;
    /// otherwise only observers of the tree are notified.
    pub fn sort_field(&self, id: &str, position: usize, update: bool) -> Option<String> {
        let focus = self
            .with_field(id, |tree, node| tree.sort_field(node, position))
            .flatten()?;
        if update {
            self.after_structural_edit();
        } else {
            self.refresh_ui();
        }
        Some(focus)
    }

    fn after_structural_edit(&self) {
        self.inner.flusher.cancel();
        self.update_editor();
        self.refresh_ui();
    }

    /// The editor text is JSON whose `$schema` is the current schema.
    pub fn valid_editor(&self) -> bool {
        let Some(url) = self.schema_url() else {
            return false;
        };
        match serde_json::from_str::<Value>(&self.editor_text()) {
            Ok(doc) => doc.get(SCHEMA_KEY).and_then(Value::as_str) == Some(url.as_str()),
            Err(_) => false,
        }
    }

    /// Some nested value is `""`, `null`, `{}` or `[]`.
    pub fn some_value_is_empty(&self) -> bool {
        serde_json::from_str::<Value>(&self.editor_text())
            .map(|doc| has_empty_value(&doc))
            .unwrap_or(false)
    }

    /// Focus the field `id`, retrying while the rendering layer catches up.
    ///
    /// Containers hand focus to their first focusable descendant. `try_focus`
    /// receives the target id and reports whether focusing succeeded.
    /// Returns the focused id, or `None` after the configured attempts.
    pub async fn focus_field(&self, id: &str, mut try_focus: impl FnMut(&str) -> bool) -> Option<String> {
        let focus = &self.inner.config.focus;
        let mut focused = None;
        let ok = retry(focus.attempts, focus.delay(), || {
            let Some(tree) = self.model() else {
                return false;
            };
            let Some(target) = tree
                .find_field_by_id(id)
                .and_then(|node| tree.focus_target(node, false))
            else {
                return false;
            };
            let target_id = tree[target].id().to_string();
            if try_focus(&target_id) {
                focused = Some(target_id);
                true
            } else {
                false
            }
        })
        .await;
        if !ok {
            debug!("giving up focusing {id}");
        }
        focused
    }

    fn publish_editor(&self, value: String) {
        self.inner.editor.send_replace(EditorSnapshot {
            value,
            updated_at: Utc::now(),
        });
    }

    fn publish_model(&self, value: Option<Arc<FormTree>>) {
        self.inner.model.send_replace(ModelSnapshot {
            value,
            updated_at: Utc::now(),
        });
    }
}

fn has_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(list) => list.is_empty() || list.iter().any(has_empty_value),
        Value::Object(map) => map.is_empty() || map.values().any(has_empty_value),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StaticFetcher;
    use futures::{FutureExt, future::BoxFuture};
    use serde_json::json;
    use std::time::Duration;

    const PARTY: &str = "https://example.com/party";

    struct SlowFetcher(StaticFetcher);

    impl SchemaFetcher for SlowFetcher {
        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.0.fetch(url).await
            }
            .boxed()
        }
    }

    fn editor() -> FormEditor<StaticFetcher> {
        FormEditor::new(party_fetcher(), FormConfig::default())
    }

    fn party_fetcher() -> StaticFetcher {
        StaticFetcher::new().with(
            PARTY,
            json!({
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": {"type": "string"},
                    "emails": {"type": "array", "items": {"type": "string"}}
                }
            })
            .to_string(),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn schema_change_builds_default_document() {
        let editor = editor();
        editor.update_schema(PARTY);
        assert!(editor.model().is_none());

        settle().await;
        let tree = editor.model().unwrap();
        assert_eq!(tree.value(), json!({"$schema": PARTY, "name": ""}));
        assert!(editor.valid_editor());
        assert!(editor.some_value_is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_rebuild_is_discarded() {
        let editor = FormEditor::new(SlowFetcher(party_fetcher()), FormConfig::default());
        editor.update_schema(PARTY);
        let first = editor.rebuild();
        let second = editor.rebuild();
        let (a, b) = tokio::join!(first, second);
        assert!(!a);
        assert!(b);
    }

    #[tokio::test(start_paused = true)]
    async fn field_edits_reach_editor_text() {
        let editor = editor();
        editor.update_schema(PARTY);
        settle().await;

        let tree = editor.model().unwrap();
        let root = tree[tree.root()].id().to_string();
        let name = format!("{root}-name");

        assert!(editor.change_field_value(&name, json!("Acme")));
        // Value edits are flushed after the quiescence window.
        assert!(!editor.editor_text().contains("Acme"));
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(editor.editor_text().contains("Acme"));

        let emails = editor.add_field(&root, "emails", None).unwrap();
        assert_eq!(emails, format!("{root}-emails"));
        let doc: Value = serde_json::from_str(&editor.editor_text()).unwrap();
        assert_eq!(doc["emails"], json!([""]));

        assert!(editor.delete_field(&emails));
        assert!(!editor.delete_field(&emails));
        assert!(!editor.delete_field(&format!("{root}-$schema")));
    }

    #[tokio::test(start_paused = true)]
    async fn focus_retries_until_rendered() {
        let editor = editor();
        editor.update_schema(PARTY);
        settle().await;
        let tree = editor.model().unwrap();
        let root = tree[tree.root()].id().to_string();

        let mut attempts = 0;
        let focused = editor
            .focus_field(&root, |_| {
                attempts += 1;
                attempts == 2
            })
            .await;
        assert_eq!(focused, Some(format!("{root}-name")));

        let missing = editor.focus_field("nope", |_| true).await;
        assert_eq!(missing, None);
    }

    #[test]
    fn empty_values_are_detected_deeply() {
        assert!(has_empty_value(&json!({"a": {"b": []}})));
        assert!(!has_empty_value(&json!({"a": {"b": [1]}, "c": "x"})));
    }
}
