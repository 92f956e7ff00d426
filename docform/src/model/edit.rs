//! Structural edits of a [`FormTree`].
//!
//! Every operation leaves `children`, the key map, indices and ids
//! consistent before returning. A field keeps its id until its own key
//! changes; array elements are keyed by position, so moving one renames it. Edits that do not apply return `false` or
//! `None` and leave the tree untouched.

use serde_json::Value;

use super::{
    field::{FieldOption, FieldValue, NodeId},
    tree::FormTree,
};

impl FormTree {
    /// Rename a dictionary entry in place.
    ///
    /// A key already used by a sibling gets a `_N` suffix.
    pub fn set_key(&mut self, id: NodeId, key: &str) -> bool {
        let Some(field) = self.get(id) else {
            return false;
        };
        if !field.is.editable_key || field.key == key {
            return false;
        }
        let Some(parent) = field.parent else {
            return false;
        };

        let key = self.next_child_key(parent, key, Some(id));
        let slug = self.fresh_slug(parent, &key, Some(id));
        let field = &mut self[id];
        field.slug = slug;
        field.key = key;
        self.rebuild_map(parent);
        self.refresh_ids(parent);
        self.finish(parent);
        true
    }

    /// Replace the value of an editable leaf.
    ///
    /// Validity is not recomputed; see [`FormTree::revalidate`].
    pub fn set_value(&mut self, id: NodeId, value: impl Into<FieldValue>) -> bool {
        let value = value.into();
        let Some(field) = self.get(id) else {
            return false;
        };
        if !field.is.editable || !field.is_leaf() || field.value == value {
            return false;
        }

        let field = &mut self[id];
        field.is.empty = value.is_undefined();
        field.value = value;
        true
    }

    /// Remove a field and its subtree from its parent.
    pub fn delete(&mut self, id: NodeId) -> bool {
        let Some(field) = self.get(id) else {
            return false;
        };
        if field.is.root || !field.is.disposable {
            return false;
        }
        let Some(parent) = field.parent else {
            return false;
        };
        let child_id = field.id.clone();
        self.delete_child_field_by_id(parent, &child_id)
    }

    /// Remove the child of `parent` whose id is `child_id`.
    pub fn delete_child_field_by_id(&mut self, parent: NodeId, child_id: &str) -> bool {
        let Some(field) = self.get(parent) else {
            return false;
        };
        if field.is_leaf() {
            return false;
        }
        let Some(child) = field.children.iter().copied().find(|c| self[*c].id == child_id) else {
            return false;
        };

        let remaining = self[parent]
            .children
            .iter()
            .copied()
            .filter(|c| *c != child)
            .collect();
        self.free(child);
        self.install_children(parent, remaining);
        true
    }

    /// Copy a field subtree next to itself under a fresh key.
    pub fn duplicate(&mut self, id: NodeId) -> Option<NodeId> {
        let field = self.get(id)?;
        if field.is.root {
            return None;
        }
        let parent = field.parent?;
        if self[parent].is_leaf() {
            return None;
        }

        let option = FieldOption {
            key: field.key.clone(),
            required: field.is.required,
            schema: field.schema.clone(),
        };
        let position = field.index + 1;
        let value = self.to_value(id);
        self.add_child_field(parent, &option, value, Some(position))
    }

    /// Add a child built from `option` to the container `id`.
    ///
    /// The value is `default` when given, the generated default otherwise.
    /// Without a `position`, plain objects keep schema declaration order and
    /// arrays and dictionaries append.
    pub fn add_child_field(
        &mut self,
        id: NodeId,
        option: &FieldOption,
        default: Option<Value>,
        position: Option<usize>,
    ) -> Option<NodeId> {
        let field = self.get(id)?;
        if field.is_leaf() || field.is.complete {
            return None;
        }

        let value = default.or_else(|| self.defaults.for_option(option));
        let key = self.next_child_key(id, &option.key, None);
        let len = field.children.len();
        let position = match position {
            Some(p) => p.min(len),
            None if field.is_object() && !field.is_dictionary() => {
                self.schema_position(id, &option.key).unwrap_or(len)
            }
            None => len,
        };

        let level = field.level + 1;
        let slug = self.fresh_slug(id, &key, None);
        let child = self.build(option.schema.clone(), value.into(), key, position, level, Some(id));
        self[child].slug = slug;

        let mut children = self[id].children.clone();
        children.insert(position, child);
        self.install_children(id, children);
        Some(child)
    }

    /// Reorder the children of `id` to `children`.
    ///
    /// `children` must hold exactly the current children of `id`; any other
    /// list is refused with `false`. Indices become positions. Array
    /// elements are re-keyed to their position, and ids and options are
    /// re-derived.
    pub fn update_children(&mut self, id: NodeId, children: Vec<NodeId>) -> bool {
        let Some(field) = self.get(id) else {
            return false;
        };
        let mut current = field.children.clone();
        let mut given = children.clone();
        current.sort_unstable();
        given.sort_unstable();
        if current != given {
            return false;
        }
        self.install_children(id, children);
        true
    }

    /// Install `children` as the ordered child list of `id`. Callers own
    /// the membership of the list.
    fn install_children(&mut self, id: NodeId, children: Vec<NodeId>) {
        let is_array = self[id].is_array();
        for (i, c) in children.iter().enumerate() {
            let child = &mut self[*c];
            child.index = i;
            if is_array {
                child.key = i.to_string();
                child.slug = child.key.clone();
            }
        }
        self[id].children = children;
        self.rebuild_map(id);
        self.refresh_ids(id);
        self.finish(id);
    }

    /// Move a field so that it ends up at index `position` among its siblings.
    ///
    /// Returns the id to focus afterwards: the moved field's for object
    /// parents, the id of the element now in the vacated slot for arrays.
    pub fn sort_field(&mut self, id: NodeId, position: usize) -> Option<String> {
        let field = self.get(id)?;
        let parent = field.parent?;
        let from = field.index;
        let mut children = self[parent].children.clone();
        if children.len() < 2 {
            return None;
        }
        let position = position.min(children.len() - 1);
        if position == from {
            return None;
        }

        children.remove(from);
        children.insert(position, id);
        self.install_children(parent, children);

        let parent_field = &self[parent];
        if parent_field.is_array() {
            parent_field.children.get(from).map(|c| self[*c].id.clone())
        } else {
            Some(self[id].id.clone())
        }
    }

    /// Move a field into the gap before sibling `gap` (`gap == len` is the
    /// end), as drag and drop reports it.
    pub fn sort_field_to_gap(&mut self, id: NodeId, gap: usize) -> Option<String> {
        let from = self.get(id)?.index;
        let position = if gap > from { gap - 1 } else { gap };
        self.sort_field(id, position)
    }

    /// Unique key for a new child of `parent` derived from `base`.
    ///
    /// Array keys are positional. Object keys get `_1`, `_2`, ... until
    /// no sibling other than `except` uses them.
    pub fn next_child_key(&self, parent: NodeId, base: &str, except: Option<NodeId>) -> String {
        let field = &self[parent];
        if field.is_array() {
            return field.children.len().to_string();
        }
        let taken = |key: &str| {
            field
                .children_map
                .get(key)
                .is_some_and(|c| Some(*c) != except)
        };

        let mut key = base.to_string();
        let mut n = 0;
        while taken(&key) {
            n += 1;
            key = format!("{base}_{n}");
        }
        key
    }

    /// Insertion index keeping named properties in declaration order.
    fn schema_position(&self, id: NodeId, key: &str) -> Option<usize> {
        let field = &self[id];
        let rank = field.schema.property_rank(key)?;
        let position = field
            .children
            .iter()
            .position(|c| {
                field
                    .schema
                    .property_rank(&self[*c].key)
                    .is_none_or(|r| r > rank)
            })
            .unwrap_or(field.children.len());
        Some(position)
    }

    fn free(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self[id].children);
        for c in children {
            self.free(c);
        }
        self.nodes[id.0] = None;
        self.free.push(id);
    }
}
