//! Document-order traversal for keyboard and programmatic focus.
//!
//! Traversal is computed from the current tree on every call. Callers
//! should not hold on to the result across edits.

use super::{field::NodeId, tree::FormTree};

impl FormTree {
    /// Where focus lands when `id` itself is focused: a non-calculated
    /// leaf, an empty container, or the first focusable descendant.
    pub fn focus_target(&self, id: NodeId, reverse: bool) -> Option<NodeId> {
        let field = self.get(id)?;
        if field.is.calculated {
            return None;
        }
        if field.is_leaf() || field.children.is_empty() {
            return Some(id);
        }
        self.first_focusable_child(id, reverse)
    }

    /// First (or last, with `reverse`) focusable field below `id`.
    pub fn first_focusable_child(&self, id: NodeId, reverse: bool) -> Option<NodeId> {
        let field = self.get(id)?;
        let mut children: Box<dyn Iterator<Item = &NodeId>> = if reverse {
            Box::new(field.children.iter().rev())
        } else {
            Box::new(field.children.iter())
        };
        children.find_map(|c| self.focus_target(*c, reverse))
    }

    pub fn last_focusable_child(&self, id: NodeId) -> Option<NodeId> {
        self.first_focusable_child(id, true)
    }

    /// Focusable field after (or before) the subtree of `id`.
    ///
    /// Past the last child of the root this yields the root itself; the
    /// root has no successor.
    pub fn next_focusable_field(&self, id: NodeId, reverse: bool) -> Option<NodeId> {
        let mut current = id;
        loop {
            let field = self.get(current)?;
            let parent = field.parent?;
            let siblings = &self[parent].children;
            let index = field.index;

            let found = if reverse {
                siblings[..index]
                    .iter()
                    .rev()
                    .find_map(|s| self.focus_target(*s, reverse))
            } else {
                siblings
                    .get(index + 1..)
                    .unwrap_or_default()
                    .iter()
                    .find_map(|s| self.focus_target(*s, reverse))
            };
            if found.is_some() {
                return found;
            }
            if parent == self.root {
                return Some(parent);
            }
            current = parent;
        }
    }

    pub fn prev_focusable_field(&self, id: NodeId) -> Option<NodeId> {
        self.next_focusable_field(id, true)
    }
}
