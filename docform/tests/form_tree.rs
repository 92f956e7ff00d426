use std::sync::Arc;

use chrono::NaiveDate;
use docform::{
    model::{FieldError, FieldOption, FormTree, NodeId, TreeOptions},
    schema::Schema,
};
use serde_json::{Value, json};

fn options() -> TreeOptions {
    TreeOptions {
        salt: Some("s".into()),
        today: NaiveDate::from_ymd_opt(2024, 3, 1),
        ..Default::default()
    }
}

fn schema(value: Value) -> Arc<Schema> {
    Arc::new(Schema::from_value(&value).unwrap())
}

fn tree(s: Value, value: Value) -> FormTree {
    FormTree::with_options(schema(s), value, options())
}

fn child(t: &FormTree, parent: NodeId, key: &str) -> NodeId {
    t[parent].child(key).unwrap()
}

fn keys(t: &FormTree, id: NodeId) -> Vec<String> {
    t[id].children().iter().map(|c| t[*c].key().to_string()).collect()
}

fn assert_dense(t: &FormTree, id: NodeId) {
    let indices: Vec<usize> = t[id].children().iter().map(|c| t[*c].index()).collect();
    assert_eq!(indices, (0..indices.len()).collect::<Vec<_>>());
}

fn option(t: &FormTree, id: NodeId, key: &str) -> FieldOption {
    t[id].options().iter().find(|o| o.key == key).cloned().unwrap()
}

fn invoice_schema() -> Value {
    json!({
        "$id": "https://example.com/invoice",
        "type": "object",
        "required": ["code", "issue_date", "currency", "lines", "meta"],
        "properties": {
            "code": {"type": "string"},
            "issue_date": {"type": "string", "format": "date"},
            "currency": {"oneOf": [
                {"const": "EUR", "description": "Euro"},
                {"const": "USD", "description": "US Dollar"}
            ]},
            "lines": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["quantity", "item"],
                    "properties": {
                        "quantity": {"type": "number"},
                        "item": {
                            "type": "object",
                            "required": ["name"],
                            "properties": {"name": {"type": "string"}}
                        }
                    }
                }
            },
            "meta": {
                "type": "object",
                "patternProperties": {".*": {"type": "string"}}
            },
            "notes": {"type": "string"}
        }
    })
}

#[test]
fn empty_root_gets_designator_and_required_defaults() {
    let t = FormTree::with_options(
        schema(json!({
            "$id": "https://example.com/person",
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": {"type": "string"},
                "age": {"type": "integer"}
            }
        })),
        Value::Null,
        options(),
    );

    assert_eq!(
        t.value(),
        json!({"$schema": "https://example.com/person", "name": ""})
    );
    assert_eq!(t[t.root()].id(), "s_person");
    assert_eq!(keys(&t, t.root()), ["$schema", "name"]);
}

#[test]
fn generated_defaults_round_trip() {
    let generated = FormTree::with_options(schema(invoice_schema()), Value::Null, options()).value();
    assert_eq!(
        generated,
        json!({
            "$schema": "https://example.com/invoice",
            "code": "",
            "issue_date": "2024-03-01",
            "currency": "EUR",
            "lines": [{"quantity": 0, "item": {"name": ""}}],
            "meta": {"key": ""}
        })
    );

    let rebuilt = tree(invoice_schema(), generated.clone());
    assert_eq!(rebuilt.value(), generated);
}

#[test]
fn canonical_text_uses_four_spaces() {
    let t = tree(
        json!({"type": "object", "properties": {"a": {"type": "integer"}}}),
        json!({"a": 1}),
    );
    assert_eq!(t.to_json(), "{\n    \"a\": 1\n}");
}

#[test]
fn sorting_moves_to_final_index() {
    let mut t = tree(
        json!({"type": "array", "items": {"type": "string"}}),
        json!(["a", "b", "c", "d"]),
    );
    let root = t.root();
    let first = child(&t, root, "0");

    let focus = t.sort_field(first, 2);
    assert_eq!(t.value(), json!(["b", "c", "a", "d"]));
    assert_eq!(keys(&t, root), ["0", "1", "2", "3"]);
    assert_dense(&t, root);
    // The vacated slot now holds "b".
    assert_eq!(focus.as_deref(), Some("s_root-0"));
    assert_eq!(t[first].key(), "2");
}

#[test]
fn sorting_to_the_same_place_is_a_noop() {
    let mut t = tree(
        json!({"type": "array", "items": {"type": "string"}}),
        json!(["a", "b"]),
    );
    let first = child(&t, t.root(), "0");
    assert_eq!(t.sort_field(first, 0), None);

    let mut single = tree(json!({"type": "array", "items": {"type": "string"}}), json!(["a"]));
    let only = child(&single, single.root(), "0");
    assert_eq!(single.sort_field(only, 1), None);
}

#[test]
fn drag_gap_accounts_for_removed_field() {
    let mut t = tree(
        json!({"type": "array", "items": {"type": "string"}}),
        json!(["a", "b", "c", "d"]),
    );
    let first = child(&t, t.root(), "0");
    t.sort_field_to_gap(first, 3);
    assert_eq!(t.value(), json!(["b", "c", "a", "d"]));
}

#[test]
fn sorting_object_fields_returns_moved_id() {
    let mut t = tree(
        json!({"type": "object", "patternProperties": {".*": {"type": "integer"}}}),
        json!({"a": 1, "b": 2, "c": 3}),
    );
    let a = child(&t, t.root(), "a");
    assert_eq!(t.sort_field(a, 2).as_deref(), Some("s_root-a"));
    assert_eq!(keys(&t, t.root()), ["b", "c", "a"]);
    assert_eq!(t.to_json(), "{\n    \"b\": 2,\n    \"c\": 3,\n    \"a\": 1\n}");
}

#[test]
fn calculated_containers_propagate_to_descendants() {
    let t = tree(
        json!({
            "type": "object",
            "properties": {
                "totals": {
                    "type": "object",
                    "calculated": true,
                    "properties": {
                        "sum": {"type": "number"},
                        "taxes": {
                            "type": "array",
                            "items": {"type": "object", "properties": {"rate": {"type": "string"}}}
                        }
                    }
                }
            }
        }),
        json!({"totals": {"sum": 10, "taxes": [{"rate": "standard"}]}}),
    );

    let totals = child(&t, t.root(), "totals");
    let mut stack = vec![totals];
    let mut seen = 0;
    while let Some(id) = stack.pop() {
        let field = &t[id];
        assert!(field.flags().calculated, "{} is not calculated", field.id());
        assert!(!field.flags().editable);
        assert!(field.options().is_empty());
        stack.extend(field.children().iter().copied());
        seen += 1;
    }
    assert_eq!(seen, 5);
}

#[test]
fn traversal_visits_every_leaf_once() {
    let t = tree(
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "uuid": {"type": "string", "calculated": true},
                "address": {
                    "type": "object",
                    "properties": {
                        "street": {"type": "string"},
                        "code": {"type": "string"}
                    }
                },
                "tags": {"type": "array", "items": {"type": "string"}},
                "notes": {"type": "string"}
            }
        }),
        json!({
            "name": "Acme",
            "uuid": "u",
            "address": {"street": "Main", "code": "1"},
            "tags": ["a", "b"],
            "notes": ""
        }),
    );

    let first = t.first_focusable_child(t.root(), false).unwrap();
    let mut visited = vec![t[first].id().to_string()];
    let mut current = first;
    for _ in 0..5 {
        current = t.next_focusable_field(current, false).unwrap();
        visited.push(t[current].id().to_string());
    }
    assert_eq!(
        visited,
        [
            "s_root-name",
            "s_root-address-street",
            "s_root-address-code",
            "s_root-tags-0",
            "s_root-tags-1",
            "s_root-notes",
        ]
    );
    assert_eq!(t.next_focusable_field(current, false), Some(t.root()));

    let last = t.last_focusable_child(t.root()).unwrap();
    assert_eq!(t[last].key(), "notes");
    let back = t.prev_focusable_field(last).unwrap();
    assert_eq!(t[back].id(), "s_root-tags-1");
}

#[test]
fn dictionary_entries_are_not_reoffered() {
    let mut t = tree(
        json!({"type": "object", "patternProperties": {".*": {"type": "integer"}}}),
        json!({"a": 1, "foo": 2, "b": 3}),
    );
    let root = t.root();
    let foo = child(&t, root, "foo");

    assert!(t.delete(foo));
    assert!(!t.contains(foo));
    assert_eq!(keys(&t, root), ["a", "b"]);
    assert_dense(&t, root);
    let offered: Vec<&str> = t[root].options().iter().map(|o| o.key.as_str()).collect();
    assert_eq!(offered, ["key"]);
    assert_eq!(t.value(), json!({"a": 1, "b": 3}));
}

#[test]
fn deleted_properties_are_reoffered_in_schema_order() {
    let mut t = tree(
        json!({
            "type": "object",
            "properties": {
                "a": {"type": "string"},
                "b": {"type": "string"},
                "c": {"type": "string"}
            }
        }),
        json!({"a": "", "b": "", "c": ""}),
    );
    let root = t.root();
    assert!(t[root].flags().complete);

    let c = child(&t, root, "c");
    let a = child(&t, root, "a");
    assert!(t.delete(c));
    assert!(t.delete(a));
    let offered: Vec<&str> = t[root].options().iter().map(|o| o.key.as_str()).collect();
    assert_eq!(offered, ["a", "c"]);
    assert!(!t[root].flags().complete);
}

#[test]
fn duplicating_array_element_appends_positional_key() {
    let mut t = tree(
        json!({"type": "array", "items": {"type": "string"}}),
        json!(["x", "y"]),
    );
    let root = t.root();
    let second = child(&t, root, "1");

    let copy = t.duplicate(second).unwrap();
    assert_eq!(t[copy].key(), "2");
    assert_eq!(t.value(), json!(["x", "y", "y"]));

    let first = child(&t, root, "0");
    let copy = t.duplicate(first).unwrap();
    assert_eq!(t[copy].index(), 1);
    assert_eq!(keys(&t, root), ["0", "1", "2", "3"]);
    assert_eq!(t.value(), json!(["x", "x", "y", "y"]));
}

#[test]
fn duplicating_subtrees_copies_values() {
    let mut t = tree(
        json!({
            "type": "object",
            "patternProperties": {
                ".*": {"type": "object", "properties": {"n": {"type": "integer"}}}
            }
        }),
        json!({"first": {"n": 1}, "second": {"n": 2}}),
    );
    let root = t.root();
    let first = child(&t, root, "first");

    let copy = t.duplicate(first).unwrap();
    assert_eq!(t[copy].key(), "first_1");
    assert_eq!(keys(&t, root), ["first", "first_1", "second"]);
    assert_eq!(t[copy].id(), "s_root-first_1");
    assert_eq!(t.value()["first_1"], json!({"n": 1}));
}

#[test]
fn root_cannot_be_deleted_or_duplicated() {
    let mut t = FormTree::with_options(
        schema(json!({"$id": "https://example.com/note", "type": "object"})),
        Value::Null,
        options(),
    );
    let root = t.root();
    assert!(!t.delete(root));
    assert_eq!(t.duplicate(root), None);

    let designator = child(&t, root, "$schema");
    assert!(!t[designator].flags().disposable);
    assert!(!t.delete(designator));
}

#[test]
fn renaming_keeps_keys_unique() {
    let mut t = tree(
        json!({"type": "object", "patternProperties": {".*": {"type": "integer"}}}),
        json!({"a": 1, "b": 2}),
    );
    let root = t.root();
    let b = child(&t, root, "b");

    assert!(t.set_key(b, "a"));
    assert_eq!(t[b].key(), "a_1");
    assert_eq!(keys(&t, root), ["a", "a_1"]);
    assert_eq!(t.value(), json!({"a": 1, "a_1": 2}));
    assert!(!t.set_key(b, "a_1"));
    assert_eq!(t.find_field_by_id("s_root-a_1"), Some(b));
}

#[test]
fn named_properties_cannot_be_renamed() {
    let mut t = tree(
        json!({"type": "object", "properties": {"name": {"type": "string"}}}),
        json!({"name": "x"}),
    );
    let name = child(&t, t.root(), "name");
    assert!(!t.set_key(name, "title"));
    assert_eq!(t[name].key(), "name");
}

#[test]
fn added_properties_follow_schema_order() {
    let mut t = tree(
        json!({
            "type": "object",
            "required": ["a"],
            "properties": {
                "a": {"type": "string"},
                "b": {"type": "integer"},
                "c": {"type": "string"}
            }
        }),
        json!({"c": "z"}),
    );
    let root = t.root();

    let a = option(&t, root, "a");
    assert!(a.required);
    t.add_child_field(root, &a, None, None).unwrap();
    let b = option(&t, root, "b");
    t.add_child_field(root, &b, None, None).unwrap();

    assert_eq!(keys(&t, root), ["a", "b", "c"]);
    assert_dense(&t, root);
    assert_eq!(t.value(), json!({"a": "", "b": 0, "c": "z"}));
    assert!(t[root].flags().complete);
    assert_eq!(t.add_child_field(root, &a, None, None), None);
}

#[test]
fn added_fields_use_given_default() {
    let mut t = tree(
        json!({"type": "array", "items": {"type": "string"}}),
        json!([]),
    );
    let root = t.root();
    assert!(t[root].flags().empty);

    let item = option(&t, root, "item");
    let added = t.add_child_field(root, &item, Some(json!("hello")), None).unwrap();
    assert_eq!(t[added].key(), "0");
    assert_eq!(t.value(), json!(["hello"]));
    assert!(!t[root].flags().empty);
}

#[test]
fn tuple_arrays_become_complete() {
    let mut t = tree(
        json!({
            "type": "array",
            "items": [{"type": "string"}, {"type": "integer"}]
        }),
        json!(["x"]),
    );
    let root = t.root();
    let next = option(&t, root, "item");
    assert_eq!(next.schema.kind.map(|k| k.as_str()), Some("integer"));

    t.add_child_field(root, &next, None, None).unwrap();
    assert_eq!(t.value(), json!(["x", 0]));
    assert!(t[root].flags().complete);
    assert_eq!(t.add_child_field(root, &next, None, None), None);
}

#[test]
fn unparseable_text_is_a_root_error() {
    let t = FormTree::from_text(
        schema(json!({"type": "object", "properties": {"a": {"type": "string"}}})),
        "{\"a\": ",
        options(),
    );
    let root = &t[t.root()];
    assert_eq!(root.error(), Some(&FieldError::Unparsed));
    assert!(root.children().is_empty());
    assert_eq!(t.value(), json!("{\"a\": "));
}

#[test]
fn mismatched_container_keeps_raw_value() {
    let t = tree(
        json!({
            "type": "object",
            "properties": {
                "address": {"type": "object", "properties": {"street": {"type": "string"}}}
            }
        }),
        json!({"address": "Main St"}),
    );
    let address = &t[child(&t, t.root(), "address")];
    assert_eq!(
        address.error(),
        Some(&FieldError::TypeMismatch { expected: "object" })
    );
    assert!(address.children().is_empty());
    assert!(address.options().is_empty());
    assert_eq!(t.value(), json!({"address": "Main St"}));
}

#[test]
fn unknown_keys_survive_as_plain_fields() {
    let t = tree(
        json!({"type": "object", "properties": {"a": {"type": "string"}}}),
        json!({"a": "x", "extra": {"nested": [1, 2]}}),
    );
    let extra = child(&t, t.root(), "extra");
    assert!(t[extra].children().is_empty());
    assert_eq!(t.value(), json!({"a": "x", "extra": {"nested": [1, 2]}}));
}

#[test]
fn ids_resolve_back_to_fields() {
    let t = tree(invoice_schema(), json!({"lines": [{"item": {"name": "Widget"}}]}));
    let lines = child(&t, t.root(), "lines");
    let line = child(&t, lines, "0");
    let item = child(&t, line, "item");
    let name = child(&t, item, "name");

    assert_eq!(t[name].id(), "s_invoice-lines-0-item-name");
    assert_eq!(t.find_field_by_id("s_invoice-lines-0-item-name"), Some(name));
    assert_eq!(t.find_field_by_id("s_invoice"), Some(t.root()));
    assert_eq!(t.find_field_by_id("s_invoice-lines-1"), None);
    assert_eq!(t.find_field_by_id("x_invoice-lines"), None);
    assert_eq!(t[name].level(), 4);
}

#[test]
fn slugs_disambiguate_colliding_keys() {
    let t = tree(
        json!({"type": "object", "patternProperties": {".*": {"type": "string"}}}),
        json!({"a b": "1", "ab": "2", "!": "3"}),
    );
    let ids: Vec<String> = t[t.root()]
        .children()
        .iter()
        .map(|c| t[*c].id().to_string())
        .collect();
    assert_eq!(ids, ["s_root-ab", "s_root-ab_1", "s_root-_"]);
    for id in &ids {
        assert!(t.find_field_by_id(id).is_some());
    }
}

#[test]
fn validity_is_recomputed_on_request() {
    let mut t = tree(
        json!({
            "type": "object",
            "required": ["code"],
            "properties": {
                "code": {"type": "string", "pattern": "^[A-Z]+$"},
                "count": {"type": "integer", "pattern": "^[0-9]$"}
            }
        }),
        json!({"code": "abc", "count": 42}),
    );
    let code = child(&t, t.root(), "code");
    let count = child(&t, t.root(), "count");

    assert_eq!(
        t[code].error(),
        Some(&FieldError::Pattern {
            pattern: "^[A-Z]+$".into()
        })
    );
    // Patterns only apply to strings.
    assert_eq!(t[count].error(), None);

    assert!(t.set_value(code, json!("ABC")));
    assert!(t[code].error().is_some());
    assert_eq!(t.revalidate(code), None);
    assert!(!t[code].flags().error);

    t.set_value(code, json!(""));
    assert_eq!(t.revalidate(code), Some(&FieldError::Missing));
    assert_eq!(FieldError::Missing.to_string(), "Required field");
}

#[test]
fn calculated_leaves_reject_values() {
    let mut t = tree(
        json!({"type": "object", "properties": {"uuid": {"type": "string", "calculated": true}}}),
        json!({"uuid": "u1"}),
    );
    let uuid = child(&t, t.root(), "uuid");
    assert!(!t.set_value(uuid, json!("u2")));
    assert!(!t.set_value(uuid, json!("u1")));
    assert_eq!(t.value(), json!({"uuid": "u1"}));
}

#[test]
fn mixed_edits_keep_children_consistent() {
    let mut t = tree(
        json!({"type": "object", "patternProperties": {".*": {"type": "integer"}}}),
        json!({"a": 1, "b": 2, "c": 3}),
    );
    let root = t.root();
    let entry = option(&t, root, "key");

    let added = t.add_child_field(root, &entry, None, None).unwrap();
    let dup = t.duplicate(child(&t, root, "a")).unwrap();
    t.set_key(added, "b");
    t.delete(child(&t, root, "c"));
    t.sort_field(dup, 0);

    let k = keys(&t, root);
    let mut unique = k.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), k.len());
    assert_dense(&t, root);
    for c in t[root].children() {
        assert_eq!(t[root].child(t[*c].key()), Some(*c));
        assert_eq!(t.find_field_by_id(t[*c].id()), Some(*c));
    }
    assert_eq!(k, ["a_1", "a", "b", "b_1"]);
}

#[test]
fn sibling_ids_survive_deleting_and_moving_colliding_keys() {
    let mut t = tree(
        json!({"type": "object", "patternProperties": {".*": {"type": "string"}}}),
        json!({"a b": "1", "ab": "2", "ab_1": "3"}),
    );
    let root = t.root();
    let spaced = child(&t, root, "a b");
    let plain = child(&t, root, "ab");
    let suffixed = child(&t, root, "ab_1");
    let plain_id = t[plain].id().to_string();
    let suffixed_id = t[suffixed].id().to_string();
    assert_eq!(plain_id, "s_root-ab_1");
    assert_eq!(suffixed_id, "s_root-ab_1_1");

    assert!(t.delete(spaced));
    assert_eq!(t[plain].id(), plain_id);
    assert_eq!(t[suffixed].id(), suffixed_id);
    assert_eq!(t.find_field_by_id(&plain_id), Some(plain));
    assert_eq!(t.find_field_by_id(&suffixed_id), Some(suffixed));
    assert_eq!(t.find_field_by_id("s_root-ab"), None);

    t.sort_field(suffixed, 0);
    assert_eq!(keys(&t, root), ["ab_1", "ab"]);
    assert_eq!(t.find_field_by_id(&plain_id), Some(plain));
    assert_eq!(t.find_field_by_id(&suffixed_id), Some(suffixed));

    let entry = option(&t, root, "key");
    let added = t.add_child_field(root, &entry, Some(json!("4")), None).unwrap();
    assert_eq!(t[added].id(), "s_root-key");
    assert_eq!(t.find_field_by_id(&plain_id), Some(plain));
}

#[test]
fn renaming_gives_a_fresh_id() {
    let mut t = tree(
        json!({"type": "object", "patternProperties": {".*": {"type": "string"}}}),
        json!({"a b": "1", "ab": "2"}),
    );
    let root = t.root();
    let spaced = child(&t, root, "a b");
    let plain = child(&t, root, "ab");

    assert!(t.set_key(spaced, "x"));
    assert_eq!(t[spaced].id(), "s_root-x");
    assert_eq!(t[plain].id(), "s_root-ab_1");
    assert_eq!(t.find_field_by_id("s_root-x"), Some(spaced));
}

#[test]
fn hyphenated_salt_keeps_ids_resolvable() {
    let t = FormTree::with_options(
        schema(json!({"type": "object", "properties": {"name": {"type": "string"}}})),
        json!({"name": "x"}),
        TreeOptions {
            salt: Some("my-form".into()),
            ..Default::default()
        },
    );
    let name = child(&t, t.root(), "name");
    assert_eq!(t[t.root()].id(), "myform_root");
    assert_eq!(t[name].id(), "myform_root-name");
    assert_eq!(t.find_field_by_id(t[name].id()), Some(name));
}

#[test]
fn removed_slots_are_reused() {
    let mut t = tree(
        json!({"type": "array", "items": {"type": "string"}}),
        json!(["a", "b"]),
    );
    let root = t.root();
    let item = option(&t, root, "item");
    let before = t.len();

    for _ in 0..10 {
        let added = t.add_child_field(root, &item, None, None).unwrap();
        assert!(t.delete(added));
    }
    assert_eq!(t.len(), before);

    let second = child(&t, root, "1");
    assert!(t.delete(second));
    let added = t.add_child_field(root, &item, None, None).unwrap();
    assert_eq!(added, second);
    assert_eq!(t.len(), before);
    assert_eq!(t.value(), json!(["a", ""]));
}

#[test]
fn reordering_requires_the_current_children() {
    let mut t = tree(
        json!({"type": "array", "items": {"type": "integer"}}),
        json!([1, 2, 3]),
    );
    let root = t.root();
    let children = t[root].children().to_vec();

    let mut missing = children.clone();
    missing.pop();
    assert!(!t.update_children(root, missing));
    let mut foreign = children.clone();
    foreign[0] = root;
    assert!(!t.update_children(root, foreign));
    assert_eq!(t.value(), json!([1, 2, 3]));

    let reversed: Vec<NodeId> = children.iter().rev().copied().collect();
    assert!(t.update_children(root, reversed));
    assert_eq!(t.value(), json!([3, 2, 1]));
    assert_eq!(keys(&t, root), ["0", "1", "2"]);
    assert_dense(&t, root);
}
