//! Subcommand handlers.
//!
//! Handlers that change the document print (or write) the resulting JSON
//! and log the id of the field the edit produced.

use std::io::Read;

use anyhow::{Context, Result, anyhow, bail};
use colored::Colorize;
use docform::{
    FormConfig, FormTree, NodeId, WorkerError,
    model::{FieldValue, OutlineRow, to_json_text},
};
use serde_json::Value;

use crate::ctx::AppContext;

fn field(tree: &FormTree, id: &str) -> Result<NodeId> {
    tree.find_field_by_id(id)
        .ok_or_else(|| anyhow!("no field with id {id}"))
}

fn parse_value(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("--value is not JSON: {raw}"))
}

/// Print the field tree, one row per field.
pub async fn outline(ctx: &mut AppContext, schema: Option<&str>, json: bool) -> Result<()> {
    let tree = ctx.load_tree(schema).await?;
    let rows = tree.outline();
    if json {
        println!("{}", to_json_text(&serde_json::to_value(&rows)?));
        return Ok(());
    }
    for row in &rows {
        println!("{}", render_row(row));
    }
    Ok(())
}

/// Print the default document of a schema.
pub async fn default_document(ctx: &mut AppContext, schema: Option<&str>) -> Result<()> {
    let url = schema.ok_or_else(|| anyhow!("default needs --schema"))?;
    let schema = ctx.schema(url).await;
    let tree = FormTree::with_options(schema, FieldValue::Undefined, ctx.tree_options());
    ctx.write_output(&tree.to_json()).await
}

/// Add the option `option` to the container `parent`.
pub async fn add(
    ctx: &mut AppContext,
    schema: Option<&str>,
    parent: &str,
    option: &str,
    value: Option<&str>,
    position: Option<usize>,
) -> Result<()> {
    let mut tree = ctx.load_tree(schema).await?;
    let node = field(&tree, parent)?;
    let Some(chosen) = tree[node].options().iter().find(|o| o.key == option).cloned() else {
        let offered: Vec<&str> = tree[node].options().iter().map(|o| o.key.as_str()).collect();
        bail!(
            "{parent} does not offer {option} (available: {})",
            if offered.is_empty() { "none".to_string() } else { offered.join(", ") }
        );
    };

    let value = value.map(parse_value).transpose()?;
    let child = tree
        .add_child_field(node, &chosen, value, position)
        .ok_or_else(|| anyhow!("cannot add {option} to {parent}"))?;
    info!("added {}", tree[child].id());
    ctx.write_output(&tree.to_json()).await
}

pub async fn delete(ctx: &mut AppContext, schema: Option<&str>, id: &str) -> Result<()> {
    let mut tree = ctx.load_tree(schema).await?;
    let node = field(&tree, id)?;
    if !tree.delete(node) {
        bail!("{id} cannot be deleted");
    }
    ctx.write_output(&tree.to_json()).await
}

pub async fn duplicate(ctx: &mut AppContext, schema: Option<&str>, id: &str) -> Result<()> {
    let mut tree = ctx.load_tree(schema).await?;
    let node = field(&tree, id)?;
    let copy = tree
        .duplicate(node)
        .ok_or_else(|| anyhow!("{id} cannot be duplicated"))?;
    info!("duplicated as {}", tree[copy].id());
    ctx.write_output(&tree.to_json()).await
}

/// Rename a dictionary entry.
pub async fn rename(ctx: &mut AppContext, schema: Option<&str>, id: &str, key: &str) -> Result<()> {
    let mut tree = ctx.load_tree(schema).await?;
    let node = field(&tree, id)?;
    if !tree.set_key(node, key) {
        bail!("{id} cannot be renamed to {key}");
    }
    info!("renamed to {}", tree[node].key());
    ctx.write_output(&tree.to_json()).await
}

/// Set a leaf value. `raw` is parsed as JSON and kept as a string otherwise.
pub async fn set(ctx: &mut AppContext, schema: Option<&str>, id: &str, raw: &str) -> Result<()> {
    let mut tree = ctx.load_tree(schema).await?;
    let node = field(&tree, id)?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    if !tree.set_value(node, value) {
        bail!("{id} is not an editable value or already holds it");
    }
    if let Some(error) = tree.revalidate(node) {
        warn!("{id}: {error}");
    }
    ctx.write_output(&tree.to_json()).await
}

/// Move a field among its siblings.
///
/// `position` is the final index, or the drag-and-drop gap with `gap`.
pub async fn sort(
    ctx: &mut AppContext,
    schema: Option<&str>,
    id: &str,
    position: usize,
    gap: bool,
) -> Result<()> {
    let mut tree = ctx.load_tree(schema).await?;
    let node = field(&tree, id)?;
    let focus = if gap {
        tree.sort_field_to_gap(node, position)
    } else {
        tree.sort_field(node, position)
    };
    match focus {
        Some(focus) => info!("focus {focus}"),
        None => warn!("{id} was not moved"),
    }
    ctx.write_output(&tree.to_json()).await
}

/// Print the id focus moves to from `id`.
pub async fn focus(ctx: &mut AppContext, schema: Option<&str>, id: &str, reverse: bool) -> Result<()> {
    let tree = ctx.load_tree(schema).await?;
    let node = field(&tree, id)?;
    match tree.next_focusable_field(node, reverse) {
        Some(next) => println!("{}", tree[next].id()),
        None => println!("{}", "none".dimmed()),
    }
    Ok(())
}

/// Flatten a worker error, read from `message` or stdin.
pub fn errors(message: Option<String>) -> Result<()> {
    let raw = match message {
        Some(message) => message,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    let error = WorkerError::parse(raw.trim());
    if error.code != 0 {
        println!("{}", format!("code {}", error.code).bold());
    }
    for line in error.messages() {
        println!("{}", line.red());
    }
    Ok(())
}

/// Print the JSON Schema of `.docform.toml`.
pub fn config_schema() -> Result<()> {
    println!("{}", to_json_text(&FormConfig::json_schema()));
    Ok(())
}

fn flag_names(row: &OutlineRow) -> Vec<&'static str> {
    let f = &row.flags;
    [
        (f.required, "required"),
        (f.calculated, "calculated"),
        (f.editable_key, "key"),
        (f.error, "error"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect()
}

fn render_row(row: &OutlineRow) -> String {
    let mut line = format!("{}{}", "  ".repeat(row.level), row.key.bold());
    line.push_str(&format!(" {}", format!("<{}>", row.control.as_str()).cyan()));
    if let Some(kind) = row.kind {
        line.push_str(&format!(" {}", kind.dimmed()));
    }
    let flags = flag_names(row);
    if !flags.is_empty() {
        line.push_str(&format!(" {}", format!("[{}]", flags.join(", ")).yellow()));
    }
    if let Some(value) = &row.value {
        line.push_str(&format!(" = {value}"));
    }
    if let Some(error) = &row.error {
        line.push_str(&format!(" {}", format!("! {error}").red()));
    }
    line.push_str(&format!("  {}", row.id.dimmed()));
    line
}
