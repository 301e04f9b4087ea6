//! Structural normalization of loaded notebooks
//!
//! Infallible and typed: the input is a `Notebook`, the output is the same
//! `Notebook` with the fixes below applied in place.

use std::collections::HashSet;

use serde_json::Value;
use uuid::Uuid;

use super::model::Notebook;

/// First nbformat 4 minor version where cell ids are part of the schema.
const CELL_ID_MINOR: u32 = 5;

/// Normalize `notebook` in place; returns whether anything changed.
///
/// - every cell gets a non-empty id, unique within the notebook
/// - `nbformat_minor` is raised to 5 for v4 notebooks (ids need 4.5)
/// - code cells carry `outputs` and `execution_count`
/// - other cells carry neither
pub fn normalize(notebook: &mut Notebook) -> bool {
    let mut changed = false;
    let mut seen = HashSet::new();

    for cell in &mut notebook.cells {
        let needs_id = match cell.id.as_deref() {
            Some(id) if valid_id(id) => !seen.insert(id.to_string()),
            _ => true,
        };
        if needs_id {
            let id = fresh_id(&seen);
            seen.insert(id.clone());
            cell.id = Some(id);
            changed = true;
        }

        if cell.is_code() {
            if cell.outputs.is_none() {
                cell.outputs = Some(Vec::new());
                changed = true;
            }
            if !cell.extra.contains_key("execution_count") {
                cell.extra.insert("execution_count".to_string(), Value::Null);
                changed = true;
            }
        } else {
            changed |= cell.outputs.take().is_some();
            changed |= cell.extra.remove("execution_count").is_some();
        }
    }

    if notebook.nbformat == 4 && notebook.nbformat_minor < CELL_ID_MINOR {
        notebook.nbformat_minor = CELL_ID_MINOR;
        changed = true;
    }

    if changed {
        tracing::debug!(cells = notebook.cells.len(), "normalized notebook structure");
    }
    changed
}

/// nbformat cell id rule: 1-64 chars of `[a-zA-Z0-9-_]`.
fn valid_id(id: &str) -> bool {
    (1..=64).contains(&id.len()) && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn fresh_id(seen: &HashSet<String>) -> String {
    loop {
        let id = Uuid::new_v4().simple().to_string();
        if !seen.contains(&id) {
            return id;
        }
    }
}
