//! Typed notebook document (nbformat v4)
//!
//! Only the fields the harness reads or normalizes are typed; everything else
//! round-trips through the flattened `extra` maps untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Cell tag marking an exception as part of the lesson, not a failure.
pub const RAISES_EXCEPTION_TAG: &str = "raises-exception";

fn default_nbformat() -> u32 {
    4
}

/// A notebook document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default = "default_nbformat")]
    pub nbformat: u32,
    #[serde(default)]
    pub nbformat_minor: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Notebook {
    /// Index of the first cell that recorded an unexpected error output.
    ///
    /// Cells tagged `raises-exception` are allowed to error.
    pub fn first_error_cell(&self) -> Option<usize> {
        self.cells
            .iter()
            .position(|cell| !cell.expects_error() && cell.error_output().is_some())
    }
}

/// One cell (step) of a notebook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub cell_type: String,
    #[serde(default)]
    pub source: Source,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<Output>>,
    /// `execution_count`, `attachments` and anything else
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Cell {
    pub fn is_code(&self) -> bool {
        self.cell_type == "code"
    }

    /// Whether the cell carries the `raises-exception` tag.
    pub fn expects_error(&self) -> bool {
        self.metadata
            .get("tags")
            .and_then(Value::as_array)
            .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some(RAISES_EXCEPTION_TAG)))
    }

    /// The last `error` output recorded on this cell.
    pub fn error_output(&self) -> Option<RecordedError> {
        self.outputs.as_ref()?.iter().rev().find_map(Output::as_error)
    }

    /// The first `max_lines` lines of source.
    pub fn snippet(&self, max_lines: usize) -> String {
        self.source.text().lines().take(max_lines).collect::<Vec<_>>().join("\n")
    }
}

/// Cell source: nbformat allows a single string or a list of line strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Lines(Vec<String>),
    Text(String),
}

impl Default for Source {
    fn default() -> Self {
        Source::Text(String::new())
    }
}

impl Source {
    pub fn text(&self) -> String {
        match self {
            Source::Lines(lines) => lines.concat(),
            Source::Text(text) => text.clone(),
        }
    }
}

/// One output of a code cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub output_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Error fields recorded in an `error` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError {
    pub ename: Option<String>,
    pub evalue: Option<String>,
    pub traceback: Vec<String>,
}

impl Output {
    pub fn as_error(&self) -> Option<RecordedError> {
        if self.output_type != "error" {
            return None;
        }
        let text = |key: &str| self.extra.get(key).and_then(Value::as_str).map(str::to_string);
        let traceback = self
            .extra
            .get("traceback")
            .and_then(Value::as_array)
            .map(|lines| lines.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        Some(RecordedError {
            ename: text("ename"),
            evalue: text("evalue"),
            traceback,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_forms() {
        let lines: Source = serde_json::from_value(json!(["a = 1\n", "b = 2"])).unwrap();
        assert_eq!(lines.text(), "a = 1\nb = 2");
        let text: Source = serde_json::from_value(json!("x = 3")).unwrap();
        assert_eq!(text.text(), "x = 3");
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let raw = json!({
            "cells": [{
                "cell_type": "code",
                "execution_count": null,
                "metadata": {"tags": ["slow"]},
                "outputs": [],
                "source": "print(1)"
            }],
            "metadata": {"kernelspec": {"name": "python3"}},
            "nbformat": 4,
            "nbformat_minor": 5
        });
        let nb: Notebook = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&nb).unwrap(), raw);
    }

    #[test]
    fn test_error_output_fields() {
        let cell: Cell = serde_json::from_value(json!({
            "cell_type": "code",
            "source": ["1/0"],
            "outputs": [
                {"output_type": "stream", "name": "stdout", "text": "hi"},
                {"output_type": "error", "ename": "ZeroDivisionError", "evalue": "division by zero",
                 "traceback": ["line 1", "line 2"]}
            ]
        }))
        .unwrap();
        let err = cell.error_output().unwrap();
        assert_eq!(err.ename.as_deref(), Some("ZeroDivisionError"));
        assert_eq!(err.evalue.as_deref(), Some("division by zero"));
        assert_eq!(err.traceback, vec!["line 1", "line 2"]);
    }

    #[test]
    fn test_tagged_error_cells_are_expected() {
        let nb: Notebook = serde_json::from_value(json!({
            "cells": [
                {"cell_type": "code", "metadata": {"tags": ["raises-exception"]}, "source": "1/0",
                 "outputs": [{"output_type": "error", "ename": "ZeroDivisionError", "evalue": "division by zero",
                              "traceback": []}]},
                {"cell_type": "code", "metadata": {"tags": ["slow"]}, "source": "x = 1", "outputs": []}
            ],
            "metadata": {},
            "nbformat": 4,
            "nbformat_minor": 5
        }))
        .unwrap();
        assert!(nb.cells[0].expects_error());
        assert!(!nb.cells[1].expects_error());
        assert_eq!(nb.first_error_cell(), None);

        let mut failing = nb.clone();
        failing.cells[1].outputs = failing.cells[0].outputs.clone();
        assert_eq!(failing.first_error_cell(), Some(1));
    }
}
