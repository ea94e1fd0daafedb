//! Record flattening
//!
//! Converts nested Open Context records into a flat `Table`, one row per
//! record. Multi-valued attributes are collapsed according to a
//! `FlattenConfig` passed into each call.

mod table;

pub use table::{context_column, Cell, Column, Table, DEFAULT_FIRST_COLUMNS};

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::record::{display_value, is_numeric, labeled_uri, Record};

/// Attribute holding the slash separated context path of a record
pub const CONTEXT_ATTRIBUTE: &str = "context label";

/// Separator used by `concat` unless configured otherwise
pub const DEFAULT_DELIMITER: &str = "; ";

/// Suffix of the companion column holding the URI of a nested value
pub const URI_SUFFIX: &str = " [URI]";

/// Error for an unrecognised multi-value mode name
#[derive(Debug, Error)]
#[error("unknown multi-value mode '{0}'. Valid modes: first, last, json, concat, column_val")]
pub struct UnknownModeError(pub String);

/// How an attribute with several values becomes table cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MultiValueMode {
    /// Keep the first value
    First,
    /// Keep the last value
    Last,
    /// Serialize all values as a JSON array string
    Json,
    /// Join all values with the configured delimiter
    Concat,
    /// One boolean column per value, named `"<attribute> :: <value>"`
    ColumnVal,
}

impl MultiValueMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MultiValueMode::First => "first",
            MultiValueMode::Last => "last",
            MultiValueMode::Json => "json",
            MultiValueMode::Concat => "concat",
            MultiValueMode::ColumnVal => "column_val",
        }
    }
}

impl FromStr for MultiValueMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" => Ok(MultiValueMode::First),
            "last" => Ok(MultiValueMode::Last),
            "json" => Ok(MultiValueMode::Json),
            "concat" => Ok(MultiValueMode::Concat),
            "column_val" | "column-val" => Ok(MultiValueMode::ColumnVal),
            _ => Err(UnknownModeError(s.to_string())),
        }
    }
}

impl fmt::Display for MultiValueMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multi-value handling for one `flatten` call
#[derive(Debug, Clone)]
pub struct FlattenConfig {
    /// Mode for multi-valued attributes that are not all numeric
    pub default_mode: MultiValueMode,
    /// Mode for multi-valued attributes whose values are all numeric
    pub number_mode: MultiValueMode,
    /// Joiner for `concat`
    pub delimiter: String,
    /// Per-attribute overrides, taking priority over both defaults
    pub keyed_modes: HashMap<String, MultiValueMode>,
    /// Split `context label` paths into `Context (n)` columns
    pub split_contexts: bool,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        let mut keyed_modes = HashMap::new();
        // Fusion states read best as a handful of presence columns
        keyed_modes.insert("Has fusion character".to_string(), MultiValueMode::ColumnVal);
        Self {
            default_mode: MultiValueMode::Concat,
            number_mode: MultiValueMode::First,
            delimiter: DEFAULT_DELIMITER.to_string(),
            keyed_modes,
            split_contexts: true,
        }
    }
}

impl FlattenConfig {
    pub fn with_default_mode(mut self, mode: MultiValueMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn with_number_mode(mut self, mode: MultiValueMode) -> Self {
        self.number_mode = mode;
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_keyed_mode(mut self, attribute: impl Into<String>, mode: MultiValueMode) -> Self {
        self.keyed_modes.insert(attribute.into(), mode);
        self
    }

    pub fn with_split_contexts(mut self, split: bool) -> Self {
        self.split_contexts = split;
        self
    }

    /// Mode applied to a multi-valued attribute
    fn mode_for(&self, attribute: &str, values: &[&Value]) -> MultiValueMode {
        if let Some(mode) = self.keyed_modes.get(attribute) {
            return *mode;
        }
        if values.iter().all(|v| is_numeric(v)) {
            self.number_mode
        } else {
            self.default_mode
        }
    }
}

/// Where a cell came from; a higher rank wins when two writes hit one column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Source {
    Scalar,
    OneHot,
    Nested,
}

/// Cells of a row under construction, keyed by column name
#[derive(Debug, Default)]
struct RowBuilder {
    cells: Vec<(String, Cell, Source)>,
    index: HashMap<String, usize>,
}

impl RowBuilder {
    fn set(&mut self, column: String, cell: Cell, source: Source) {
        if let Some(&i) = self.index.get(&column) {
            let slot = &mut self.cells[i];
            if source >= slot.2 {
                slot.1 = cell;
                slot.2 = source;
            }
            return;
        }
        self.index.insert(column.clone(), self.cells.len());
        self.cells.push((column, cell, source));
    }
}

/// Flattens `records` into a table with one row per record
///
/// Columns are the union over all records in first-seen order. One-hot
/// columns default to `false` for rows that lack the value; other columns
/// default to absent. When two cells of one row land on the same column,
/// nested label/URI cells beat one-hot cells, which beat plain values.
pub fn flatten(records: &[Record], config: &FlattenConfig) -> Table {
    let mut table = Table::new();
    for record in records {
        let (row, depth) = flatten_record(record, config);
        table.note_context_depth(depth);
        let cells = row
            .cells
            .into_iter()
            .map(|(name, cell, source)| {
                let default = match source {
                    Source::OneHot => Some(Cell::Bool(false)),
                    _ => None,
                };
                (table.ensure_column(&name, default), cell)
            })
            .collect();
        table.push_row(cells);
    }
    debug!(rows = table.len(), columns = table.columns().len(), "flattened records");
    table
}

/// Builds the cells of one record, returning them with its context depth
fn flatten_record(record: &Record, config: &FlattenConfig) -> (RowBuilder, usize) {
    let mut row = RowBuilder::default();
    let mut depth = 0;

    for (key, value) in record {
        if config.split_contexts && key == CONTEXT_ATTRIBUTE {
            if let Some(path) = value.as_str() {
                for (i, part) in path.split('/').enumerate() {
                    row.set(context_column(i + 1), Cell::Text(part.to_string()), Source::Scalar);
                    depth = i + 1;
                }
                continue;
            }
        }

        let values: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };
        match values.as_slice() {
            [] => {}
            [single] => set_single(&mut row, key, single),
            many => set_multi(&mut row, key, many, config),
        }
    }
    (row, depth)
}

fn uri_column(key: &str) -> String {
    format!("{}{}", key, URI_SUFFIX)
}

fn set_single(row: &mut RowBuilder, key: &str, value: &Value) {
    if let Some(nested) = labeled_uri(value) {
        row.set(key.to_string(), Cell::Text(nested.label), Source::Nested);
        row.set(uri_column(key), Cell::Text(nested.uri), Source::Nested);
    } else if let Some(cell) = Cell::from_json(value) {
        row.set(key.to_string(), cell, Source::Scalar);
    }
}

fn set_multi(row: &mut RowBuilder, key: &str, values: &[&Value], config: &FlattenConfig) {
    let nested: Vec<_> = values.iter().map(|v| labeled_uri(v)).collect();
    let any_nested = nested.iter().any(Option::is_some);
    let source = if any_nested { Source::Nested } else { Source::Scalar };
    // one slot per value so labels and URIs line up
    let uris: Vec<&str> = nested
        .iter()
        .map(|n| n.as_ref().map_or("", |n| n.uri.as_str()))
        .collect();

    let label_of = |i: usize| match &nested[i] {
        Some(n) => n.label.clone(),
        None => display_value(values[i]),
    };

    match config.mode_for(key, values) {
        MultiValueMode::First => set_single(row, key, values[0]),
        MultiValueMode::Last => set_single(row, key, values[values.len() - 1]),
        MultiValueMode::Concat => {
            let joined = (0..values.len())
                .map(label_of)
                .collect::<Vec<_>>()
                .join(&config.delimiter);
            row.set(key.to_string(), Cell::Text(joined), source);
            if any_nested {
                row.set(uri_column(key), Cell::Text(uris.join(&config.delimiter)), source);
            }
        }
        MultiValueMode::Json => {
            let items: Vec<Value> = (0..values.len())
                .map(|i| match &nested[i] {
                    Some(n) => Value::String(n.label.clone()),
                    None => values[i].clone(),
                })
                .collect();
            row.set(key.to_string(), Cell::Text(Value::Array(items).to_string()), source);
            if any_nested {
                let uri_json = Value::from(uris).to_string();
                row.set(uri_column(key), Cell::Text(uri_json), source);
            }
        }
        MultiValueMode::ColumnVal => {
            for i in 0..values.len() {
                let column = format!("{} :: {}", key, label_of(i));
                row.set(column, Cell::Bool(true), Source::OneHot);
            }
        }
    }
}
