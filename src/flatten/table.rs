//! Flat tables built from records
//!
//! A table owns an ordered column set. Each column carries the value rows fall
//! back to when they never set it, so rows only store what they observed and
//! columns discovered late need no back-filling.

use serde_json::{Number, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Columns moved to the front by `Table::standard_order`, in this order
pub const DEFAULT_FIRST_COLUMNS: [&str; 13] = [
    "uri",
    "citation uri",
    "label",
    "item category",
    "project label",
    "project uri",
    "published",
    "updated",
    "latitude",
    "longitude",
    "early bce/ce",
    "late bce/ce",
    "context uri",
];

/// Name of the column holding the `level`-th (one-based) context path segment
pub fn context_column(level: usize) -> String {
    format!("Context ({})", level)
}

/// A single table value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(Number),
    Bool(bool),
}

impl Cell {
    /// Converts a JSON scalar; `null` has no cell, containers become JSON text
    pub fn from_json(value: &Value) -> Option<Cell> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Cell::Bool(*b)),
            Value::Number(n) => Some(Cell::Number(n.clone())),
            Value::String(s) => Some(Cell::Text(s.clone())),
            other => Some(Cell::Text(other.to_string())),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A named column and the value of rows that never set it
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub default: Option<Cell>,
}

/// Ordered rows over a unified, first-seen-ordered column set
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<Column>,
    positions: HashMap<String, usize>,
    rows: Vec<Vec<Option<Cell>>>,
    context_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Text,
    Bool,
    Other,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Deepest context path seen while building the table
    pub fn context_depth(&self) -> usize {
        self.context_depth
    }

    pub(crate) fn note_context_depth(&mut self, depth: usize) {
        self.context_depth = self.context_depth.max(depth);
    }

    /// Value of `column` in row `row`, falling back to the column default
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let pos = *self.positions.get(column)?;
        self.cell_at(row, pos)
    }

    fn cell_at(&self, row: usize, pos: usize) -> Option<&Cell> {
        self.rows
            .get(row)?
            .get(pos)
            .and_then(Option::as_ref)
            .or(self.columns[pos].default.as_ref())
    }

    /// All values of row `row` in column order
    pub fn row(&self, row: usize) -> Vec<Option<&Cell>> {
        (0..self.columns.len()).map(|pos| self.cell_at(row, pos)).collect()
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<Option<&Cell>>> + '_ {
        (0..self.rows.len()).map(move |r| self.row(r))
    }

    /// Returns the position of `name`, adding the column if it is new
    ///
    /// A column gains `default` if it had none yet.
    pub(crate) fn ensure_column(&mut self, name: &str, default: Option<Cell>) -> usize {
        if let Some(&pos) = self.positions.get(name) {
            if self.columns[pos].default.is_none() {
                self.columns[pos].default = default;
            }
            return pos;
        }
        let pos = self.columns.len();
        self.columns.push(Column {
            name: name.to_string(),
            default,
        });
        self.positions.insert(name.to_string(), pos);
        pos
    }

    /// Appends a row from `(position, value)` pairs
    pub(crate) fn push_row(&mut self, cells: Vec<(usize, Cell)>) {
        let width = cells.iter().map(|(pos, _)| pos + 1).max().unwrap_or(0);
        let mut row = vec![None; width];
        for (pos, cell) in cells {
            row[pos] = Some(cell);
        }
        self.rows.push(row);
    }

    /// Rearranges columns to follow `order`
    ///
    /// Unknown names are ignored and columns missing from `order` keep their
    /// relative order after the listed ones.
    pub fn reorder(&mut self, order: &[String]) {
        let mut new_positions: Vec<usize> = Vec::with_capacity(self.columns.len());
        let mut seen = HashSet::new();
        for name in order {
            if let Some(&pos) = self.positions.get(name) {
                if seen.insert(pos) {
                    new_positions.push(pos);
                }
            }
        }
        for pos in 0..self.columns.len() {
            if seen.insert(pos) {
                new_positions.push(pos);
            }
        }

        self.columns = new_positions.iter().map(|&p| self.columns[p].clone()).collect();
        self.rows = self
            .rows
            .iter()
            .map(|row| {
                new_positions
                    .iter()
                    .map(|&p| row.get(p).cloned().flatten())
                    .collect()
            })
            .collect();
        self.positions = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
    }

    /// Applies the cosmetic column order used for exports
    ///
    /// Well-known record columns and context levels first, then text columns
    /// by ascending number of distinct values, then boolean columns by name,
    /// then everything else by name.
    pub fn standard_order(&mut self) {
        let first: Vec<String> = DEFAULT_FIRST_COLUMNS
            .iter()
            .map(|s| s.to_string())
            .chain((1..=self.context_depth).map(context_column))
            .filter(|name| self.has_column(name))
            .collect();
        let first_set: HashSet<&str> = first.iter().map(String::as_str).collect();

        let mut text_cols: Vec<(String, usize)> = Vec::new();
        let mut bool_cols: Vec<String> = Vec::new();
        let mut other_cols: Vec<String> = Vec::new();
        for pos in 0..self.columns.len() {
            let name = &self.columns[pos].name;
            if first_set.contains(name.as_str()) {
                continue;
            }
            match self.column_kind(pos) {
                ColumnKind::Text => text_cols.push((name.clone(), self.distinct_count(pos))),
                ColumnKind::Bool => bool_cols.push(name.clone()),
                ColumnKind::Other => other_cols.push(name.clone()),
            }
        }
        text_cols.sort_by_key(|(_, count)| *count);
        bool_cols.sort();
        other_cols.sort();

        let order: Vec<String> = first
            .into_iter()
            .chain(text_cols.into_iter().map(|(name, _)| name))
            .chain(bool_cols)
            .chain(other_cols)
            .collect();
        self.reorder(&order);
    }

    fn column_kind(&self, pos: usize) -> ColumnKind {
        let mut any = false;
        let mut all_bool = true;
        for row in 0..self.rows.len() {
            match self.cell_at(row, pos) {
                Some(Cell::Text(_)) => return ColumnKind::Text,
                Some(Cell::Bool(_)) => any = true,
                Some(Cell::Number(_)) => {
                    any = true;
                    all_bool = false;
                }
                None => {}
            }
        }
        if any && all_bool {
            ColumnKind::Bool
        } else {
            ColumnKind::Other
        }
    }

    fn distinct_count(&self, pos: usize) -> usize {
        (0..self.rows.len())
            .map(|row| self.cell_at(row, pos).map(ToString::to_string))
            .collect::<HashSet<_>>()
            .len()
    }
}
