//! CSV export of flattened tables

use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::flatten::Table;

/// Errors that can occur while writing a table
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Writes `table` as CSV with a header row in column order
///
/// Booleans are written as `true`/`false` and absent cells as empty fields.
/// A table without columns produces no output.
pub fn write_csv<W: io::Write>(table: &Table, writer: W) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    if table.columns().is_empty() {
        return Ok(());
    }

    wtr.write_record(table.column_names())?;
    for row in table.rows() {
        let fields: Vec<String> = row
            .into_iter()
            .map(|cell| cell.map(ToString::to_string).unwrap_or_default())
            .collect();
        wtr.write_record(&fields)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes `table` to a CSV file at `path`, replacing any existing file
pub fn write_csv_file(table: &Table, path: &Path) -> Result<(), ExportError> {
    let file = std::fs::File::create(path)?;
    write_csv(table, io::BufWriter::new(file))?;
    info!(rows = table.len(), path = %path.display(), "wrote CSV");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::{flatten, FlattenConfig, MultiValueMode};
    use crate::record::Record;
    use serde_json::json;
    use tempfile::TempDir;

    fn records() -> Vec<Record> {
        [
            json!({ "label": "PC 1", "Motif": ["Panther", "Lion"], "Note": "a, b" }),
            json!({ "label": "PC 2", "Motif": ["Sphinx", "Lion"] }),
        ]
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
    }

    fn to_csv(table: &Table) -> String {
        let mut buf = Vec::new();
        write_csv(table, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_header_follows_column_order_and_fields_are_escaped() {
        let table = flatten(&records(), &FlattenConfig::default());

        let csv = to_csv(&table);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "label,Motif,Note");
        assert_eq!(lines[1], "PC 1,Panther; Lion,\"a, b\"");
        assert_eq!(lines[2], "PC 2,Sphinx; Lion,");
    }

    #[test]
    fn test_one_hot_columns_export_false_for_absent() {
        let config = FlattenConfig::default().with_keyed_mode("Motif", MultiValueMode::ColumnVal);
        let table = flatten(&records(), &config);

        let csv = to_csv(&table);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "label,Motif :: Panther,Motif :: Lion,Note,Motif :: Sphinx");
        assert_eq!(lines[1], "PC 1,true,true,\"a, b\",false");
        assert_eq!(lines[2], "PC 2,false,true,,true");
    }

    #[test]
    fn test_empty_table_writes_nothing() {
        assert_eq!(to_csv(&Table::new()), "");
    }

    #[test]
    fn test_write_csv_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.csv");
        let table = flatten(&records(), &FlattenConfig::default());

        write_csv_file(&table, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("label,Motif,Note\n"));
    }
}
