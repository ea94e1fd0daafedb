//! Matching local files to catalog identifiers
//!
//! Scans and photographs are named after catalog numbers, optionally with a
//! sub-part (`18023.b.pdf`). This module pairs each file with the catalog
//! identifiers it refers to and reports the files that match nothing.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Reference column read when none is given
pub const DEFAULT_ID_COLUMN: &str = "Number";

/// Errors that stop a matching run
///
/// Individual unmatched files are not errors; they end up in
/// `MatchReport::missing`.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read reference table: {0}")]
    Csv(#[from] csv::Error),

    #[error("reference table has no column '{0}'")]
    MissingColumn(String),
}

/// Catalog identifiers files are matched against
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    ids: Vec<String>,
}

impl ReferenceTable {
    /// Builds a table from identifiers, dropping blanks
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = ids
            .into_iter()
            .map(|s| {
                let s: String = s.into();
                s.trim().to_string()
            })
            .filter(|s| !s.is_empty())
            .collect();
        Self { ids }
    }

    /// Reads identifiers from one column of a CSV file with a header row
    pub fn from_csv_path(path: &Path, column: &str) -> Result<Self, MatchError> {
        let reader = csv::Reader::from_path(path)?;
        Self::from_csv_reader(reader, column)
    }

    pub fn from_csv_reader<R: io::Read>(
        mut reader: csv::Reader<R>,
        column: &str,
    ) -> Result<Self, MatchError> {
        let index = reader
            .headers()?
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| MatchError::MissingColumn(column.to_string()))?;

        let mut ids = Vec::new();
        for record in reader.records() {
            let record = record?;
            if let Some(value) = record.get(index) {
                ids.push(value.to_string());
            }
        }
        Ok(Self::new(ids))
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Catalog identifiers referred to by a file name
    ///
    /// 1. An identifier equal to the file stem matches outright.
    /// 2. Otherwise identifiers equal to, or starting with, the base
    ///    identifier (the stem up to its first `.`) are candidates.
    /// 3. With a sub-part, candidates whose remainder after the base contains
    ///    it (case-insensitively) win; failing that, only identifiers equal to
    ///    the base match.
    /// 4. Without a sub-part every candidate matches.
    pub fn match_file_name(&self, file_name: &str) -> Vec<String> {
        let Some(name) = FileName::parse(file_name) else {
            return Vec::new();
        };

        let exact: Vec<String> = self.ids.iter().filter(|id| **id == name.stem).cloned().collect();
        if !exact.is_empty() {
            return exact;
        }

        let candidates: Vec<&String> = self
            .ids
            .iter()
            .filter(|id| id.starts_with(name.base))
            .collect();

        match name.sub_part {
            Some(sub) => {
                let sub = sub.to_lowercase();
                let contained: Vec<String> = candidates
                    .iter()
                    .filter(|id| id[name.base.len()..].to_lowercase().contains(&sub))
                    .map(|id| id.to_string())
                    .collect();
                if !contained.is_empty() {
                    return contained;
                }
                candidates
                    .into_iter()
                    .filter(|id| id.as_str() == name.base)
                    .cloned()
                    .collect()
            }
            None => candidates.into_iter().cloned().collect(),
        }
    }
}

/// The identifier parts of a file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileName<'a> {
    /// Name without its final extension
    pub stem: &'a str,
    /// Stem up to the first `.`
    pub base: &'a str,
    /// Stem after the first `.`, if any
    pub sub_part: Option<&'a str>,
}

impl<'a> FileName<'a> {
    /// Splits `18023.b.pdf` into stem `18023.b`, base `18023`, sub-part `b`
    pub fn parse(file_name: &'a str) -> Option<Self> {
        let file_name = file_name.trim();
        let stem = match file_name.rfind('.') {
            Some(dot) if dot > 0 => &file_name[..dot],
            _ => file_name,
        };
        if stem.is_empty() {
            return None;
        }
        let (base, sub_part) = match stem.split_once('.') {
            Some((base, sub)) if !sub.is_empty() => (base, Some(sub)),
            Some((base, _)) => (base, None),
            None => (stem, None),
        };
        if base.is_empty() {
            return None;
        }
        Some(Self {
            stem,
            base,
            sub_part,
        })
    }
}

/// A file and the identifiers it matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMatch {
    pub file: PathBuf,
    pub ids: Vec<String>,
}

/// Outcome of matching a directory of files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    pub matched: Vec<FileMatch>,
    /// Files that matched no identifier
    pub missing: Vec<PathBuf>,
}

impl MatchReport {
    /// Writes one `file,id` row per matched pair
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(["file", "id"])?;
        for m in &self.matched {
            let file = m.file.to_string_lossy();
            for id in &m.ids {
                wtr.write_record([&*file, id.as_str()])?;
            }
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Matches every regular file in `dir` against `reference`
///
/// Files are visited in name order. Unmatched files are collected, not
/// treated as failures.
pub fn match_directory(dir: &Path, reference: &ReferenceTable) -> Result<MatchReport, MatchError> {
    let io_err = |source: io::Error| MatchError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let mut report = MatchReport::default();
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ids = reference.match_file_name(&name);
        if ids.is_empty() {
            warn!(file = %name, "no catalog identifier matches");
            report.missing.push(path);
        } else {
            report.matched.push(FileMatch { file: path, ids });
        }
    }
    info!(
        matched = report.matched.len(),
        missing = report.missing.len(),
        "matched files"
    );
    Ok(report)
}
