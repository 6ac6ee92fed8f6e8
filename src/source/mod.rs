//! # Record Source
//!
//! Lazily read raw field rows from a CSV file. The producer consumes any
//! iterator of `Result<Vec<String>, SourceError>`; [`CsvSource`] is the file
//! backed one.

mod transform;

pub use transform::{parse_i64_or_zero, parse_optional_timestamp, transform_row};

use std::fs::File;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to open source {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("failed to read source row {line}: {message}")]
    Read { line: u64, message: String },

    #[error("source I/O failure: {message}")]
    Io { message: String },
}

impl SourceError {
    /// Whether reading can go on past this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::Io { .. })
    }
}

/// Why a single row could not become a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("row has {actual} fields, expected {expected}")]
    InvalidFieldCount { expected: usize, actual: usize },
}

/// CSV file source. The first row is a header and is skipped; rows are read
/// one at a time and may carry any number of fields.
pub struct CsvSource {
    records: csv::StringRecordsIntoIter<File>,
}

impl CsvSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| SourceError::Open {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        Ok(Self {
            records: reader.into_records(),
        })
    }
}

impl Iterator for CsvSource {
    type Item = Result<Vec<String>, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(|record| {
            record
                .map(|fields| fields.iter().map(str::to_string).collect())
                .map_err(|e| match e.kind() {
                    csv::ErrorKind::Io(_) => SourceError::Io {
                        message: e.to_string(),
                    },
                    _ => SourceError::Read {
                        line: e.position().map(|p| p.line()).unwrap_or_default(),
                        message: e.to_string(),
                    },
                })
        })
    }
}
