#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory source tables for the building map pipeline.
//!
//! Every input source (buildings, addresses, blocks, membership exports)
//! arrives as a [`Table`] of string cells with normalized column names.
//! Sources vary in which optional columns they carry, so lookups go through
//! column names resolved at runtime rather than a fixed schema.

pub mod csv;

use thiserror::Error;

/// Errors that can occur while loading or validating a table.
#[derive(Debug, Error)]
pub enum TableError {
    /// File could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    /// The file has no header row.
    #[error("{path} contains no header row")]
    NoHeader {
        /// Path of the offending file.
        path: String,
    },

    /// One or more required columns are absent.
    #[error("{table} missing columns: {missing:?}")]
    MissingColumns {
        /// Human-readable table label (e.g. "Addresses CSV").
        table: String,
        /// Sorted list of the missing column names.
        missing: Vec<String>,
    },
}

/// A rectangular table of string cells.
///
/// Blank cells are treated as missing by [`Row::get`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    label: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Creates a table. Short rows are padded with blank cells.
    #[must_use]
    pub fn new(label: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();

        Self {
            label: label.into(),
            columns,
            rows,
        }
    }

    /// Convenience constructor from borrowed string slices.
    #[must_use]
    pub fn from_strs(label: &str, columns: &[&str], rows: &[&[&str]]) -> Self {
        Self::new(
            label,
            columns.iter().map(|c| (*c).to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|c| (*c).to_string()).collect())
                .collect(),
        )
    }

    /// Human-readable label used in error and log messages.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Column names in source order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the column with exactly this name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Whether a column with exactly this name exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Index of the first column whose name satisfies `predicate`.
    #[must_use]
    pub fn find_column(&self, predicate: impl Fn(&str) -> bool) -> Option<usize> {
        self.columns.iter().position(|c| predicate(c))
    }

    /// Ensures every column in `required` exists.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::MissingColumns`] naming this table and the
    /// sorted list of absent columns.
    pub fn require_columns(&self, required: &[&str]) -> Result<(), TableError> {
        let mut missing: Vec<String> = required
            .iter()
            .filter(|c| !self.has_column(c))
            .map(|c| (*c).to_string())
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        missing.sort();
        Err(TableError::MissingColumns {
            table: self.label.clone(),
            missing,
        })
    }

    /// Iterates over the data rows.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().enumerate().map(|(index, cells)| Row {
            table: self,
            index,
            cells,
        })
    }
}

/// A borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    index: usize,
    cells: &'a [String],
}

impl<'a> Row<'a> {
    /// Position of this row in its table.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Value of the named column, or `None` if the column is absent or the
    /// cell is blank.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.at(self.table.column_index(column))
    }

    /// Value at a pre-resolved column index. Blank cells are `None`.
    #[must_use]
    pub fn at(&self, index: Option<usize>) -> Option<&'a str> {
        let value = self.cells.get(index?)?.trim();
        (!value.is_empty()).then_some(value)
    }
}

/// A late-bound field: either a real column or a constant fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnAccessor {
    /// Reads the column at `index`.
    Column {
        /// Column position.
        index: usize,
        /// Column name, kept for logging.
        name: String,
    },
    /// Yields the same value for every row.
    Constant(String),
}

impl ColumnAccessor {
    /// Resolves a column by probing `candidates` in priority order, then the
    /// first column whose name contains any of `fragments`, and finally a
    /// constant `fallback` value.
    #[must_use]
    pub fn resolve(table: &Table, candidates: &[&str], fragments: &[&str], fallback: &str) -> Self {
        candidates
            .iter()
            .find_map(|c| table.column_index(c))
            .or_else(|| table.find_column(|name| fragments.iter().any(|f| name.contains(f))))
            .map_or_else(
                || Self::Constant(fallback.to_string()),
                |index| Self::Column {
                    index,
                    name: table.columns[index].clone(),
                },
            )
    }

    /// Reads this field from a row.
    #[must_use]
    pub fn get<'a>(&'a self, row: &Row<'a>) -> Option<&'a str> {
        match self {
            Self::Column { index, .. } => row.at(Some(*index)),
            Self::Constant(value) => Some(value.as_str()),
        }
    }

    /// Name of the backing column, if any.
    #[must_use]
    pub fn column_name(&self) -> Option<&str> {
        match self {
            Self::Column { name, .. } => Some(name),
            Self::Constant(_) => None,
        }
    }
}
