//! CSV ingestion.
//!
//! Reads an exported CSV into a [`Table`], guessing the delimiter from the
//! header line and normalizing column names so downstream lookups can use
//! fixed lowercase `snake_case` names regardless of how the export was
//! spelled.

use std::path::Path;

use crate::{Table, TableError};

/// Delimiters tried when sniffing the header line, in tie-break order.
const DELIMITERS: &[u8] = b",;\t|";

/// UTF-8 byte order mark some spreadsheet exports prepend.
const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reads a CSV file into a [`Table`] labelled `label`.
///
/// # Errors
///
/// Returns [`TableError`] if the file cannot be read, is not valid CSV, or
/// has no header row.
pub fn read_table(path: &Path, label: &str) -> Result<Table, TableError> {
    let bytes = std::fs::read(path)?;
    log::debug!("Read {} bytes from {}", bytes.len(), path.display());

    let table = parse_table(&bytes, label).map_err(|e| match e {
        TableError::NoHeader { .. } => TableError::NoHeader {
            path: path.display().to_string(),
        },
        other => other,
    })?;

    log::info!(
        "Loaded {label}: {} rows, {} columns from {}",
        table.len(),
        table.columns().len(),
        path.display()
    );

    Ok(table)
}

/// Parses CSV bytes into a [`Table`].
///
/// # Errors
///
/// Returns [`TableError`] if the bytes are not valid CSV or have no header.
pub fn parse_table(bytes: &[u8], label: &str) -> Result<Table, TableError> {
    let bytes = bytes.strip_prefix(BOM).unwrap_or(bytes);
    let delimiter = sniff_delimiter(bytes);

    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(normalize_column_name)
        .collect();

    if columns.iter().all(String::is_empty) {
        return Err(TableError::NoHeader {
            path: label.to_string(),
        });
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        rows.push(record.iter().map(|v| v.trim().to_owned()).collect());
    }

    Ok(Table::new(label, columns, rows))
}

/// Normalizes a header: strips BOMs, trims, lowercases, and replaces
/// spaces with underscores.
#[must_use]
pub fn normalize_column_name(raw: &str) -> String {
    raw.replace('\u{feff}', "")
        .trim()
        .to_lowercase()
        .replace(' ', "_")
}

/// Picks the delimiter occurring most often in the first line.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let header = bytes.split(|b| *b == b'\n').next().unwrap_or_default();

    let mut best = (b',', 0_usize);
    for &delimiter in DELIMITERS {
        let count = header.iter().filter(|b| **b == delimiter).count();
        if count > best.1 {
            best = (delimiter, count);
        }
    }

    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_headers() {
        assert_eq!(normalize_column_name("\u{feff} Civic Number "), "civic_number");
        assert_eq!(normalize_column_name("Geo Point 2D"), "geo_point_2d");
    }

    #[test]
    fn parses_comma_separated() {
        let table = parse_table(b"Address,Local Area\n100 Pine St,West End\n", "t").unwrap();
        assert_eq!(table.columns(), ["address", "local_area"]);
        let row = table.rows().next().unwrap();
        assert_eq!(row.get("local_area"), Some("West End"));
    }

    #[test]
    fn sniffs_semicolons() {
        let table = parse_table(
            b"\xEF\xBB\xBFCIVIC_NUMBER;STD_STREET;Geo Point 2D\n100;PINE ST;\"49.1, -123.1\"\n",
            "addresses",
        )
        .unwrap();
        assert_eq!(table.columns(), ["civic_number", "std_street", "geo_point_2d"]);
        let row = table.rows().next().unwrap();
        assert_eq!(row.get("geo_point_2d"), Some("49.1, -123.1"));
    }

    #[test]
    fn tolerates_ragged_rows() {
        let table = parse_table(b"a,b,c\n1,2\n1,2,3,4\n", "t").unwrap();
        assert_eq!(table.len(), 2);
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[0].get("c"), None);
        assert_eq!(rows[1].get("c"), Some("3"));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("members.csv");
        std::fs::write(&path, "Address,Tag List\n100 Pine St,\"member, membership-2024\"\n")
            .unwrap();

        let table = read_table(&path, "Members CSV").unwrap();
        assert_eq!(table.label(), "Members CSV");
        let row = table.rows().next().unwrap();
        assert_eq!(row.get("tag_list"), Some("member, membership-2024"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_table(Path::new("/definitely/not/here.csv"), "t").unwrap_err();
        assert!(matches!(err, TableError::Io(_)));
    }
}
