//! Tabular payload parsed from a CSV or spreadsheet attachment.

/// A rectangular-ish table: one header row plus data rows.
///
/// Rows are kept as parsed; a row may be shorter or longer than the header
/// when the source file is ragged.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Table {
    /// Column names taken from the first row of the source.
    pub headers: Vec<String>,
    /// Data rows, in source order.
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table from raw rows, treating the first row as the header.
    pub fn from_rows(mut rows: Vec<Vec<String>>) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let headers = rows.remove(0);
        Self { headers, rows }
    }

    /// Number of data rows (the header is not counted).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the column with exactly this header.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// All values of one column. Missing cells in ragged rows read as `""`.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }
}
