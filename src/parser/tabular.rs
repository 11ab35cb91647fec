//! Tabular attachment parsing: CSV and spreadsheets to [`Table`].

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Reader};
use tracing::debug;

use crate::error::{MailError, Result};
use crate::model::table::Table;
use crate::store::attachments::file_suffix;

/// File extensions parsed into tables. Matched case-sensitively.
pub const TABULAR_EXTENSIONS: [&str; 3] = [".csv", ".xlsx", ".xls"];

/// Whether an attachment with this file name is parsed into a table.
pub fn is_tabular(file_name: &str) -> bool {
    file_suffix(Path::new(file_name)).is_some_and(|s| TABULAR_EXTENSIONS.contains(&s.as_str()))
}

/// Turns the bytes of one attachment into a [`Table`].
///
/// Implementations must be pure: no I/O beyond reading `bytes`.
pub trait TableParser {
    /// Parse `bytes`; `file_name` selects the format and labels errors.
    fn parse(&self, file_name: &str, bytes: &[u8]) -> Result<Table>;
}

/// CSV via a built-in RFC 4180 reader, `.xlsx`/`.xls` via `calamine`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTableParser;

impl TableParser for BuiltinTableParser {
    fn parse(&self, file_name: &str, bytes: &[u8]) -> Result<Table> {
        let suffix = file_suffix(Path::new(file_name));
        let rows = match suffix.as_deref() {
            Some(".csv") => parse_csv(bytes),
            Some(".xlsx") | Some(".xls") => parse_spreadsheet(file_name, bytes)?,
            _ => {
                return Err(MailError::Parse {
                    file: file_name.to_string(),
                    reason: "not a recognized tabular format".to_string(),
                })
            }
        };
        debug!(file = file_name, rows = rows.len(), "Parsed table");
        Ok(Table::from_rows(rows))
    }
}

/// Split CSV text into rows of fields.
///
/// Handles quoted fields with embedded separators, doubled quotes and line
/// breaks, CRLF or LF line endings, and a leading UTF-8 BOM. Blank lines
/// are skipped. Non-UTF-8 input is decoded as Windows-1252.
pub fn parse_csv(bytes: &[u8]) -> Vec<Vec<String>> {
    let text = decode_text(bytes);

    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => end_row(&mut rows, &mut row, &mut field),
            _ => field.push(c),
        }
    }
    end_row(&mut rows, &mut row, &mut field);
    rows
}

fn end_row(rows: &mut Vec<Vec<String>>, row: &mut Vec<String>, field: &mut String) {
    if row.is_empty() && field.is_empty() {
        return;
    }
    row.push(std::mem::take(field));
    rows.push(std::mem::take(row));
}

fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Rows of the first worksheet, every cell rendered as text.
fn parse_spreadsheet(file_name: &str, bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let parse_err = |reason: String| MailError::Parse {
        file: file_name.to_string(),
        reason,
    };

    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| parse_err(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| parse_err("workbook has no worksheets".to_string()))?
        .map_err(|e| parse_err(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_tabular() {
        assert!(is_tabular("rates.csv"));
        assert!(is_tabular("rates.xlsx"));
        assert!(is_tabular("old.xls"));
        assert!(!is_tabular("rates.CSV"));
        assert!(!is_tabular("notes.txt"));
        assert!(!is_tabular("csv"));
    }

    #[test]
    fn test_parse_csv_simple() {
        let rows = parse_csv(b"date,rate\r\n2024-05-01,1.5\r\n2024-05-02,1.6\r\n");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["date", "rate"]);
        assert_eq!(rows[2], vec!["2024-05-02", "1.6"]);
    }

    #[test]
    fn test_parse_csv_quoted_fields() {
        let rows = parse_csv(b"name,note\n\"Smith, J\",\"said \"\"hi\"\"\"\n\"multi\nline\",x\n");
        assert_eq!(rows[1], vec!["Smith, J", "said \"hi\""]);
        assert_eq!(rows[2], vec!["multi\nline", "x"]);
    }

    #[test]
    fn test_parse_csv_bom_and_blank_lines() {
        let rows = parse_csv(b"\xEF\xBB\xBFa,b\n\n1,2");
        assert_eq!(rows, vec![vec!["a", "b"], vec!["1", "2"]]);
    }

    #[test]
    fn test_parse_csv_empty_fields() {
        let rows = parse_csv(b"a,,c\n,,\n");
        assert_eq!(rows[0], vec!["a", "", "c"]);
        assert_eq!(rows[1], vec!["", "", ""]);
    }

    #[test]
    fn test_parse_csv_latin1_fallback() {
        let rows = parse_csv(b"caf\xE9,1\n");
        assert_eq!(rows[0][0], "café");
    }

    #[test]
    fn test_builtin_parser_csv_table() {
        let table = BuiltinTableParser.parse("data.csv", b"a,b\n1,2\n3,4\n").unwrap();
        assert_eq!(table.headers, vec!["a", "b"]);
        assert_eq!(table.column("b"), Some(vec!["2", "4"]));
    }

    #[test]
    fn test_builtin_parser_rejects_garbage_spreadsheet() {
        let err = BuiltinTableParser
            .parse("broken.xlsx", b"definitely not a zip")
            .unwrap_err();
        assert!(matches!(err, MailError::Parse { ref file, .. } if file == "broken.xlsx"));
    }

    #[test]
    fn test_builtin_parser_unknown_extension() {
        assert!(BuiltinTableParser.parse("notes.txt", b"x").is_err());
    }
}
