//! The normalized, locally materialized view of one mailbox entry.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use super::table::Table;
use crate::error::Result;
use crate::search::matcher::{MatchMode, StringMatch};
use crate::store::attachments;

/// Opaque server-assigned identifier (sequence number or UID).
///
/// Used verbatim for every protocol call on the message and as the name of
/// the message's download directory.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u32> for MessageId {
    fn from(n: u32) -> Self {
        Self(n.to_string())
    }
}

/// One downloaded attachment.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AttachmentRef {
    /// Where the attachment was written:
    /// `<download_root>/<folder>/<message_id>/<name>`.
    pub path: PathBuf,
    /// File name as announced by the message.
    pub name: String,
}

/// A fetched and decoded mailbox entry.
///
/// The record owns its attachment directory on disk; [`MessageRecord::delete_files`]
/// removes it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,

    /// Mailbox folder the message was fetched from.
    pub folder: String,

    /// Root under which `<folder>/<id>/` holds the attachments.
    pub download_root: PathBuf,

    /// Decoded `From:` header. `None` when the header is missing.
    pub sender: Option<String>,

    /// Decoded `Subject:` header. `None` when the header is missing.
    pub subject: Option<String>,

    /// Parsed `Date:` header. `None` when missing or unparsable.
    pub received_at: Option<DateTime<Utc>>,

    /// Non-attachment text parts joined by `\n`, HTML converted to text.
    pub body_text: String,

    /// Qualifying attachments in message traversal order.
    pub attachments: Vec<AttachmentRef>,

    /// Parsed CSV/spreadsheet attachments keyed by file name, in message
    /// traversal order.
    pub tables: IndexMap<String, Table>,
}

impl MessageRecord {
    /// An empty record for `id`, before any content has been decoded.
    pub fn new(id: MessageId, folder: impl Into<String>, download_root: impl Into<PathBuf>) -> Self {
        Self {
            id,
            folder: folder.into(),
            download_root: download_root.into(),
            sender: None,
            subject: None,
            received_at: None,
            body_text: String::new(),
            attachments: Vec::new(),
            tables: IndexMap::new(),
        }
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    pub fn attachment_names(&self) -> impl Iterator<Item = &str> {
        self.attachments.iter().map(|a| a.name.as_str())
    }

    /// Directory holding this record's downloaded attachments.
    pub fn record_dir(&self) -> Result<PathBuf> {
        attachments::record_dir(&self.download_root, &self.folder, &self.id)
    }

    /// Remove the record's attachment directory. Missing directories are fine.
    pub fn delete_files(&self) -> Result<()> {
        attachments::delete_record_files(&self.download_root, &self.folder, &self.id)
    }

    /// First table, in traversal order, whose file name ends with
    /// `extension` (e.g. `".csv"`).
    pub fn table_for_extension(&self, extension: &str) -> Option<(&str, &Table)> {
        self.tables
            .iter()
            .find(|(name, _)| has_suffix(name, extension))
            .map(|(name, table)| (name.as_str(), table))
    }

    /// Tables whose file name contains `pattern` (or equals it, when
    /// `complete` is set).
    pub fn tables_matching(&self, pattern: &str, complete: bool) -> Vec<(&str, &Table)> {
        let mode = MatchMode::plain(complete);
        self.tables
            .iter()
            .filter(|(name, _)| {
                StringMatch::find(pattern, name, mode)
                    .map(|m| m.found)
                    .unwrap_or(false)
            })
            .map(|(name, table)| (name.as_str(), table))
            .collect()
    }

    /// Tables whose file name matches the regular expression `pattern`.
    pub fn tables_matching_regex(
        &self,
        pattern: &str,
        complete: bool,
    ) -> Result<Vec<(&str, &Table)>> {
        let mode = MatchMode::regex(complete);
        let mut out = Vec::new();
        for (name, table) in &self.tables {
            if StringMatch::find(pattern, name, mode)?.found {
                out.push((name.as_str(), table));
            }
        }
        Ok(out)
    }
}

fn has_suffix(name: &str, extension: &str) -> bool {
    attachments::file_suffix(Path::new(name)).as_deref() == Some(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_tables(names: &[&str]) -> MessageRecord {
        let mut record = MessageRecord::new(MessageId::from(1), "inbox", "/tmp/unused");
        for name in names {
            record.tables.insert(
                name.to_string(),
                Table::from_rows(vec![vec![name.to_string()]]),
            );
        }
        record
    }

    #[test]
    fn test_table_for_extension() {
        let record = record_with_tables(&["rates.xlsx", "summary.csv"]);
        let (name, _) = record.table_for_extension(".csv").unwrap();
        assert_eq!(name, "summary.csv");
        assert!(record.table_for_extension(".xls").is_none());
    }

    #[test]
    fn test_table_for_extension_uses_traversal_order() {
        let record = record_with_tables(&["weekly.csv", "daily.csv"]);
        let (name, _) = record.table_for_extension(".csv").unwrap();
        assert_eq!(name, "weekly.csv");
    }

    #[test]
    fn test_tables_matching_plain() {
        let record = record_with_tables(&["daily_rates.csv", "weekly_rates.csv", "notes.csv"]);
        let partial = record.tables_matching("rates", false);
        assert_eq!(partial.len(), 2);
        let complete = record.tables_matching("notes.csv", true);
        assert_eq!(complete.len(), 1);
        assert!(record.tables_matching("notes", true).is_empty());
    }

    #[test]
    fn test_tables_matching_regex() {
        let record = record_with_tables(&["report_2024_05.csv", "report.csv"]);
        let hits = record.tables_matching_regex(r"\d{4}_\d{2}", false).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "report_2024_05.csv");
        assert!(record.tables_matching_regex("(", false).is_err());
    }

    #[test]
    fn test_message_id_display() {
        assert_eq!(MessageId::from(42).to_string(), "42");
        assert_eq!(MessageId::new("a1").as_str(), "a1");
    }
}
