//! Result policy: attachment filter, stable date sort, truncation.

use std::fmt;
use std::str::FromStr;

use crate::error::MailError;
use crate::model::record::MessageRecord;

/// Order of the returned records by `received_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    /// Newest first (descending).
    #[default]
    RecentFirst,
    /// Oldest first (ascending).
    RecentLast,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::RecentFirst => "recent_first",
            SortDirection::RecentLast => "recent_last",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortDirection {
    type Err = MailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recent_first" => Ok(SortDirection::RecentFirst),
            "recent_last" => Ok(SortDirection::RecentLast),
            other => Err(MailError::config(format!(
                "sort direction must be 'recent_first' or 'recent_last', got {other:?}"
            ))),
        }
    }
}

/// Filter/sort/truncate stage shared by every search path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultPolicy {
    pub include_attachmentless: bool,
    pub sort_direction: SortDirection,
    /// `0` means unlimited.
    pub max_count: usize,
}

impl ResultPolicy {
    /// The ordered records to return.
    pub fn apply(&self, records: Vec<MessageRecord>) -> Vec<MessageRecord> {
        self.partition(records).0
    }

    /// Split `records` into `(kept, dropped)`.
    ///
    /// `kept` is sorted by `received_at` (records without a timestamp count
    /// as the oldest), ties keep their input order, and it holds at most
    /// `max_count` entries. `dropped` collects everything filtered out or
    /// truncated away, so callers can clean up its files.
    pub fn partition(&self, records: Vec<MessageRecord>) -> (Vec<MessageRecord>, Vec<MessageRecord>) {
        let (mut kept, mut dropped): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|r| self.include_attachmentless || r.has_attachments());

        // slice::sort_by is stable
        match self.sort_direction {
            SortDirection::RecentFirst => kept.sort_by(|a, b| b.received_at.cmp(&a.received_at)),
            SortDirection::RecentLast => kept.sort_by(|a, b| a.received_at.cmp(&b.received_at)),
        }

        if self.max_count > 0 && kept.len() > self.max_count {
            dropped.extend(kept.split_off(self.max_count));
        }
        (kept, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::{AttachmentRef, MessageId};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap())
    }

    fn record(id: &str, received_at: Option<DateTime<Utc>>, with_attachment: bool) -> MessageRecord {
        let mut r = MessageRecord::new(MessageId::new(id), "inbox", "/tmp/unused");
        r.received_at = received_at;
        if with_attachment {
            r.attachments.push(AttachmentRef {
                path: "x.csv".into(),
                name: "x.csv".into(),
            });
        }
        r
    }

    fn ids(records: &[MessageRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    fn sample() -> Vec<MessageRecord> {
        // [T2, None, T1, T2]
        vec![
            record("a", at(2), true),
            record("b", None, true),
            record("c", at(1), true),
            record("d", at(2), true),
        ]
    }

    #[test]
    fn test_recent_first_is_stable_with_missing_last() {
        let policy = ResultPolicy {
            include_attachmentless: true,
            sort_direction: SortDirection::RecentFirst,
            max_count: 0,
        };
        assert_eq!(ids(&policy.apply(sample())), vec!["a", "d", "c", "b"]);
    }

    #[test]
    fn test_recent_last_puts_missing_first() {
        let policy = ResultPolicy {
            include_attachmentless: true,
            sort_direction: SortDirection::RecentLast,
            max_count: 0,
        };
        assert_eq!(ids(&policy.apply(sample())), vec!["b", "c", "a", "d"]);
    }

    #[test]
    fn test_truncation_after_sort() {
        let records: Vec<_> = (1..=5).map(|d| record(&d.to_string(), at(d), true)).collect();
        let policy = ResultPolicy {
            include_attachmentless: true,
            sort_direction: SortDirection::RecentFirst,
            max_count: 2,
        };
        let (kept, dropped) = policy.partition(records);
        assert_eq!(ids(&kept), vec!["5", "4"]);
        assert_eq!(dropped.len(), 3);
    }

    #[test]
    fn test_attachmentless_filter() {
        let records = vec![record("a", at(1), false), record("b", at(2), true)];
        let strict = ResultPolicy::default();
        let (kept, dropped) = strict.partition(records.clone());
        assert_eq!(ids(&kept), vec!["b"]);
        assert_eq!(ids(&dropped), vec!["a"]);

        let lenient = ResultPolicy {
            include_attachmentless: true,
            ..Default::default()
        };
        assert_eq!(lenient.apply(records).len(), 2);
    }

    #[test]
    fn test_sort_direction_parse() {
        assert_eq!("recent_first".parse::<SortDirection>().unwrap(), SortDirection::RecentFirst);
        assert_eq!("recent_last".parse::<SortDirection>().unwrap(), SortDirection::RecentLast);
        let err = "newest".parse::<SortDirection>().unwrap_err();
        assert!(matches!(err, MailError::Configuration(_)));
        assert_eq!(SortDirection::RecentLast.to_string(), "recent_last");
    }
}
