//! A [`MailboxSession`] over a directory tree.
//!
//! Layout: `<root>/<folder>/<id>.eml`, one RFC 5322 message per file. The
//! file stem is the message identifier. Filters are evaluated the way an
//! IMAP server would: case-insensitive substring for `SUBJECT`/`BODY`/`FROM`,
//! whole days for `SINCE`/`BEFORE`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use crate::error::{MailError, Result};
use crate::parser::header::parse_headers;
use crate::parser::mime::parse_message;
use crate::search::criteria::FilterExpr;
use crate::store::attachments::{plain_relative, plain_segment};

use super::{Connector, MailboxSession, MessageId};

const MESSAGE_EXTENSION: &str = "eml";

/// Opens [`LocalMailbox`] sessions rooted at one directory.
#[derive(Debug, Clone)]
pub struct LocalConnector {
    root: PathBuf,
    credential: Option<String>,
}

impl LocalConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            credential: None,
        }
    }

    /// Reject logins whose credential differs from `credential`.
    pub fn require_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }
}

impl Connector for LocalConnector {
    type Session = LocalMailbox;

    fn connect(&self, address: &str, credential: &str, timeout: Duration) -> Result<LocalMailbox> {
        if !self.root.is_dir() {
            return Err(MailError::Auth(format!(
                "mailbox root {} is not reachable",
                self.root.display()
            )));
        }
        if self.credential.as_deref().is_some_and(|c| c != credential) {
            return Err(MailError::Auth(format!("credential rejected for {address}")));
        }
        info!(address, root = %self.root.display(), "Opened local mailbox");
        Ok(LocalMailbox {
            root: self.root.clone(),
            timeout,
            selected: None,
            deleted: BTreeSet::new(),
            logged_out: false,
        })
    }
}

/// Session state over one mailbox root.
///
/// Every command is a local file operation that cannot stall on a peer, so
/// the connect timeout is only recorded, never enforced.
#[derive(Debug)]
pub struct LocalMailbox {
    root: PathBuf,
    timeout: Duration,
    selected: Option<String>,
    deleted: BTreeSet<MessageId>,
    logged_out: bool,
}

/// The fields filters are evaluated against.
struct Candidate {
    subject: String,
    sender: String,
    body: String,
    day: Option<NaiveDate>,
}

impl LocalMailbox {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The timeout requested at connect time.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn selected_folder(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    fn folder_dir(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root.join(plain_relative(name)?))
    }

    fn selected_dir(&self) -> Result<PathBuf> {
        if self.logged_out {
            return Err(MailError::Search("session is logged out".into()));
        }
        match &self.selected {
            Some(folder) => self.folder_dir(folder),
            None => Err(MailError::Search("no folder selected".into())),
        }
    }

    /// `<dir>/<id>.eml`. Identifiers that are not a single plain path
    /// segment are rejected.
    fn message_path(&self, dir: &Path, id: &MessageId) -> Result<PathBuf> {
        plain_segment(id.as_str())?;
        Ok(dir.join(format!("{id}.{MESSAGE_EXTENSION}")))
    }

    fn read_message(&self, dir: &Path, id: &MessageId) -> Result<Vec<u8>> {
        let path = self.message_path(dir, id)?;
        std::fs::read(&path).map_err(|e| MailError::Fetch {
            id: id.to_string(),
            reason: format!("{}: {e}", path.display()),
        })
    }

    fn load_candidate(&self, dir: &Path, id: &MessageId) -> Result<Candidate> {
        let raw = self.read_message(dir, id)?;
        let headers = parse_headers(&raw);
        let day = match headers.date {
            Some(date) => Some(date.date_naive()),
            None => std::fs::metadata(self.message_path(dir, id)?)
                .and_then(|m| m.modified())
                .ok()
                .map(|t| DateTime::<Utc>::from(t).date_naive()),
        };
        Ok(Candidate {
            subject: headers.subject.unwrap_or_default().to_lowercase(),
            sender: headers.sender.unwrap_or_default().to_lowercase(),
            body: parse_message(&raw).body_text.to_lowercase(),
            day,
        })
    }
}

/// Identifiers in `dir`: numeric order when every stem is a number,
/// lexicographic otherwise.
fn list_ids(dir: &Path) -> Result<Vec<MessageId>> {
    let entries = std::fs::read_dir(dir).map_err(|e| MailError::io(dir, e))?;
    let mut stems = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| MailError::io(dir, e))?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(MESSAGE_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.push(stem.to_string());
        }
    }

    if stems.iter().all(|s| s.parse::<u64>().is_ok()) {
        stems.sort_by_key(|s| s.parse::<u64>().unwrap_or(u64::MAX));
    } else {
        stems.sort();
    }
    Ok(stems.into_iter().map(MessageId::new).collect())
}

fn matches(expr: &FilterExpr, msg: &Candidate) -> bool {
    match expr {
        FilterExpr::All => true,
        FilterExpr::Subject(s) => msg.subject.contains(&s.to_lowercase()),
        FilterExpr::Body(s) => msg.body.contains(&s.to_lowercase()),
        FilterExpr::From(s) => msg.sender.contains(&s.to_lowercase()),
        FilterExpr::Since(d) => msg.day.is_some_and(|day| day >= *d),
        FilterExpr::Before(d) => msg.day.is_some_and(|day| day < *d),
        FilterExpr::Or(a, b) => matches(a, msg) || matches(b, msg),
        FilterExpr::And(terms) => terms.iter().all(|t| matches(t, msg)),
    }
}

impl MailboxSession for LocalMailbox {
    fn select_folder(&mut self, name: &str) -> Result<()> {
        if self.logged_out {
            return Err(MailError::Search("session is logged out".into()));
        }
        let dir = self.folder_dir(name)?;
        if !dir.is_dir() {
            return Err(MailError::FolderNotFound(name.to_string()));
        }
        if self.selected.as_deref() != Some(name) {
            self.deleted.clear();
        }
        self.selected = Some(name.to_string());
        debug!(folder = name, "Selected folder");
        Ok(())
    }

    fn search(&mut self, filter: &FilterExpr) -> Result<Vec<MessageId>> {
        let dir = self.selected_dir()?;
        let ids = list_ids(&dir).map_err(|e| MailError::Search(e.to_string()))?;
        if *filter == FilterExpr::All {
            return Ok(ids);
        }

        let mut hits = Vec::new();
        for id in ids {
            let candidate = self
                .load_candidate(&dir, &id)
                .map_err(|e| MailError::Search(e.to_string()))?;
            if matches(filter, &candidate) {
                hits.push(id);
            }
        }
        debug!(%filter, hits = hits.len(), "Local search");
        Ok(hits)
    }

    fn fetch_raw(&mut self, id: &MessageId) -> Result<Vec<u8>> {
        let dir = self.selected_dir()?;
        self.read_message(&dir, id)
    }

    fn copy(&mut self, id: &MessageId, destination: &str) -> Result<()> {
        let dir = self.selected_dir()?;
        let dest_dir = self.folder_dir(destination)?;
        if !dest_dir.is_dir() {
            return Err(MailError::FolderNotFound(destination.to_string()));
        }
        let source = self.message_path(&dir, id)?;
        if !source.is_file() {
            return Err(MailError::Fetch {
                id: id.to_string(),
                reason: "no such message".into(),
            });
        }

        // Destination folder assigns the next free sequence number
        let next = list_ids(&dest_dir)?
            .iter()
            .filter_map(|i| i.as_str().parse::<u64>().ok())
            .max()
            .map_or(1, |n| n + 1);
        let target = self.message_path(&dest_dir, &MessageId::new(next.to_string()))?;
        std::fs::copy(&source, &target).map_err(|e| MailError::io(&target, e))?;
        debug!(id = %id, destination, new_id = next, "Copied message");
        Ok(())
    }

    fn mark_deleted(&mut self, id: &MessageId) -> Result<()> {
        let dir = self.selected_dir()?;
        if !self.message_path(&dir, id)?.is_file() {
            return Err(MailError::Fetch {
                id: id.to_string(),
                reason: "no such message".into(),
            });
        }
        self.deleted.insert(id.clone());
        Ok(())
    }

    fn expunge(&mut self) -> Result<()> {
        let dir = self.selected_dir()?;
        for id in std::mem::take(&mut self.deleted) {
            let path = self.message_path(&dir, &id)?;
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(id = %id, "Expunged message"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(MailError::io(path, e)),
            }
        }
        Ok(())
    }

    fn logout(&mut self) -> Result<()> {
        self.selected = None;
        self.deleted.clear();
        self.logged_out = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::DEFAULT_TIMEOUT;

    fn write_message(root: &Path, folder: &str, id: &str, subject: &str, date: &str) {
        let dir = root.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        let raw = format!(
            "From: Rates Desk <rates@bank.example>\r\nSubject: {subject}\r\nDate: {date}\r\n\r\nDaily numbers inside.\r\n"
        );
        std::fs::write(dir.join(format!("{id}.eml")), raw).unwrap();
    }

    fn mailbox(root: &Path) -> LocalMailbox {
        LocalConnector::new(root)
            .connect("me@example.com", "", DEFAULT_TIMEOUT)
            .unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_connect_missing_root_is_auth_error() {
        let err = LocalConnector::new("/definitely/not/here")
            .connect("me", "pw", DEFAULT_TIMEOUT)
            .unwrap_err();
        assert!(matches!(err, MailError::Auth(_)));
    }

    #[test]
    fn test_connect_wrong_credential() {
        let tmp = tempfile::tempdir().unwrap();
        let connector = LocalConnector::new(tmp.path()).require_credential("secret");
        assert!(matches!(
            connector.connect("me", "guess", DEFAULT_TIMEOUT),
            Err(MailError::Auth(_))
        ));
        assert!(connector.connect("me", "secret", DEFAULT_TIMEOUT).is_ok());
    }

    #[test]
    fn test_select_unknown_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let mut session = mailbox(tmp.path());
        assert!(matches!(
            session.select_folder("inbox"),
            Err(MailError::FolderNotFound(_))
        ));
        assert!(matches!(
            session.select_folder("../etc"),
            Err(MailError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_ids_in_numeric_order() {
        let tmp = tempfile::tempdir().unwrap();
        for id in ["10", "2", "1"] {
            write_message(tmp.path(), "inbox", id, "x", "Wed, 01 May 2024 09:00:00 +0000");
        }
        let mut session = mailbox(tmp.path());
        session.select_folder("inbox").unwrap();
        let ids = session.search(&FilterExpr::All).unwrap();
        let ids: Vec<&str> = ids.iter().map(MessageId::as_str).collect();
        assert_eq!(ids, vec!["1", "2", "10"]);
    }

    #[test]
    fn test_search_subject_case_insensitive_and_dates() {
        let tmp = tempfile::tempdir().unwrap();
        write_message(tmp.path(), "inbox", "1", "Invoice May", "Wed, 01 May 2024 09:00:00 +0000");
        write_message(tmp.path(), "inbox", "2", "Report", "Fri, 10 May 2024 09:00:00 +0000");
        let mut session = mailbox(tmp.path());
        session.select_folder("inbox").unwrap();

        let hits = session.search(&FilterExpr::Subject("invoice".into())).unwrap();
        assert_eq!(hits, vec![MessageId::from(1)]);

        let window = FilterExpr::And(vec![
            FilterExpr::Since(day(2024, 5, 2)),
            FilterExpr::Before(day(2024, 5, 11)),
        ]);
        assert_eq!(session.search(&window).unwrap(), vec![MessageId::from(2)]);

        // BEFORE is exclusive of its day
        let before = FilterExpr::Before(day(2024, 5, 10));
        assert_eq!(session.search(&before).unwrap(), vec![MessageId::from(1)]);

        let from = FilterExpr::From("RATES@bank.example".into());
        assert_eq!(session.search(&from).unwrap().len(), 2);
        let body = FilterExpr::Body("numbers".into());
        assert_eq!(session.search(&body).unwrap().len(), 2);
    }

    #[test]
    fn test_fetch_missing_message() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("inbox")).unwrap();
        let mut session = mailbox(tmp.path());
        session.select_folder("inbox").unwrap();
        assert!(matches!(
            session.fetch_raw(&MessageId::from(5)),
            Err(MailError::Fetch { .. })
        ));
    }

    #[test]
    fn test_move_message() {
        let tmp = tempfile::tempdir().unwrap();
        write_message(tmp.path(), "inbox", "1", "a", "Wed, 01 May 2024 09:00:00 +0000");
        write_message(tmp.path(), "archive", "7", "b", "Wed, 01 May 2024 09:00:00 +0000");
        let mut session = mailbox(tmp.path());
        session.select_folder("inbox").unwrap();

        session.move_message(&MessageId::from(1), "archive").unwrap();
        assert!(!tmp.path().join("inbox/1.eml").exists());
        assert!(tmp.path().join("archive/8.eml").exists());
    }

    #[test]
    fn test_copy_to_missing_folder_keeps_source() {
        let tmp = tempfile::tempdir().unwrap();
        write_message(tmp.path(), "inbox", "1", "a", "Wed, 01 May 2024 09:00:00 +0000");
        let mut session = mailbox(tmp.path());
        session.select_folder("inbox").unwrap();
        assert!(session.move_message(&MessageId::from(1), "nowhere").is_err());
        assert!(tmp.path().join("inbox/1.eml").exists());
    }

    #[test]
    fn test_commands_after_logout_fail() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("inbox")).unwrap();
        let mut session = mailbox(tmp.path());
        session.select_folder("inbox").unwrap();
        session.logout().unwrap();
        assert!(session.search(&FilterExpr::All).is_err());
    }

    #[test]
    fn test_message_ids_cannot_leave_folder() {
        let tmp = tempfile::tempdir().unwrap();
        write_message(tmp.path(), ".", "secret", "private", "Wed, 01 May 2024 09:00:00 +0000");
        std::fs::create_dir_all(tmp.path().join("inbox")).unwrap();
        let mut session = mailbox(tmp.path());
        session.select_folder("inbox").unwrap();

        let absolute = MessageId::new(tmp.path().join("secret").to_string_lossy());
        for id in [MessageId::new("../secret"), absolute] {
            assert!(matches!(session.fetch_raw(&id), Err(MailError::InvalidPath(_))));
            assert!(matches!(session.mark_deleted(&id), Err(MailError::InvalidPath(_))));
            assert!(matches!(session.copy(&id, "inbox"), Err(MailError::InvalidPath(_))));
        }
        session.expunge().unwrap();
        assert!(tmp.path().join("secret.eml").exists());
    }

    #[test]
    fn test_timeout_is_recorded() {
        let tmp = tempfile::tempdir().unwrap();
        let session = LocalConnector::new(tmp.path())
            .connect("me@example.com", "", Duration::from_secs(5))
            .unwrap();
        assert_eq!(session.timeout(), Duration::from_secs(5));
    }
}
