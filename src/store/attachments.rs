//! Attachment selection and storage.
//!
//! Layout on disk is `<download_root>/<folder>/<message_id>/<file_name>`.
//! Other tooling reads this tree, so the layout is fixed. Writes are not
//! transactional: a crash leaves a partial file that the next run
//! overwrites.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{MailError, Result};
use crate::model::record::{AttachmentRef, MessageId};

/// Allow-list entry that admits every file name.
pub const WILDCARD: &str = "*";

/// Extension allow-list for downloaded attachments.
///
/// Entries are suffixes including the dot (`".csv"`) and are compared
/// case-sensitively: `report.CSV` does not match `".csv"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionFilter {
    allowed: Vec<String>,
}

impl ExtensionFilter {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    /// A filter that admits everything.
    pub fn any() -> Self {
        Self::new([WILDCARD])
    }

    pub fn is_wildcard(&self) -> bool {
        self.allowed.iter().any(|e| e == WILDCARD)
    }

    /// Whether an attachment called `file_name` should be kept.
    pub fn allows(&self, file_name: &str) -> bool {
        if self.is_wildcard() {
            return true;
        }
        match file_suffix(Path::new(file_name)) {
            Some(suffix) => self.allowed.iter().any(|e| *e == suffix),
            None => false,
        }
    }
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self::any()
    }
}

/// The final `.ext` of a file name, dot included.
///
/// `"data.tar.gz"` → `".gz"`, `".hidden"` → `None`, `"README"` → `None`.
pub fn file_suffix(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{e}"))
}

/// `name` as a relative path made only of plain components.
///
/// Empty names, absolute paths, drive prefixes, `.` and `..` are rejected
/// with [`MailError::InvalidPath`].
pub fn plain_relative(name: &str) -> Result<&Path> {
    let path = Path::new(name);
    let plain = path.components().all(|c| matches!(c, Component::Normal(_)));
    if name.is_empty() || !plain {
        return Err(MailError::InvalidPath(name.to_string()));
    }
    Ok(path)
}

/// Like [`plain_relative`], but exactly one component: no separators.
pub fn plain_segment(name: &str) -> Result<&Path> {
    let path = plain_relative(name)?;
    if path.components().count() != 1 {
        return Err(MailError::InvalidPath(name.to_string()));
    }
    Ok(path)
}

/// Directory holding one message's attachments.
///
/// The folder and the identifier must not leave `download_root`.
pub fn record_dir(download_root: &Path, folder: &str, id: &MessageId) -> Result<PathBuf> {
    let folder = plain_relative(folder)?;
    let id = plain_segment(id.as_str())?;
    Ok(download_root.join(folder).join(id))
}

/// Remove one message's attachment directory.
///
/// Idempotent: a directory that was never created or is already gone is
/// not an error.
pub fn delete_record_files(download_root: &Path, folder: &str, id: &MessageId) -> Result<()> {
    let dir = record_dir(download_root, folder, id)?;
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => {
            debug!(dir = %dir.display(), "Deleted record files");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MailError::io(dir, e)),
    }
}

/// Reduce an announced attachment name to a bare file name.
///
/// Directory components are dropped so a name like `../../etc/passwd`
/// cannot escape the record directory. Returns `None` when nothing usable
/// remains.
pub fn safe_file_name(name: &str) -> Option<&str> {
    let last = name.rsplit(|c: char| c == '/' || c == '\\').next()?.trim();
    if last.is_empty() || last == "." || last == ".." {
        None
    } else {
        Some(last)
    }
}

/// Decides which parts of one folder's messages are kept, and writes them.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    download_root: PathBuf,
    folder: String,
    filter: ExtensionFilter,
}

impl AttachmentStore {
    pub fn new(
        download_root: impl Into<PathBuf>,
        folder: impl Into<String>,
        filter: ExtensionFilter,
    ) -> Self {
        Self {
            download_root: download_root.into(),
            folder: folder.into(),
            filter,
        }
    }

    pub fn download_root(&self) -> &Path {
        &self.download_root
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn filter(&self) -> &ExtensionFilter {
        &self.filter
    }

    pub fn record_dir(&self, id: &MessageId) -> Result<PathBuf> {
        record_dir(&self.download_root, &self.folder, id)
    }

    /// Whether an attachment with this announced name would be stored.
    pub fn qualifies(&self, name: &str) -> bool {
        safe_file_name(name).is_some_and(|n| self.filter.allows(n))
    }

    /// Write one attachment if its name passes the allow-list.
    ///
    /// Returns `Ok(None)` for parts that do not qualify. An existing file at
    /// the destination is overwritten.
    pub fn save(&self, id: &MessageId, name: &str, contents: &[u8]) -> Result<Option<AttachmentRef>> {
        let Some(file_name) = safe_file_name(name) else {
            warn!(id = %id, name, "Skipping attachment with unusable file name");
            return Ok(None);
        };
        if !self.filter.allows(file_name) {
            debug!(id = %id, name = file_name, "Attachment extension not allowed");
            return Ok(None);
        }

        let dir = self.record_dir(id)?;
        std::fs::create_dir_all(&dir).map_err(|e| MailError::io(&dir, e))?;
        let path = dir.join(file_name);
        std::fs::write(&path, contents).map_err(|e| MailError::io(&path, e))?;
        debug!(path = %path.display(), bytes = contents.len(), "Saved attachment");

        Ok(Some(AttachmentRef {
            path,
            name: file_name.to_string(),
        }))
    }

    /// Remove one message's attachment directory (idempotent).
    pub fn delete(&self, id: &MessageId) -> Result<()> {
        delete_record_files(&self.download_root, &self.folder, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_match_is_case_sensitive() {
        let filter = ExtensionFilter::new([".csv"]);
        assert!(filter.allows("report.csv"));
        assert!(!filter.allows("report.CSV"));
        assert!(!filter.allows("report.xlsx"));
    }

    #[test]
    fn test_wildcard_allows_everything() {
        let filter = ExtensionFilter::new(["*"]);
        assert!(filter.allows("report.CSV"));
        assert!(filter.allows("README"));
        assert!(ExtensionFilter::default().is_wildcard());
    }

    #[test]
    fn test_file_suffix() {
        assert_eq!(file_suffix(Path::new("data.tar.gz")).as_deref(), Some(".gz"));
        assert_eq!(file_suffix(Path::new("README")), None);
        assert_eq!(file_suffix(Path::new(".hidden")), None);
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("data.csv"), Some("data.csv"));
        assert_eq!(safe_file_name("../../etc/passwd"), Some("passwd"));
        assert_eq!(safe_file_name("C:\\temp\\x.csv"), Some("x.csv"));
        assert_eq!(safe_file_name(".."), None);
        assert_eq!(safe_file_name("dir/"), None);
    }

    #[test]
    fn test_save_and_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(tmp.path(), "inbox", ExtensionFilter::new([".csv"]));
        let id = MessageId::from(7);

        let saved = store.save(&id, "data.csv", b"a,b\n1,2\n").unwrap().unwrap();
        assert_eq!(saved.path, tmp.path().join("inbox").join("7").join("data.csv"));
        assert_eq!(std::fs::read(&saved.path).unwrap(), b"a,b\n1,2\n");

        assert!(store.save(&id, "photo.png", b"png").unwrap().is_none());

        store.delete(&id).unwrap();
        assert!(!store.record_dir(&id).unwrap().exists());
    }

    #[test]
    fn test_save_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(tmp.path(), "inbox", ExtensionFilter::any());
        let id = MessageId::from(1);
        store.save(&id, "x.txt", b"first").unwrap();
        let saved = store.save(&id, "x.txt", b"second").unwrap().unwrap();
        assert_eq!(std::fs::read(saved.path).unwrap(), b"second");
    }

    #[test]
    fn test_delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let id = MessageId::from(99);
        delete_record_files(tmp.path(), "inbox", &id).unwrap();
        delete_record_files(tmp.path(), "inbox", &id).unwrap();
    }

    #[test]
    fn test_record_dir_rejects_escaping_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("downloads");
        let outside = tmp.path().join("keep");
        std::fs::create_dir_all(root.join("inbox")).unwrap();
        std::fs::create_dir_all(&outside).unwrap();

        let absolute = MessageId::new(outside.to_string_lossy());
        let ids = [
            absolute,
            MessageId::new("../.."),
            MessageId::new(".."),
            MessageId::new("1/2"),
            MessageId::new(""),
        ];
        for id in ids {
            let err = delete_record_files(&root, "inbox", &id).unwrap_err();
            assert!(matches!(err, MailError::InvalidPath(_)), "id {id:?} must be rejected");
        }
        assert!(outside.exists(), "directory outside the download root was removed");
        assert!(root.exists());
    }

    #[test]
    fn test_record_dir_rejects_escaping_folders() {
        let tmp = tempfile::tempdir().unwrap();
        let id = MessageId::from(1);
        assert!(record_dir(tmp.path(), "..", &id).is_err());
        assert!(record_dir(tmp.path(), "/etc", &id).is_err());
        assert_eq!(
            record_dir(tmp.path(), "reports/daily", &id).unwrap(),
            tmp.path().join("reports").join("daily").join("1")
        );

        let store = AttachmentStore::new(tmp.path(), "inbox", ExtensionFilter::any());
        assert!(matches!(
            store.save(&MessageId::new("../x"), "a.csv", b"a"),
            Err(MailError::InvalidPath(_))
        ));
        assert!(!tmp.path().join("x").exists());
    }
}
