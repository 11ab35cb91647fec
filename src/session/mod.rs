//! The mailbox session contract.
//!
//! Every pipeline operation takes an explicit `&mut dyn MailboxSession`.
//! A session is single-command-at-a-time: nothing here is `Sync`, and one
//! session is never shared between in-flight requests.

pub mod local;

use std::time::Duration;

use tracing::debug;

use crate::error::Result;
use crate::search::criteria::FilterExpr;

pub use crate::model::record::MessageId;

/// Default per-command bound, also the default `connection_timeout_secs`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// An authenticated connection to one mailbox.
pub trait MailboxSession {
    /// Make `name` the current folder. Unknown folders fail with
    /// [`MailError::FolderNotFound`](crate::error::MailError::FolderNotFound).
    fn select_folder(&mut self, name: &str) -> Result<()>;

    /// Identifiers of the messages in the current folder matching `filter`,
    /// in server order.
    fn search(&mut self, filter: &FilterExpr) -> Result<Vec<MessageId>>;

    /// The complete RFC 5322 message.
    fn fetch_raw(&mut self, id: &MessageId) -> Result<Vec<u8>>;

    fn copy(&mut self, id: &MessageId, destination: &str) -> Result<()>;

    fn mark_deleted(&mut self, id: &MessageId) -> Result<()>;

    /// Permanently remove every message marked deleted in the current folder.
    fn expunge(&mut self) -> Result<()>;

    fn logout(&mut self) -> Result<()>;

    /// Move a message to `destination`.
    ///
    /// The default emulates MOVE with copy, mark deleted and expunge. A copy
    /// failure aborts before anything is deleted.
    fn move_message(&mut self, id: &MessageId, destination: &str) -> Result<()> {
        self.copy(id, destination)?;
        self.mark_deleted(id)?;
        self.expunge()?;
        debug!(id = %id, destination, "Moved message");
        Ok(())
    }
}

/// Opens sessions.
///
/// `timeout` bounds the login and every later command of a session that
/// talks to a remote server. Sessions without blocking I/O may only record
/// it (see [`local::LocalMailbox`]).
pub trait Connector {
    type Session: MailboxSession;

    /// Log in; bad credentials or an unreachable mailbox fail with
    /// [`MailError::Auth`](crate::error::MailError::Auth).
    fn connect(&self, address: &str, credential: &str, timeout: Duration) -> Result<Self::Session>;
}
