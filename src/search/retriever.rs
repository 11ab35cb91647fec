//! Turning message identifiers into [`MessageRecord`]s.
//!
//! Each record is built from one `fetch_raw` call: headers are decoded
//! defensively, the MIME tree is walked once, qualifying attachments are
//! written through the [`AttachmentStore`] and tabular ones parsed.

use tracing::{debug, info, warn};

use crate::error::{MailError, Result};
use crate::model::record::{MessageId, MessageRecord};
use crate::parser::header::parse_headers;
use crate::parser::mime::{parse_message, AttachmentPart};
use crate::parser::tabular::{is_tabular, TableParser};
use crate::session::MailboxSession;
use crate::store::attachments::AttachmentStore;

use super::policy::ResultPolicy;

/// Progress callback: `(processed, total)`, return `false` to cancel.
pub type Progress<'a> = &'a dyn Fn(usize, usize) -> bool;

/// Builds records for one folder into one download root.
pub struct Retriever<'p> {
    store: AttachmentStore,
    parser: &'p dyn TableParser,
    discard_after_parse: bool,
}

impl<'p> Retriever<'p> {
    pub fn new(store: AttachmentStore, parser: &'p dyn TableParser) -> Self {
        Self {
            store,
            parser,
            discard_after_parse: false,
        }
    }

    /// Unlink each attachment file once its table has been parsed. The
    /// descriptors and tables stay on the record.
    pub fn discard_after_parse(mut self, discard: bool) -> Self {
        self.discard_after_parse = discard;
        self
    }

    pub fn store(&self) -> &AttachmentStore {
        &self.store
    }

    /// Fetch one message and materialize it.
    ///
    /// A failed fetch is returned as-is and touches no files. A failed
    /// attachment write removes the record directory before returning.
    /// Tabular parse failures only drop that file's table entry.
    pub fn build_record(
        &self,
        session: &mut dyn MailboxSession,
        id: &MessageId,
    ) -> Result<MessageRecord> {
        let raw = session.fetch_raw(id)?;
        let headers = parse_headers(&raw);
        let content = parse_message(&raw);

        let mut record = MessageRecord::new(
            id.clone(),
            self.store.folder(),
            self.store.download_root(),
        );
        record.sender = headers.sender;
        record.subject = headers.subject;
        record.received_at = headers.date;
        record.body_text = content.body_text;

        let mut wrote = false;
        if let Err(e) = self.save_attachments(id, &content.attachments, &mut record, &mut wrote) {
            // Only a directory this call started writing into is removed
            if wrote {
                self.discard_id(id);
            }
            return Err(e);
        }

        if self.discard_after_parse {
            for attachment in &record.attachments {
                if let Err(e) = std::fs::remove_file(&attachment.path) {
                    warn!(path = %attachment.path.display(), error = %e, "Could not discard attachment");
                }
            }
        }

        debug!(
            id = %id,
            attachments = record.attachments.len(),
            tables = record.tables.len(),
            "Built record"
        );
        Ok(record)
    }

    /// Save the qualifying parts and parse the tabular ones into `record`.
    ///
    /// `wrote` is set before the first write is attempted.
    fn save_attachments(
        &self,
        id: &MessageId,
        parts: &[AttachmentPart],
        record: &mut MessageRecord,
        wrote: &mut bool,
    ) -> Result<()> {
        for part in parts {
            *wrote |= self.store.qualifies(&part.name);
            let Some(saved) = self.store.save(id, &part.name, &part.contents)? else {
                continue;
            };

            if is_tabular(&saved.name) {
                match self.parser.parse(&saved.name, &part.contents) {
                    Ok(table) => {
                        record.tables.insert(saved.name.clone(), table);
                    }
                    Err(e) => {
                        warn!(id = %id, file = %saved.name, error = %e, "Keeping raw attachment only");
                        record.tables.shift_remove(&saved.name);
                    }
                }
            }

            // A repeated file name overwrote the earlier file on disk
            match record.attachments.iter_mut().find(|a| a.path == saved.path) {
                Some(existing) => *existing = saved,
                None => record.attachments.push(saved),
            }
        }
        Ok(())
    }

    /// Build a record per identifier, in order.
    ///
    /// On cancellation or on any error, every directory written by this call
    /// is removed before returning.
    pub fn materialize(
        &self,
        session: &mut dyn MailboxSession,
        ids: &[MessageId],
        progress: Option<Progress<'_>>,
    ) -> Result<Vec<MessageRecord>> {
        let progress = progress.unwrap_or(&|_, _| true);
        let total = ids.len();
        let mut records = Vec::with_capacity(total);

        for (i, id) in ids.iter().enumerate() {
            if !progress(i, total) {
                debug!("Retrieval cancelled at {i}/{total}");
                discard_records(&records);
                return Err(MailError::Cancelled);
            }
            match self.build_record(session, id) {
                Ok(record) => records.push(record),
                Err(e) => {
                    discard_records(&records);
                    return Err(e);
                }
            }
        }

        let _ = progress(total, total);
        Ok(records)
    }

    /// Materialize `ids` and apply `policy`. Records the policy drops have
    /// their files removed.
    pub fn retrieve(
        &self,
        session: &mut dyn MailboxSession,
        ids: &[MessageId],
        policy: &ResultPolicy,
        progress: Option<Progress<'_>>,
    ) -> Result<Vec<MessageRecord>> {
        let records = self.materialize(session, ids, progress)?;
        let (kept, dropped) = policy.partition(records);
        discard_records(&dropped);
        info!(
            folder = self.store.folder(),
            requested = ids.len(),
            returned = kept.len(),
            "Retrieved records"
        );
        Ok(kept)
    }

    fn discard_id(&self, id: &MessageId) {
        if let Err(e) = self.store.delete(id) {
            warn!(id = %id, error = %e, "Failed to clean up attachment directory");
        }
    }
}

/// Delete the attachment directories of records that will not be returned.
///
/// Failures are logged, not returned: the records are being dropped anyway.
pub fn discard_records(records: &[MessageRecord]) {
    for record in records {
        if let Err(e) = record.delete_files() {
            warn!(id = %record.id, error = %e, "Failed to clean up attachment directory");
        }
    }
}
