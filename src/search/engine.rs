//! Top-level search: picks the fast or the slow path once per call.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::Result;
use crate::model::record::{MessageId, MessageRecord};
use crate::parser::tabular::{BuiltinTableParser, TableParser};
use crate::session::MailboxSession;
use crate::store::attachments::AttachmentStore;

use super::criteria::{build_criteria, candidate_criteria};
use super::matcher::{evaluate, is_unrestricted, SearchTargets};
use super::request::SearchRequest;
use super::retriever::{discard_records, Progress, Retriever};

/// What a search returns.
#[derive(Debug)]
pub enum SearchOutcome {
    /// Fast path: server-filtered identifiers in server order. Pass them to
    /// [`SearchEngine::retrieve`] for full records.
    Ids(Vec<MessageId>),
    /// Slow path: matching records after the result policy.
    Records(Vec<MessageRecord>),
}

impl SearchOutcome {
    pub fn len(&self) -> usize {
        match self {
            SearchOutcome::Ids(ids) => ids.len(),
            SearchOutcome::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owns the local side of searching: where attachments go and how tables
/// are parsed. The session is passed into every call.
pub struct SearchEngine {
    download_root: PathBuf,
    parser: Box<dyn TableParser>,
    discard_after_parse: bool,
}

impl SearchEngine {
    pub fn new(download_root: impl Into<PathBuf>) -> Self {
        Self {
            download_root: download_root.into(),
            parser: Box::new(BuiltinTableParser),
            discard_after_parse: false,
        }
    }

    pub fn with_parser(mut self, parser: Box<dyn TableParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn discard_after_parse(mut self, discard: bool) -> Self {
        self.discard_after_parse = discard;
        self
    }

    pub fn download_root(&self) -> &Path {
        &self.download_root
    }

    fn retriever(&self, request: &SearchRequest) -> Retriever<'_> {
        let store = AttachmentStore::new(
            &self.download_root,
            &request.folder,
            request.extension_filter(),
        );
        Retriever::new(store, self.parser.as_ref()).discard_after_parse(self.discard_after_parse)
    }

    /// Run one search. Session errors propagate unretried.
    ///
    /// `progress` is only invoked on the slow path.
    pub fn search(
        &self,
        session: &mut dyn MailboxSession,
        request: &SearchRequest,
        progress: Option<Progress<'_>>,
    ) -> Result<SearchOutcome> {
        request.validate()?;
        session.select_folder(&request.folder)?;

        if request.uses_slow_path() {
            self.slow_search(session, request, progress)
                .map(SearchOutcome::Records)
        } else {
            self.fast_search(session, request).map(SearchOutcome::Ids)
        }
    }

    /// Server-side filter only; nothing is downloaded.
    ///
    /// The identifiers are returned in server order and uncapped:
    /// `max_results` and the sort direction apply in [`Self::retrieve`].
    pub fn fast_search(
        &self,
        session: &mut dyn MailboxSession,
        request: &SearchRequest,
    ) -> Result<Vec<MessageId>> {
        let filter = build_criteria(
            &request.keywords,
            request.search_body,
            request.search_subject,
            &request.date_range,
            &request.sender_filter,
        )?;
        debug!(%filter, "Fast search");
        let ids = session.search(&filter)?;
        info!(folder = %request.folder, matches = ids.len(), "Fast search done");
        Ok(ids)
    }

    /// Fetch every candidate in the date/sender window, keep the ones whose
    /// subject, body or attachment names contain a keyword.
    ///
    /// Rejected candidates and records dropped by the result policy have
    /// their attachment directories removed.
    pub fn slow_search(
        &self,
        session: &mut dyn MailboxSession,
        request: &SearchRequest,
        progress: Option<Progress<'_>>,
    ) -> Result<Vec<MessageRecord>> {
        let filter = candidate_criteria(&request.date_range, &request.sender_filter);
        debug!(%filter, "Slow search candidates");
        let candidates = session.search(&filter)?;

        let retriever = self.retriever(request);
        let records = retriever.materialize(session, &candidates, progress)?;

        let (matched, rejected) = split_matches(records, &request.keywords, request.targets());
        discard_records(&rejected);

        let (kept, dropped) = request.policy().partition(matched);
        discard_records(&dropped);

        info!(
            folder = %request.folder,
            candidates = candidates.len(),
            rejected = rejected.len(),
            returned = kept.len(),
            "Slow search done"
        );
        Ok(kept)
    }

    /// Full records for identifiers from an earlier fast search.
    pub fn retrieve(
        &self,
        session: &mut dyn MailboxSession,
        request: &SearchRequest,
        ids: &[MessageId],
        progress: Option<Progress<'_>>,
    ) -> Result<Vec<MessageRecord>> {
        session.select_folder(&request.folder)?;
        self.retriever(request)
            .retrieve(session, ids, &request.policy(), progress)
    }
}

/// Partition records into `(matched, rejected)` by local keyword evaluation.
///
/// Pure: file cleanup for the rejected side is left to the caller. An
/// unrestricted keyword list (empty, or containing `*`) accepts everything
/// without inspecting any record.
pub fn split_matches(
    records: Vec<MessageRecord>,
    keywords: &[String],
    targets: SearchTargets,
) -> (Vec<MessageRecord>, Vec<MessageRecord>) {
    if is_unrestricted(keywords) {
        return (records, Vec::new());
    }
    records.into_iter().partition(|record| {
        let hit = evaluate(record, keywords, targets);
        if let Some(target) = hit {
            debug!(id = %record.id, ?target, "Keyword match");
        }
        hit.is_some()
    })
}
