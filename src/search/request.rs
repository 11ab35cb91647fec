//! One search call's parameters.

use std::time::Duration;

use crate::error::{MailError, Result};
use crate::session::DEFAULT_TIMEOUT;
use crate::store::attachments::{ExtensionFilter, WILDCARD};

use super::criteria::DateRange;
use super::matcher::{is_unrestricted, SearchTargets};
use super::policy::{ResultPolicy, SortDirection};

/// Everything a search needs besides the session and the download root.
///
/// Built per call, never persisted. Defaults mirror the `[search]` config
/// section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub keywords: Vec<String>,
    pub folder: String,
    pub date_range: DateRange,
    pub search_body: bool,
    pub search_subject: bool,
    pub search_attachment_name: bool,
    /// Extension allow-list such as `[".csv", ".xlsx"]`, or `["*"]`.
    pub attachment_file_types: Vec<String>,
    /// Cap on returned records, `0` means unlimited. Fast-path identifier
    /// lists are not capped: without dates there is nothing to sort them
    /// by, so the cap applies when [`SearchEngine::retrieve`] builds them.
    ///
    /// [`SearchEngine::retrieve`]: super::engine::SearchEngine::retrieve
    pub max_results: usize,
    pub include_attachmentless: bool,
    pub sender_filter: Vec<String>,
    /// Fetch and inspect every candidate locally.
    pub accurate_search: bool,
    pub sort_direction: SortDirection,
    pub connection_timeout: Duration,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            folder: "inbox".to_string(),
            date_range: DateRange::default(),
            search_body: false,
            search_subject: true,
            search_attachment_name: false,
            attachment_file_types: vec![WILDCARD.to_string()],
            max_results: 0,
            include_attachmentless: false,
            sender_filter: Vec::new(),
            accurate_search: true,
            sort_direction: SortDirection::RecentFirst,
            connection_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SearchRequest {
    /// Local inspection is needed: attachment names can't be searched
    /// server-side, and accurate mode asks for it explicitly.
    pub fn uses_slow_path(&self) -> bool {
        self.search_attachment_name || self.accurate_search
    }

    pub fn targets(&self) -> SearchTargets {
        SearchTargets {
            subject: self.search_subject,
            body: self.search_body,
            attachment_name: self.search_attachment_name,
        }
    }

    pub fn policy(&self) -> ResultPolicy {
        ResultPolicy {
            include_attachmentless: self.include_attachmentless,
            sort_direction: self.sort_direction,
            max_count: self.max_results,
        }
    }

    pub fn extension_filter(&self) -> ExtensionFilter {
        ExtensionFilter::new(self.attachment_file_types.iter().cloned())
    }

    /// Reject flag combinations that cannot express the keyword filter.
    ///
    /// The fast path needs subject or body enabled whenever keywords
    /// restrict the result; the slow path additionally accepts attachment
    /// names as the only target.
    pub fn validate(&self) -> Result<()> {
        if self.folder.trim().is_empty() {
            return Err(MailError::config("folder name is empty"));
        }
        if is_unrestricted(&self.keywords) {
            return Ok(());
        }
        let targets = self.targets();
        let has_target = if self.uses_slow_path() {
            targets.any()
        } else {
            targets.subject || targets.body
        };
        if !has_target {
            return Err(MailError::config(
                "keyword search needs at least one enabled target (subject, body or attachment name)",
            ));
        }
        Ok(())
    }
}
