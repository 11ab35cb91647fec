//! Local keyword evaluation and the general-purpose [`StringMatch`].

use regex::Regex;

use crate::error::{MailError, Result};
use crate::model::record::MessageRecord;

/// The keyword that matches every candidate.
pub const WILDCARD_KEYWORD: &str = "*";

/// How a pattern is compared against a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchMode {
    /// Treat the pattern as a regular expression.
    pub regex: bool,
    /// Require the whole string to match, not just a part of it.
    pub complete: bool,
}

impl MatchMode {
    pub const fn plain(complete: bool) -> Self {
        Self {
            regex: false,
            complete,
        }
    }

    pub const fn regex(complete: bool) -> Self {
        Self {
            regex: true,
            complete,
        }
    }
}

/// Outcome of matching one pattern against one string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringMatch {
    pub found: bool,
    /// Byte offset of the match start.
    pub index: Option<usize>,
    /// For partial regex matches, the concatenated capture groups (or the
    /// whole match when the pattern has none); otherwise the haystack.
    pub matched_string: Option<String>,
    pub matched_groups: Vec<String>,
}

impl StringMatch {
    /// Match `pattern` against `haystack`.
    ///
    /// Only an invalid regular expression is an error.
    pub fn find(pattern: &str, haystack: &str, mode: MatchMode) -> Result<Self> {
        if mode.regex {
            Self::find_regex(pattern, haystack, mode.complete)
        } else {
            Ok(Self::find_plain(pattern, haystack, mode.complete))
        }
    }

    fn whole(haystack: &str) -> Self {
        Self {
            found: true,
            index: Some(0),
            matched_string: Some(haystack.to_string()),
            matched_groups: vec![haystack.to_string()],
        }
    }

    fn find_plain(pattern: &str, haystack: &str, complete: bool) -> Self {
        if complete {
            return if pattern == haystack {
                Self::whole(haystack)
            } else {
                Self::default()
            };
        }
        match haystack.find(pattern) {
            Some(index) => Self {
                index: Some(index),
                ..Self::whole(haystack)
            },
            None => Self::default(),
        }
    }

    fn find_regex(pattern: &str, haystack: &str, complete: bool) -> Result<Self> {
        let source = if complete {
            format!("^(?:{pattern})$")
        } else {
            pattern.to_string()
        };
        let re = Regex::new(&source)
            .map_err(|e| MailError::config(format!("invalid pattern {pattern:?}: {e}")))?;

        if complete {
            return Ok(if re.is_match(haystack) {
                Self::whole(haystack)
            } else {
                Self::default()
            });
        }

        let Some(caps) = re.captures(haystack) else {
            return Ok(Self::default());
        };
        let Some(whole) = caps.get(0) else {
            return Ok(Self::default());
        };
        let groups: Vec<String> = caps
            .iter()
            .skip(1)
            .map(|g| g.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect();
        let matched_string = if groups.is_empty() {
            whole.as_str().to_string()
        } else {
            groups.concat()
        };

        Ok(Self {
            found: true,
            index: Some(whole.start()),
            matched_string: Some(matched_string),
            matched_groups: groups,
        })
    }
}

impl PartialEq<str> for StringMatch {
    fn eq(&self, other: &str) -> bool {
        self.matched_string.as_deref() == Some(other)
    }
}

impl PartialEq<&str> for StringMatch {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

/// Where a keyword matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTarget {
    Subject,
    Body,
    AttachmentName,
    /// The keyword list was empty or contained [`WILDCARD_KEYWORD`].
    Wildcard,
}

/// Which parts of a record keywords are checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTargets {
    pub subject: bool,
    pub body: bool,
    pub attachment_name: bool,
}

impl SearchTargets {
    pub fn any(&self) -> bool {
        self.subject || self.body || self.attachment_name
    }
}

/// Whether the keyword list places no restriction on candidates.
pub fn is_unrestricted(keywords: &[String]) -> bool {
    keywords.is_empty() || keywords.iter().any(|k| k == WILDCARD_KEYWORD)
}

fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    let haystack = haystack.to_lowercase();
    keywords
        .iter()
        .any(|k| haystack.contains(k.to_lowercase().as_str()))
}

/// First target in subject, body, attachment-name order where any keyword
/// occurs, case-insensitively. Later targets are not inspected once one
/// matches.
pub fn evaluate(
    record: &MessageRecord,
    keywords: &[String],
    targets: SearchTargets,
) -> Option<MatchTarget> {
    if is_unrestricted(keywords) {
        return Some(MatchTarget::Wildcard);
    }
    if targets.subject && record.subject.as_deref().is_some_and(|s| contains_any(s, keywords)) {
        return Some(MatchTarget::Subject);
    }
    if targets.body && contains_any(&record.body_text, keywords) {
        return Some(MatchTarget::Body);
    }
    if targets.attachment_name && record.attachment_names().any(|n| contains_any(n, keywords)) {
        return Some(MatchTarget::AttachmentName);
    }
    None
}
