//! Server-side filter construction.
//!
//! Everything here is pure: no session, no I/O. The textual form produced by
//! [`FilterExpr`]'s `Display` impl is IMAP `SEARCH` syntax: prefix binary
//! `OR`, conjunction by juxtaposition, parentheses for grouping.

use std::fmt;

use chrono::NaiveDate;

use crate::error::{MailError, Result};
use crate::search::matcher::is_unrestricted;

/// A search predicate the mailbox session evaluates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    /// Every message in the folder.
    All,
    /// Subject contains the string.
    Subject(String),
    /// Body contains the string.
    Body(String),
    /// `From:` contains the string.
    From(String),
    /// Internal date on or after the day.
    Since(NaiveDate),
    /// Internal date strictly before the day.
    Before(NaiveDate),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    And(Vec<FilterExpr>),
}

impl FilterExpr {
    pub fn or(a: FilterExpr, b: FilterExpr) -> Self {
        FilterExpr::Or(Box::new(a), Box::new(b))
    }

    /// Disjunction of `terms`, nested to the right. `None` when empty.
    pub fn any_of(terms: Vec<FilterExpr>) -> Option<Self> {
        terms.into_iter().rev().reduce(|acc, term| FilterExpr::or(term, acc))
    }

    /// Conjunction of `terms`; a single term is returned as-is and an empty
    /// list becomes [`FilterExpr::All`].
    pub fn all_of(mut terms: Vec<FilterExpr>) -> Self {
        match terms.len() {
            0 => FilterExpr::All,
            1 => terms.remove(0),
            _ => FilterExpr::And(terms),
        }
    }
}

/// Day-granular window: `since` inclusive, `before` exclusive. Either bound
/// may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub since: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(since: Option<NaiveDate>, before: Option<NaiveDate>) -> Self {
        Self { since, before }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.since.is_none_or(|s| day >= s) && self.before.is_none_or(|b| day < b)
    }
}

/// `"` and `\` escaped, always quoted.
fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        if c == '"' || c == '\\' {
            f.write_str("\\")?;
        }
        write!(f, "{c}")?;
    }
    f.write_str("\"")
}

fn write_expr(f: &mut fmt::Formatter<'_>, expr: &FilterExpr, nested: bool) -> fmt::Result {
    match expr {
        FilterExpr::All => f.write_str("ALL"),
        FilterExpr::Subject(s) => {
            f.write_str("SUBJECT ")?;
            write_quoted(f, s)
        }
        FilterExpr::Body(s) => {
            f.write_str("BODY ")?;
            write_quoted(f, s)
        }
        FilterExpr::From(s) => {
            f.write_str("FROM ")?;
            write_quoted(f, s)
        }
        FilterExpr::Since(d) => write!(f, "SINCE {}", d.format("%d-%b-%Y")),
        FilterExpr::Before(d) => write!(f, "BEFORE {}", d.format("%d-%b-%Y")),
        FilterExpr::Or(a, b) => {
            if nested {
                f.write_str("(")?;
            }
            f.write_str("OR ")?;
            write_expr(f, a, true)?;
            f.write_str(" ")?;
            write_expr(f, b, true)?;
            if nested {
                f.write_str(")")?;
            }
            Ok(())
        }
        FilterExpr::And(terms) => {
            if nested {
                f.write_str("(")?;
            }
            for (i, term) in terms.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write_expr(f, term, true)?;
            }
            if nested {
                f.write_str(")")?;
            }
            Ok(())
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(f, self, false)
    }
}

/// Keyword terms across the enabled targets.
///
/// One OR-group per target when there is more than one keyword, a bare term
/// for a single keyword; the targets are OR-ed together, subject first.
/// Returns `Ok(None)` when the keywords place no restriction (empty list or
/// the `*` wildcard).
pub fn keyword_criteria(
    keywords: &[String],
    search_body: bool,
    search_subject: bool,
) -> Result<Option<FilterExpr>> {
    if is_unrestricted(keywords) {
        return Ok(None);
    }
    if !search_body && !search_subject {
        return Err(MailError::config(
            "keyword search needs at least one of subject or body enabled",
        ));
    }

    let mut per_target = Vec::with_capacity(2);
    if search_subject {
        per_target.extend(FilterExpr::any_of(
            keywords.iter().cloned().map(FilterExpr::Subject).collect(),
        ));
    }
    if search_body {
        per_target.extend(FilterExpr::any_of(
            keywords.iter().cloned().map(FilterExpr::Body).collect(),
        ));
    }
    Ok(FilterExpr::any_of(per_target))
}

/// `SINCE`/`BEFORE` terms for the open or closed bounds of `range`.
pub fn date_criteria(range: &DateRange) -> Vec<FilterExpr> {
    range
        .since
        .map(FilterExpr::Since)
        .into_iter()
        .chain(range.before.map(FilterExpr::Before))
        .collect()
}

/// `FROM` term, or an OR-group when several senders are allowed.
pub fn sender_criteria(senders: &[String]) -> Option<FilterExpr> {
    FilterExpr::any_of(senders.iter().cloned().map(FilterExpr::From).collect())
}

/// Date and sender window only; keyword terms are left to local evaluation.
pub fn candidate_criteria(range: &DateRange, senders: &[String]) -> FilterExpr {
    let mut terms = date_criteria(range);
    terms.extend(sender_criteria(senders));
    FilterExpr::all_of(terms)
}

/// Full server-side filter: dates AND keywords AND senders.
pub fn build_criteria(
    keywords: &[String],
    search_body: bool,
    search_subject: bool,
    range: &DateRange,
    senders: &[String],
) -> Result<FilterExpr> {
    let mut terms = date_criteria(range);
    terms.extend(keyword_criteria(keywords, search_body, search_subject)?);
    terms.extend(sender_criteria(senders));
    Ok(FilterExpr::all_of(terms))
}
