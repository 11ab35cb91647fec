//! Search pipeline: filter construction, local keyword evaluation, record
//! retrieval and the result policy.
//!
//! [`engine::SearchEngine`] chooses between two strategies:
//!
//! - the **fast path** hands a full filter to the session and returns
//!   identifiers without downloading anything;
//! - the **slow path** fetches every candidate in the date/sender window,
//!   builds a record for each, then matches keywords locally.

pub mod criteria;
pub mod engine;
pub mod matcher;
pub mod policy;
pub mod request;
pub mod retriever;

pub use criteria::{DateRange, FilterExpr};
pub use engine::{SearchEngine, SearchOutcome};
pub use policy::{ResultPolicy, SortDirection};
pub use request::SearchRequest;
