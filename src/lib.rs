//! `mailharvest`: find report emails and harvest their attachments.
//!
//! This crate provides the search-and-retrieval pipeline: building mailbox
//! search filters, fetching and decoding messages into [`MessageRecord`]s,
//! downloading qualifying attachments, and parsing CSV/spreadsheet
//! attachments into tables.
//!
//! [`MessageRecord`]: model::record::MessageRecord

pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod search;
pub mod session;
pub mod store;
