//! Core data model types: message records and parsed tabular payloads.

pub mod record;
pub mod table;
