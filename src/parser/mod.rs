//! Message decoding: header decoding, MIME body/attachment assembly, and
//! tabular attachment parsing.

pub mod header;
pub mod mime;
pub mod tabular;
