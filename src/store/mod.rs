//! On-disk state: downloaded attachments under `<root>/<folder>/<message_id>/`.

pub mod attachments;
