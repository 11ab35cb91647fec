//! MIME message parsing: body assembly, attachment part selection, HTML-to-text.

use mail_parser::{Message, MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::debug;

use super::header::find_header_end;

/// Maximum nesting of `message/rfc822` parts we descend into.
const MAX_DEPTH: usize = 10;

/// A part that carries a disposition header and a file name.
///
/// Whether it is kept is decided later against the extension allow-list.
#[derive(Debug, Clone)]
pub struct AttachmentPart {
    /// File name as announced by the part (`filename=` or `name=`).
    pub name: String,
    /// `type/subtype`, lowercased.
    pub content_type: String,
    /// Decoded payload.
    pub contents: Vec<u8>,
}

/// Body text and attachment candidates of one message.
#[derive(Debug, Clone, Default)]
pub struct MessageContent {
    /// Non-attachment text parts joined by `\n` in traversal order.
    pub body_text: String,
    /// Named parts with a disposition header, in traversal order.
    pub attachments: Vec<AttachmentPart>,
}

/// Decode a complete raw message into body text and attachment candidates.
///
/// Parts are visited depth-first in structure order. A part contributes to
/// the body iff it is `text/plain` or `text/html` and not disposed as an
/// attachment; HTML is converted to text first. A part is an attachment
/// candidate iff it has a disposition header and a file name.
///
/// Messages `mail-parser` cannot parse fall back to "everything after the
/// headers is the body".
pub fn parse_message(raw_message: &[u8]) -> MessageContent {
    let mut content = MessageContent::default();
    match MessageParser::default().parse(raw_message) {
        Some(msg) => {
            let mut texts = Vec::new();
            walk(&msg, 0, 0, &mut texts, &mut content.attachments);
            content.body_text = texts.join("\n");
        }
        None => {
            debug!("mail-parser rejected message, using raw body");
            content.body_text = extract_body_fallback(raw_message);
        }
    }
    content
}

fn walk(
    msg: &Message<'_>,
    idx: usize,
    depth: usize,
    texts: &mut Vec<String>,
    attachments: &mut Vec<AttachmentPart>,
) {
    let Some(part) = msg.parts.get(idx) else {
        return;
    };

    if let PartType::Multipart(children) = &part.body {
        for &child in children {
            walk(msg, child, depth, texts, attachments);
        }
        return;
    }

    let disposition = part.content_disposition();
    let disposed_as_attachment =
        disposition.is_some_and(|d| d.ctype().eq_ignore_ascii_case("attachment"));
    let name = part.attachment_name().filter(|n| !n.trim().is_empty());
    let content_type = content_type_of(part);

    if let (Some(_), Some(name)) = (disposition, name) {
        attachments.push(AttachmentPart {
            name: name.to_string(),
            content_type: content_type.clone(),
            contents: part.contents().to_vec(),
        });
        if disposed_as_attachment {
            return;
        }
    }

    match &part.body {
        PartType::Message(inner) if !disposed_as_attachment && depth < MAX_DEPTH => {
            walk(inner, 0, depth + 1, texts, attachments);
        }
        PartType::Text(text) if content_type == "text/plain" && !disposed_as_attachment => {
            texts.push(text.to_string());
        }
        PartType::Html(html) if content_type == "text/html" && !disposed_as_attachment => {
            texts.push(html_to_text(html));
        }
        PartType::Text(text) if content_type == "text/html" && !disposed_as_attachment => {
            texts.push(html_to_text(text));
        }
        _ => {}
    }
}

/// Lowercased `type/subtype`, defaulting to `text/plain` (RFC 2045 §5.2).
fn content_type_of(part: &MessagePart<'_>) -> String {
    match part.content_type() {
        Some(ct) => match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub).to_lowercase(),
            None => ct.ctype().to_lowercase(),
        },
        None => "text/plain".to_string(),
    }
}

/// Everything after the first blank line, decoded lossily.
fn extract_body_fallback(data: &[u8]) -> String {
    match find_header_end(data) {
        Some(pos) => String::from_utf8_lossy(&data[pos..])
            .trim_start_matches(['\r', '\n'])
            .to_string(),
        None => String::new(),
    }
}

/// Block-level tags that start a new line.
const BLOCK_TAGS: [&str; 13] = [
    "br", "p", "div", "tr", "li", "h1", "h2", "h3", "h4", "h5", "h6", "table", "hr",
];

/// Convert HTML to plain text.
///
/// Block elements become line breaks, `<script>`/`<style>` blocks are
/// dropped, common entities are decoded and runs of blank lines collapse
/// into one.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(lt) = rest.find('<') {
        out.push_str(&rest[..lt]);
        let after = &rest[lt + 1..];
        let Some(gt) = after.find('>') else {
            rest = "";
            break;
        };
        let tag = after[..gt].trim();
        rest = &after[gt + 1..];

        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        if (name == "script" || name == "style") && !tag.starts_with('/') {
            let close = format!("</{name}");
            rest = match rest.to_ascii_lowercase().find(&close) {
                Some(end) => match rest[end..].find('>') {
                    Some(gt) => &rest[end + gt + 1..],
                    None => "",
                },
                None => "",
            };
        } else if BLOCK_TAGS.contains(&name.as_str()) {
            out.push('\n');
        }
    }
    out.push_str(rest);

    let decoded = decode_entities(&out);

    let mut cleaned = String::with_capacity(decoded.len());
    let mut prev_blank = false;
    for line in decoded.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !prev_blank {
                cleaned.push('\n');
            }
            prev_blank = true;
        } else {
            cleaned.push_str(line);
            cleaned.push('\n');
            prev_blank = false;
        }
    }
    cleaned.trim().to_string()
}

fn decode_entities(s: &str) -> String {
    const ENTITIES: [(&str, &str); 8] = [
        ("&lt;", "<"),
        ("&gt;", ">"),
        ("&quot;", "\""),
        ("&#39;", "'"),
        ("&apos;", "'"),
        ("&nbsp;", " "),
        ("&#160;", " "),
        // Last, so "&amp;lt;" becomes "&lt;" and not "<"
        ("&amp;", "&"),
    ];
    let mut text = s.to_string();
    for (entity, replacement) in ENTITIES {
        text = text.replace(entity, replacement);
    }
    text
}
