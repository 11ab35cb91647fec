//! RFC 5322 header parsing: folding, encoded-words (RFC 2047), and date parsing.
//!
//! Everything here is best-effort. A header that cannot be decoded degrades
//! to lossy UTF-8 (U+FFFD for bad bytes) instead of failing the message.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

/// The envelope fields a [`MessageRecord`](crate::model::record::MessageRecord) needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageHeaders {
    /// Decoded `From:` value, `None` if the header is absent.
    pub sender: Option<String>,
    /// Decoded `Subject:` value, `None` if the header is absent.
    pub subject: Option<String>,
    /// Parsed `Date:` value, `None` if absent or unparsable.
    pub date: Option<DateTime<Utc>>,
}

/// Extract sender, subject and date from a complete raw message.
pub fn parse_headers(raw_message: &[u8]) -> MessageHeaders {
    let end = find_header_end(raw_message).unwrap_or(raw_message.len());
    let text = String::from_utf8_lossy(strip_bom(&raw_message[..end]));
    let headers = unfold_headers(&text);

    MessageHeaders {
        sender: get_header(&headers, "from").map(|v| decode_encoded_words(&v)),
        subject: get_header(&headers, "subject").map(|v| decode_encoded_words(&v)),
        date: get_header(&headers, "date").and_then(|v| parse_date(&v)),
    }
}

/// Byte offset of the blank line that ends the header section.
pub fn find_header_end(data: &[u8]) -> Option<usize> {
    let lf = data.windows(2).position(|w| w == b"\n\n");
    let crlf = data.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

/// Join continuation lines onto their header.
///
/// Returns `(lowercase_name, raw_value)` pairs in order of appearance.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                last.1.push(' ');
                last.1.push_str(line.trim());
            }
        } else if let Some((name, value)) = line.split_once(':') {
            result.push((name.trim().to_lowercase(), value.trim().to_string()));
        }
    }

    result
}

/// First value for a header name (already lowercased).
fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`.
/// Tokens that do not decode are kept verbatim.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two encoded words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        match decode_one_word(&remaining[start + 2..]) {
            Some((text, consumed)) => {
                result.push_str(&text);
                remaining = &remaining[start + 2 + consumed..];
                last_was_encoded = true;
            }
            None => {
                result.push_str("=?");
                remaining = &remaining[start + 2..];
                last_was_encoded = false;
            }
        }
    }

    result.push_str(remaining);
    result
}

/// Decode `charset?enc?text?=` (the part after `=?`).
///
/// Returns the decoded text and the number of bytes consumed.
fn decode_one_word(s: &str) -> Option<(String, usize)> {
    let (charset, rest) = s.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let encoded = &rest[..end];
    let consumed = charset.len() + 1 + encoding.len() + 1 + end + 2;

    // RFC 2231 language suffix: "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);

    let bytes = match encoding {
        "B" | "b" => decode_base64(encoded)?,
        "Q" | "q" => decode_q(encoded),
        _ => return None,
    };

    Some((decode_charset(charset, &bytes), consumed))
}

/// Standard-alphabet base64, tolerant of missing padding and whitespace.
fn decode_base64(input: &str) -> Option<Vec<u8>> {
    fn value(c: u8) -> Option<u32> {
        match c {
            b'A'..=b'Z' => Some(u32::from(c - b'A')),
            b'a'..=b'z' => Some(u32::from(c - b'a') + 26),
            b'0'..=b'9' => Some(u32::from(c - b'0') + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }

    let mut out = Vec::with_capacity(input.len() * 3 / 4);
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    for &c in input.as_bytes() {
        if c == b'=' {
            break;
        }
        if c.is_ascii_whitespace() {
            continue;
        }
        acc = (acc << 6) | value(c)?;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    Some(out)
}

/// Q-encoding: `_` is a space, `=XX` a hex byte.
fn decode_q(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                out.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

/// Decode bytes in a named charset, falling back to lossy UTF-8.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    if charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("utf8") {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    match encoding_rs::Encoding::for_label(charset.as_bytes()) {
        Some(encoding) => encoding.decode(bytes).0.into_owned(),
        None => {
            warn!(charset, "Unknown charset, falling back to UTF-8 lossy");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Parse an email date string in the formats seen in real mailboxes.
///
/// RFC 2822 first, then RFC 3339, then a list of broken-but-common variants.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    // Trailing comments: "... +0000 (UTC)"
    let no_comment = match trimmed.find(" (") {
        Some(pos) => &trimmed[..pos],
        None => trimmed,
    };
    let candidate = replace_named_tz(strip_day_of_week(no_comment).trim());

    const FORMATS: [&str; 7] = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M %z",
        "%d %b %Y %H:%M:%S",
        "%d-%b-%Y %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
    ];

    for fmt in FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&candidate, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(&candidate, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

/// Drop a leading `"Thu, "` / `"Thu "`.
fn strip_day_of_week(s: &str) -> &str {
    const DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in DAYS {
        if let Some(rest) = s.strip_prefix(day) {
            return rest.trim_start_matches(',').trim_start();
        }
    }
    s
}

/// Replace a trailing timezone abbreviation with its numeric offset.
fn replace_named_tz(s: &str) -> String {
    const ZONES: [(&str, &str); 13] = [
        ("CEST", "+0200"),
        ("CET", "+0100"),
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("JST", "+0900"),
    ];
    for (name, offset) in ZONES {
        if let Some(head) = s.strip_suffix(name) {
            return format!("{head}{offset}");
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers_basic() {
        let raw = b"From: Rates Desk <rates@bank.example>\r\nSubject: Daily rates\r\nDate: Wed, 01 May 2024 09:30:00 +0000\r\n\r\nbody";
        let headers = parse_headers(raw);
        assert_eq!(headers.sender.as_deref(), Some("Rates Desk <rates@bank.example>"));
        assert_eq!(headers.subject.as_deref(), Some("Daily rates"));
        assert_eq!(
            headers.date.unwrap().format("%Y-%m-%d %H:%M").to_string(),
            "2024-05-01 09:30"
        );
    }

    #[test]
    fn test_parse_headers_missing_fields() {
        let headers = parse_headers(b"X-Other: 1\n\nbody");
        assert_eq!(headers, MessageHeaders::default());
    }

    #[test]
    fn test_parse_headers_ignores_body_lines() {
        let headers = parse_headers(b"Subject: real\n\nSubject: fake\n");
        assert_eq!(headers.subject.as_deref(), Some("real"));
    }

    #[test]
    fn test_invalid_utf8_degrades_to_replacement() {
        let raw = b"Subject: caf\xE9 report\n\n";
        let subject = parse_headers(raw).subject.unwrap();
        assert!(subject.contains('\u{FFFD}'), "got: {subject}");
        assert!(subject.ends_with("report"));
    }

    #[test]
    fn test_unfold_headers() {
        let text = "Subject: This is a long\n\tsubject line\nFrom: user@example.com\n";
        let headers = unfold_headers(text);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].0, "subject");
        assert_eq!(headers[0].1, "This is a long subject line");
    }

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SG9sYSBtdW5kbw==?="), "Hola mundo");
    }

    #[test]
    fn test_decode_multiple_encoded_words() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_q_iso8859() {
        assert_eq!(
            decode_encoded_words("=?ISO-8859-1?Q?R=E9sum=E9_du_projet?="),
            "Résumé du projet"
        );
    }

    #[test]
    fn test_decode_mixed_plain_and_encoded() {
        assert_eq!(
            decode_encoded_words("Re: =?UTF-8?B?SG9sYQ==?= there"),
            "Re: Hola there"
        );
    }

    #[test]
    fn test_decode_broken_word_kept_verbatim() {
        assert_eq!(decode_encoded_words("=?UTF-8?X?abc?="), "=?UTF-8?X?abc?=");
        assert_eq!(decode_encoded_words("price =? 5"), "price =? 5");
    }

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"From: a@b.com\nSubject: Hi\n\nBody\n"), Some(25));
        assert_eq!(
            find_header_end(b"From: a@b.com\r\nSubject: Hi\r\n\r\nBody\r\n"),
            Some(26)
        );
        assert_eq!(find_header_end(b"Subject: no body"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("Thu, 04 Jan 2024 10:00:00 +0000").is_some());
        assert!(parse_date("04 Jan 2024 10:00:00 +0000").is_some());
        assert!(parse_date("Thu, 04 Jan 2024 10:00:00 EST").is_some());
        assert!(parse_date("Thu, 04 Jan 2024 10:00:00 +0000 (UTC)").is_some());
        assert!(parse_date("2024-01-04T10:00:00Z").is_some());
        assert!(parse_date("2024-01-04 10:00:00").is_some());
    }

    #[test]
    fn test_parse_date_garbage() {
        assert!(parse_date("").is_none());
        assert!(parse_date("not a date").is_none());
    }

    #[test]
    fn test_parse_date_named_tz_offset() {
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 EST").unwrap();
        assert_eq!(dt.format("%H").to_string(), "15");
    }
}
