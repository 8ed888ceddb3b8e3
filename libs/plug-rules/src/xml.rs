//! Lenient XML helpers
//!
//! Vendor responses are frequently non-conformant (wrong charset, stray
//! markup, escaped documents nested in text nodes), so nothing here validates
//! structure. Lookups are literal, ASCII case-insensitive substring scans and a
//! missing tag is an empty value, never an error.

use std::borrow::Cow;

fn open_tag(tag: &str) -> String {
    format!("<{}>", tag.to_ascii_lowercase())
}

fn close_tag(tag: &str) -> String {
    format!("</{}>", tag.to_ascii_lowercase())
}

/// Text between the first `<tag>` and the following `</tag>`, trimmed
///
/// Returns `""` when either tag is absent.
pub fn extract_tag<'a>(xml: &'a str, tag: &str) -> &'a str {
    // ASCII lowering keeps byte offsets aligned with `xml`
    let lower = xml.to_ascii_lowercase();
    let open = open_tag(tag);
    let Some(start) = lower.find(&open) else {
        return "";
    };
    let body = start + open.len();
    match lower[body..].find(&close_tag(tag)) {
        Some(len) => xml[body..body + len].trim(),
        None => "",
    }
}

/// First non-empty value among `tags`, tried in order
pub fn extract_first<'a>(xml: &'a str, tags: &[&str]) -> &'a str {
    tags.iter()
        .map(|tag| extract_tag(xml, tag))
        .find(|value| !value.is_empty())
        .unwrap_or("")
}

/// Inner text of every `<name>` element, in document order
///
/// Opening tags may carry attributes; self-closing elements yield `""`.
/// Elements are not expected to nest inside themselves.
pub fn elements<'a>(xml: &'a str, name: &str) -> Vec<&'a str> {
    let lower = xml.to_ascii_lowercase();
    let open = format!("<{}", name.to_ascii_lowercase());
    let close = close_tag(name);
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(rel) = lower[pos..].find(&open) {
        let start = pos + rel;
        let after_name = start + open.len();
        // `<Rule` must not match `<RuleID>`
        let boundary = lower[after_name..].chars().next();
        if !matches!(boundary, Some(c) if c == '>' || c == '/' || c.is_ascii_whitespace()) {
            pos = after_name;
            continue;
        }
        let Some(gt) = lower[after_name..].find('>') else {
            break;
        };
        let open_end = after_name + gt;
        if lower[..open_end].ends_with('/') {
            found.push("");
            pos = open_end + 1;
            continue;
        }
        let body = open_end + 1;
        let Some(len) = lower[body..].find(&close) else {
            break;
        };
        found.push(&xml[body..body + len]);
        pos = body + len + close.len();
    }

    found
}

/// ASCII case-insensitive substring test
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

/// Escape text for embedding in an XML text node or attribute
pub fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

/// Decode the five predefined entities plus numeric character references
///
/// Unknown or malformed references are kept verbatim, where
/// `quick_xml::escape::unescape` would reject the whole text.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_reference(&rest[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            },
            None => {
                out.push('&');
                rest = &rest[1..];
            },
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(code)
        },
    }
}
