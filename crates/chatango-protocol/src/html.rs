//! The small slice of HTML that appears inside message bodies.
//!
//! Bodies carry at most one name tag (`<nCOLOR/>`) and one font tag
//! (`<f xSIZECOLOR="FACE">`) up front, followed by text with entity
//! escapes, `<br/>` line breaks and arbitrary other markup. None of this is
//! real HTML, so it is handled with a few direct string scans rather than a
//! parser.

/// Extracts the inner text of the first `open ... close` tag and removes
/// every occurrence of that tag from `raw`.
///
/// Returns `(first_inner, remainder)`.
pub fn take_tag(raw: &str, open: &str, close: &str) -> (Option<String>, String) {
    let mut first = None;
    let mut rest = String::with_capacity(raw.len());
    let mut cursor = raw;

    while let Some(start) = cursor.find(open) {
        let after_open = &cursor[start + open.len()..];
        let Some(end) = after_open.find(close) else {
            break;
        };
        rest.push_str(&cursor[..start]);
        if first.is_none() {
            first = Some(after_open[..end].to_string());
        }
        cursor = &after_open[end + close.len()..];
    }
    rest.push_str(cursor);
    (first, rest)
}

/// Font settings decoded from the inner text of an `<f ...>` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontTag {
    pub size: u8,
    pub color: String,
    pub face: u8,
}

/// Parses the inner text of a font tag such as ` x12F00="1"`.
///
/// The `x` field packs an optional size in front of a 3- or 6-digit hex
/// colour. Its length modulo 3 is the number of size digits, so a field
/// whose length is a multiple of 3 is colour only and gets
/// `default_size`. A missing or unparsable size also falls back to
/// `default_size`; a missing or unparsable face is 0.
pub fn parse_font_tag(inner: &str, default_size: u8) -> FontTag {
    let inner = inner.trim_start();
    let (field, face) = match inner.split_once('=') {
        Some((field, face)) => (field.trim(), face),
        None => (inner.trim(), ""),
    };
    let field = field.strip_prefix('x').unwrap_or(field);

    let size_digits = field.chars().count() % 3;
    let split_at = field
        .char_indices()
        .nth(size_digits)
        .map(|(i, _)| i)
        .unwrap_or(field.len());
    let (size, color) = field.split_at(split_at);

    let size = if size.is_empty() {
        default_size
    } else {
        size.parse().unwrap_or(default_size)
    };
    let face = face
        .trim()
        .trim_start_matches(['"', '\''])
        .split(['"', '\''])
        .next()
        .and_then(|f| f.trim().parse().ok())
        .unwrap_or(0);

    FontTag {
        size,
        color: color.to_string(),
        face,
    }
}

/// Reduces a body fragment to plain text.
///
/// Every tag is removed except `<br/>`, which becomes a newline. Entities
/// are decoded in a single pass (so `&amp;lt;` yields `&lt;`), trailing
/// newlines are trimmed, and thumbnail image links are pointed at the
/// full-size image.
pub fn clean_body(raw: &str) -> String {
    let text = decode_entities(&strip_tags(raw));
    rewrite_thumbnails(text.trim_end_matches('\n'))
}

fn strip_tags(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut cursor = raw;
    while let Some(start) = cursor.find('<') {
        let Some(len) = cursor[start..].find('>') else {
            break;
        };
        out.push_str(&cursor[..start]);
        let tag = &cursor[start + 1..start + len];
        if is_line_break(tag) {
            out.push('\n');
        }
        cursor = &cursor[start + len + 1..];
    }
    out.push_str(cursor);
    out
}

fn is_line_break(tag: &str) -> bool {
    tag.eq_ignore_ascii_case("br/")
}

const ENTITIES: [(&str, char); 6] = [
    ("&amp;", '&'),
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&quot;", '"'),
    ("&apos;", '\''),
    ("&#39;", '\''),
];

/// Decodes the six entities the server emits. Anything else is left as-is.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = text;
    while let Some(amp) = cursor.find('&') {
        out.push_str(&cursor[..amp]);
        let tail = &cursor[amp..];
        match ENTITIES.iter().find(|(name, _)| tail.starts_with(name)) {
            Some((name, ch)) => {
                out.push(*ch);
                cursor = &tail[name.len()..];
            }
            None => {
                out.push('&');
                cursor = &tail[1..];
            }
        }
    }
    out.push_str(cursor);
    out
}

/// Escapes `&`, `<` and `>` for an outgoing body. Quotes pass through.
pub fn escape_text(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

/// Rewrites `/t_NNN.ext` to `/l_NNN.ext`.
fn rewrite_thumbnails(text: &str) -> String {
    const MARKER: &str = "/t_";
    let mut out = String::with_capacity(text.len());
    let mut cursor = text;
    while let Some(pos) = cursor.find(MARKER) {
        let after = &cursor[pos + MARKER.len()..];
        out.push_str(&cursor[..pos]);
        if is_thumbnail_name(after) {
            out.push_str("/l_");
        } else {
            out.push_str(MARKER);
        }
        cursor = after;
    }
    out.push_str(cursor);
    out
}

/// Whether `s` starts with `digits.ext`.
fn is_thumbnail_name(s: &str) -> bool {
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return false;
    }
    let rest = &s.as_bytes()[digits..];
    rest.first() == Some(&b'.') && rest.get(1).is_some_and(u8::is_ascii_alphanumeric)
}
