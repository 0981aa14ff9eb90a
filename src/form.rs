//! Form-submission data model: wire decoding, value merging, and the echo
//! response page.
//!
//! A browser form may legitimately repeat a field name (multi-select controls,
//! checkbox groups). The harness keeps every value in arrival order and folds
//! repeats into one `", "`-joined string per field, so assertions see exactly
//! what the browser sent and in what order it sent it.

use indexmap::IndexMap;

/// Delimiter used when folding repeated field values into one string.
pub const VALUE_DELIMITER: &str = ", ";

// ---------------------------------------------------------------------------
// Wire decoding
// ---------------------------------------------------------------------------

/// Decode a submission body into ordered `(name, value)` pairs.
///
/// Dispatches on the `Content-Type` header value: `multipart/form-data` bodies
/// are split on their boundary, everything else is treated as
/// `application/x-www-form-urlencoded` (the default enctype for browser
/// forms). Repeats are preserved; nothing is merged here.
pub fn decode_body(content_type: Option<&str>, body: &[u8]) -> Vec<(String, String)> {
    match content_type {
        Some(ct) if ct.starts_with("multipart/form-data") => {
            match multipart_boundary(ct) {
                Some(boundary) => decode_multipart(body, &boundary),
                None => Vec::new(),
            }
        }
        _ => decode_urlencoded(body),
    }
}

fn decode_urlencoded(body: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(body)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

fn multipart_boundary(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|param| {
        let param = param.trim();
        param
            .strip_prefix("boundary=")
            .map(|b| b.trim_matches('"').to_string())
    })
}

/// Extract `(name, value)` pairs from a `multipart/form-data` body.
///
/// Only the text payload of each part matters for the echo page, so file
/// parts are decoded the same way as plain fields. Parts without a
/// `Content-Disposition` name are skipped.
fn decode_multipart(body: &[u8], boundary: &str) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(body);
    let delimiter = format!("--{boundary}");
    let mut pairs = Vec::new();

    for part in text.split(delimiter.as_str()) {
        let part = part.trim_start_matches("\r\n");
        if part.is_empty() || part.starts_with("--") {
            continue;
        }
        let Some((headers, content)) = part.split_once("\r\n\r\n") else {
            continue;
        };
        let Some(name) = disposition_name(headers) else {
            continue;
        };
        let value = content.trim_end_matches("\r\n").to_string();
        pairs.push((name, value));
    }

    pairs
}

fn disposition_name(headers: &str) -> Option<String> {
    headers
        .lines()
        .find(|l| l.to_ascii_lowercase().starts_with("content-disposition:"))
        .and_then(|line| {
            line.split(';').find_map(|param| {
                let param = param.trim();
                param
                    .strip_prefix("name=")
                    .map(|n| n.trim_matches('"').to_string())
            })
        })
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Fold raw `(name, value)` pairs into one string per field name.
///
/// A repeated name replaces its entry with `old + ", " + new`; exact duplicate
/// values are concatenated too, not deduplicated. The result has exactly one
/// entry per distinct name, in first-occurrence order.
pub fn merge_fields<I>(pairs: I) -> IndexMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut merged: IndexMap<String, String> = IndexMap::new();
    for (name, value) in pairs {
        match merged.get_mut(&name) {
            Some(existing) => {
                existing.push_str(VALUE_DELIMITER);
                existing.push_str(&value);
            }
            None => {
                merged.insert(name, value);
            }
        }
    }
    merged
}

// ---------------------------------------------------------------------------
// Response rendering
// ---------------------------------------------------------------------------

/// Render the submission echo page from the merged field mapping.
///
/// One definition row per field, values HTML-escaped. Browser tests assert on
/// this document, so the field markup carries stable `data-field` hooks.
pub fn render_response(data: &IndexMap<String, String>) -> String {
    let mut rows = String::new();
    for (name, value) in data {
        rows.push_str(&format!(
            "    <dt data-field=\"{}\">{}</dt>\n    <dd>{}</dd>\n",
            html_escape(name),
            html_escape(name),
            html_escape(value),
        ));
    }

    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><title>Form Response</title></head>\n\
         <body>\n\
         <h1>Form Submission Received</h1>\n\
         <dl id=\"form-data\">\n{rows}</dl>\n\
         </body>\n\
         </html>\n"
    )
}

fn html_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
