//! `Content-Disposition` construction.

use axum::http::HeaderValue;
use deunicode::deunicode;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters that stay literal in the `filename*` parameter. Everything
/// outside the RFC 5987 attr-char set is percent-encoded.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Builds an `inline` disposition carrying the filename twice: a
/// transliterated ASCII fallback in `filename`, and the exact UTF-8 name,
/// percent-encoded, in `filename*`.
pub(crate) fn inline_utf8(filename: &str) -> HeaderValue {
    let fallback = ascii_fallback(filename);
    let encoded = utf8_percent_encode(filename, ATTR_CHAR);
    let value = format!("inline; filename=\"{fallback}\"; filename*=UTF-8''{encoded}");

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("inline"))
}

fn ascii_fallback(filename: &str) -> String {
    deunicode(filename)
        .chars()
        .filter(|c| !c.is_ascii_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            c => c,
        })
        .collect()
}
