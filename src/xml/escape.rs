//! Escaping for the text and attribute values the package engine writes.
//!
//! Relationship `Target` values, manifest content types and core property
//! text all pass through here on their way into XML. Reading goes the other
//! way through [`unescape_xml`], which also decodes character references
//! so that `caf&#233;` reads back as `café`.

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;

static XML_ESCAPER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .build(["&", "<", ">", "\"", "'"])
        .expect("static patterns are valid")
});

/// Escape a value for use as element text or a quoted attribute value.
///
/// # Examples
///
/// ```
/// use longan::xml::escape_xml;
/// assert_eq!(escape_xml("word/_rels/a&b.rels"), "word/_rels/a&amp;b.rels");
/// assert_eq!(escape_xml("<r:id=\"rId1\">"), "&lt;r:id=&quot;rId1&quot;&gt;");
/// ```
#[inline]
pub fn escape_xml(s: &str) -> String {
    XML_ESCAPER.replace_all(s, &["&amp;", "&lt;", "&gt;", "&quot;", "&apos;"])
}

/// Decode the predefined entities and numeric character references
/// (`&#233;`, `&#xE9;`) in raw text read from a part.
///
/// A reference that names no known entity or no valid character is kept
/// verbatim.
///
/// # Examples
///
/// ```
/// use longan::xml::unescape_xml;
/// assert_eq!(unescape_xml("&lt;a &amp; b&gt;"), "<a & b>");
/// assert_eq!(unescape_xml("caf&#233; &#x41;"), "café A");
/// assert_eq!(unescape_xml("&amp;lt;"), "&lt;");
/// assert_eq!(unescape_xml("&invalid;"), "&invalid;");
/// ```
pub fn unescape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = memchr::memchr(b'&', rest.as_bytes()) {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = memchr::memchr(b';', tail.as_bytes())
            .and_then(|semi| resolve_reference(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            },
            None => {
                out.push('&');
                rest = &tail[1..];
            },
        }
    }
    out.push_str(rest);
    out
}

fn resolve_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse::<u32>().ok()?,
            };
            // NUL is not a legal XML character
            char::from_u32(code).filter(|&c| c != '\0')
        },
    }
}
