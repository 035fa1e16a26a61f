//! Test fixtures under `tests/fixtures/`.
//!
//! ```text
//! ┌─────────────────────────────┬───────────────────────────────────────────┐
//! │ File                        │ Contents                                  │
//! ├─────────────────────────────┼───────────────────────────────────────────┤
//! │ unicode-sample.html         │ Hand-written multi-script UTF-8 document  │
//! │ unicode-sample.utf16le.txt  │ The same document as UTF-16LE with BOM    │
//! │ utf8-stress.txt             │ Valid boundary cases plus malformed UTF-8 │
//! └─────────────────────────────┴───────────────────────────────────────────┘
//! ```
//!
//! The last two are written by the `generate_fixtures` binary from
//! [`utf16le_with_bom`] and [`utf8_stress`].

use std::path::{Path, PathBuf};

pub const UNICODE_SAMPLE: &str = "unicode-sample.html";
pub const UNICODE_SAMPLE_UTF16LE: &str = "unicode-sample.utf16le.txt";
pub const UTF8_STRESS: &str = "utf8-stress.txt";

/// Directory holding the committed fixtures.
#[must_use]
pub fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Read a fixture by file name.
///
/// # Panics
///
/// Panics if the fixture cannot be read.
#[must_use]
pub fn read(name: &str) -> Vec<u8> {
    let path = fixture_dir().join(name);
    std::fs::read(&path)
        .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
}

/// Encode `text` as UTF-16LE preceded by a byte-order mark.
#[must_use]
pub fn utf16le_with_bom(text: &str) -> Vec<u8> {
    std::iter::once(0xFEFF_u16)
        .chain(text.encode_utf16())
        .flat_map(u16::to_le_bytes)
        .collect()
}

/// UTF-8 decoder stress document.
///
/// Each numbered line frames one case between `|` markers. The first
/// sections are valid; the rest contain malformed sequences that a decoder
/// must replace with U+FFFD, or reject in fatal mode.
#[must_use]
pub fn utf8_stress() -> Vec<u8> {
    let cases: [(&str, &[u8]); 10] = [
        ("correct text", "κόσμε".as_bytes()),
        ("first of each length", "\u{80} \u{800} \u{10000}".as_bytes()),
        ("last of each length", "\u{7F} \u{7FF} \u{FFFF} \u{10FFFF}".as_bytes()),
        ("noncharacters", "\u{FDD0} \u{FFFE}".as_bytes()),
        ("lone continuation bytes", b"\x80 \xBF \x80\xBF\x80"),
        ("lone start bytes", b"\xC0 \xE0 \xF0 \xF8 \xFC"),
        ("truncated sequences", b"\xC2 \xE2\x82 \xF0\x9F\x98"),
        ("impossible bytes", b"\xFE \xFF \xFE\xFE\xFF\xFF"),
        ("overlong encodings", b"\xC0\xAF \xE0\x80\xAF \xF0\x80\x80\xAF"),
        ("surrogates and beyond U+10FFFF", b"\xED\xA0\x80 \xED\xBF\xBF \xF4\x90\x80\x80"),
    ];

    let mut out = b"UTF-8 decoder stress test\n\n".to_vec();
    for (i, (title, bytes)) in cases.iter().enumerate() {
        out.extend_from_slice(format!("{}. {title}: |", i + 1).as_bytes());
        out.extend_from_slice(bytes);
        out.extend_from_slice(b"|\n");
    }
    out
}
