use encoding_rs::Encoding;

use crate::error::DecodeError;

/// Label used when the caller does not name an encoding.
pub const DEFAULT_LABEL: &str = "utf-8";

/// Decoder options.
///
/// ```text
/// ┌────────────┬─────────┬───────────────────────────────────────────────┐
/// │ Field      │ Default │ Effect                                        │
/// ├────────────┼─────────┼───────────────────────────────────────────────┤
/// │ fatal      │ false   │ Fail on malformed input instead of inserting  │
/// │            │         │ U+FFFD                                        │
/// │ ignore_bom │ false   │ Keep a leading byte-order mark in the output  │
/// └────────────┴─────────┴───────────────────────────────────────────────┘
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecoderOptions {
    pub fatal: bool,
    pub ignore_bom: bool,
}

impl DecoderOptions {
    #[must_use]
    pub fn with_fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    #[must_use]
    pub fn with_ignore_bom(mut self, ignore_bom: bool) -> Self {
        self.ignore_bom = ignore_bom;
        self
    }
}

/// Resolve a label to an encoding.
///
/// Follows the Encoding Standard's label lookup: surrounding ASCII
/// whitespace is ignored, matching is case-insensitive, and aliases map to
/// their canonical encoding (`"utf-16"` and `"unicode"` both resolve to
/// UTF-16LE). The `replacement` encoding cannot be decoded with and is
/// rejected like an unknown label.
///
/// # Errors
///
/// [`DecodeError::UnsupportedEncoding`] if the label is unknown.
pub fn resolve_label(label: &str) -> Result<&'static Encoding, DecodeError> {
    Encoding::for_label_no_replacement(label.as_bytes()).ok_or_else(|| {
        DecodeError::UnsupportedEncoding {
            label: label.to_string(),
        }
    })
}

/// The name an encoding is reported under, e.g. `"utf-16le"`.
#[must_use]
pub fn canonical_name(encoding: &'static Encoding) -> String {
    encoding.name().to_ascii_lowercase()
}
