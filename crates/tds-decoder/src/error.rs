/// Errors raised while constructing a decoder or decoding bytes.
///
/// ```text
///   DecodeError
///   ├── UnsupportedEncoding  ← label does not name a supported encoding
///   ├── InvalidData          ← malformed input with `fatal` enabled
///   └── OutputOverflow       ← decoded size of a chunk overflows `usize`
/// ```
///
/// The messages match the ones web platforms use for the same failures, so
/// callers comparing against `TextDecoder` output see identical text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Construction-time failure. No decoder is created.
    #[error("The encoding label provided ('{label}') is invalid.")]
    UnsupportedEncoding { label: String },

    /// A malformed byte sequence was found while `fatal` is set.
    ///
    /// Raised by both the streaming and the final decode. The first
    /// malformed sequence ends the stream; nothing is retried.
    #[error("The encoded data is not valid.")]
    InvalidData,

    /// The worst-case output size for an input chunk is not representable.
    #[error("decoded output for a {input_len}-byte chunk overflows usize")]
    OutputOverflow { input_len: usize },
}
