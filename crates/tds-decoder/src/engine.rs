use std::fmt;

use encoding_rs::{CoderResult, Decoder, DecoderResult, Encoding};
use tracing::{debug, trace};

use crate::error::DecodeError;
use crate::options::{DecoderOptions, canonical_name, resolve_label};

/// A stateful byte-to-text decoder for one encoding.
///
/// Implementations carry incomplete trailing sequences between
/// [`decode_streaming`](Self::decode_streaming) calls and hold some
/// underlying resource while they do. [`decode_final`](Self::decode_final)
/// flushes whatever is pending and releases that resource, on success and on
/// failure alike. Calling it again on a released engine returns empty text.
pub trait DecoderEngine: Send + 'static {
    /// Lowercase canonical encoding name, e.g. `"utf-16le"`.
    fn encoding(&self) -> &str;

    fn fatal(&self) -> bool;

    fn ignore_bom(&self) -> bool;

    /// Decode `bytes`, keeping any incomplete trailing sequence for later.
    ///
    /// # Errors
    ///
    /// [`DecodeError::InvalidData`] on malformed input when `fatal` is set.
    fn decode_streaming(&mut self, bytes: &[u8]) -> Result<String, DecodeError>;

    /// Flush pending state and release the resource.
    ///
    /// # Errors
    ///
    /// [`DecodeError::InvalidData`] if a pending sequence is incomplete and
    /// `fatal` is set. The resource is released anyway.
    fn decode_final(&mut self) -> Result<String, DecodeError>;

    /// Whether the engine currently holds its resource.
    fn holds_resource(&self) -> bool;
}

/// [`DecoderEngine`] backed by an `encoding_rs` decoder.
///
/// The `encoding_rs::Decoder` is the held resource. It is opened when the
/// `TextDecoder` is created, dropped by [`decode_final`](DecoderEngine::decode_final),
/// and reopened on the next streaming call, which gives the same reset
/// behaviour as a web `TextDecoder` after a non-streaming `decode()`.
pub struct TextDecoder {
    encoding: &'static Encoding,
    name: String,
    options: DecoderOptions,
    handle: Option<Decoder>,
}

impl TextDecoder {
    /// Create a decoder for `label`.
    ///
    /// # Errors
    ///
    /// [`DecodeError::UnsupportedEncoding`] if the label is unknown.
    pub fn new(label: &str, options: DecoderOptions) -> Result<Self, DecodeError> {
        let encoding = resolve_label(label)?;
        let name = canonical_name(encoding);
        trace!(label, encoding = %name, "decoder opened");
        Ok(Self {
            encoding,
            name,
            options,
            handle: Some(open_handle(encoding, options.ignore_bom)),
        })
    }

    /// Decode a complete buffer in one call and release the resource.
    ///
    /// Any state left by earlier streaming calls is consumed first.
    ///
    /// # Errors
    ///
    /// [`DecodeError::InvalidData`] on malformed input when `fatal` is set.
    pub fn decode(&mut self, bytes: &[u8]) -> Result<String, DecodeError> {
        let mut handle = self
            .handle
            .take()
            .unwrap_or_else(|| open_handle(self.encoding, self.options.ignore_bom));
        decode_into(&mut handle, bytes, true, self.options.fatal)
    }
}

impl DecoderEngine for TextDecoder {
    fn encoding(&self) -> &str {
        &self.name
    }

    fn fatal(&self) -> bool {
        self.options.fatal
    }

    fn ignore_bom(&self) -> bool {
        self.options.ignore_bom
    }

    fn decode_streaming(&mut self, bytes: &[u8]) -> Result<String, DecodeError> {
        let (encoding, ignore_bom) = (self.encoding, self.options.ignore_bom);
        let handle = self
            .handle
            .get_or_insert_with(|| open_handle(encoding, ignore_bom));
        decode_into(handle, bytes, false, self.options.fatal)
    }

    fn decode_final(&mut self) -> Result<String, DecodeError> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(String::new());
        };
        let result = decode_into(&mut handle, &[], true, self.options.fatal);
        debug!(encoding = %self.name, ok = result.is_ok(), "decoder released");
        result
    }

    fn holds_resource(&self) -> bool {
        self.handle.is_some()
    }
}

impl fmt::Debug for TextDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextDecoder")
            .field("encoding", &self.name)
            .field("fatal", &self.options.fatal)
            .field("ignore_bom", &self.options.ignore_bom)
            .field("holds_resource", &self.handle.is_some())
            .finish()
    }
}

fn open_handle(encoding: &'static Encoding, ignore_bom: bool) -> Decoder {
    if ignore_bom {
        encoding.new_decoder_without_bom_handling()
    } else {
        encoding.new_decoder_with_bom_removal()
    }
}

/// Run one decode call, growing the output until all of `src` is consumed.
fn decode_into(
    handle: &mut Decoder,
    mut src: &[u8],
    last: bool,
    fatal: bool,
) -> Result<String, DecodeError> {
    let mut text = String::new();
    loop {
        let bound = if fatal {
            handle.max_utf8_buffer_length_without_replacement(src.len())
        } else {
            handle.max_utf8_buffer_length(src.len())
        };
        text.reserve(bound.ok_or(DecodeError::OutputOverflow {
            input_len: src.len(),
        })?);

        let (output_full, read) = if fatal {
            match handle.decode_to_string_without_replacement(src, &mut text, last) {
                (DecoderResult::InputEmpty, read) => (false, read),
                (DecoderResult::OutputFull, read) => (true, read),
                (DecoderResult::Malformed(..), _) => return Err(DecodeError::InvalidData),
            }
        } else {
            let (result, read, _replaced) = handle.decode_to_string(src, &mut text, last);
            (matches!(result, CoderResult::OutputFull), read)
        };

        if !output_full {
            return Ok(text);
        }
        src = &src[read..];
    }
}
