use std::fmt;

use bytes::Bytes;
use tds_pipe::{
    Emitter, PipeConfig, PipeError, PipeReader, PipeWriter, TerminationReason, Transformer, pipe,
};
use tracing::{debug, trace};

use crate::engine::{DecoderEngine, TextDecoder};
use crate::error::DecodeError;
use crate::options::DecoderOptions;

/// Error type seen on either end of a [`StreamingDecoder`].
pub type StreamError = PipeError<DecodeError>;

/// The pipe hooks that drive a [`DecoderEngine`].
///
/// ```text
///   transform(chunk) → engine.decode_streaming(chunk) → emit if non-empty
///   flush()          → engine.decode_final()          → emit if non-empty
///   teardown(reason) → engine.decode_final()          → output discarded
/// ```
///
/// Empty text is never emitted, from either decode path.
pub struct DecodeTransform<E> {
    engine: E,
}

impl<E: DecoderEngine> Transformer for DecodeTransform<E> {
    type Input = Bytes;
    type Output = String;
    type Error = DecodeError;

    fn transform(
        &mut self,
        chunk: Bytes,
        out: &mut Emitter<'_, String>,
    ) -> Result<(), DecodeError> {
        let text = self.engine.decode_streaming(&chunk)?;
        trace!(bytes = chunk.len(), text_len = text.len(), "decoded chunk");
        if !text.is_empty() {
            out.emit(text);
        }
        Ok(())
    }

    fn flush(&mut self, out: &mut Emitter<'_, String>) -> Result<(), DecodeError> {
        let text = self.engine.decode_final()?;
        if !text.is_empty() {
            out.emit(text);
        }
        Ok(())
    }

    fn teardown(&mut self, reason: &TerminationReason<DecodeError>) {
        // Only the release side effect matters here. A residual decode error
        // is already reported through the pipe when it comes from flush.
        let held = self.engine.holds_resource();
        if let Err(e) = self.engine.decode_final() {
            debug!(reason = reason.label(), error = %e, "residual decode failed during teardown");
        }
        debug!(
            reason = reason.label(),
            encoding = self.engine.encoding(),
            released = held,
            "decoder teardown"
        );
    }
}

/// Streaming byte-to-text decoder with a guaranteed engine release.
///
/// Binary chunks written to [`writable`](Self::writable) come out of
/// [`readable`](Self::readable) as decoded text. Multi-byte sequences split
/// across chunk boundaries are carried inside the engine and completed by
/// the next chunk.
///
/// The engine is released exactly once whichever way the stream ends:
///
/// ```text
///   Active ──writer closes──▶ flush ──────────────▶ Finalized
///   Active ──reader cancels / writer aborts──────▶ teardown ─▶ Finalized
///   Active ──decode error (fatal)────────────────▶ teardown ─▶ Finalized
/// ```
///
/// Both ends may be driven from different tasks after
/// [`into_split`](Self::into_split).
///
/// # Example
///
/// ```rust,no_run
/// use tds_decoder::{DecoderOptions, StreamingDecoder};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let decoder = StreamingDecoder::new("utf-8", DecoderOptions::default())?;
/// let (mut input, mut output) = decoder.into_split();
///
/// let producer = async move {
///     input.write(&b"caf\xC3"[..]).await?;
///     input.write(&b"\xA9"[..]).await?;
///     input.close().await
/// };
/// let consumer = async move {
///     let mut text = String::new();
///     while let Some(chunk) = output.next().await {
///         text.push_str(&chunk?);
///     }
///     Ok::<_, tds_decoder::StreamError>(text)
/// };
/// let (written, text) = tokio::join!(producer, consumer);
/// written?;
/// assert_eq!(text?, "café");
/// # Ok(())
/// # }
/// ```
pub struct StreamingDecoder<E: DecoderEngine = TextDecoder> {
    encoding: String,
    fatal: bool,
    ignore_bom: bool,
    writable: PipeWriter<DecodeTransform<E>>,
    readable: PipeReader<DecodeTransform<E>>,
}

impl StreamingDecoder {
    /// Create a decoder for `label` with the default pipe configuration.
    ///
    /// # Errors
    ///
    /// [`DecodeError::UnsupportedEncoding`] if the label is unknown.
    pub fn new(label: &str, options: DecoderOptions) -> Result<Self, DecodeError> {
        Self::with_config(label, options, PipeConfig::default())
    }

    /// Create a decoder for `label` with an explicit pipe configuration.
    ///
    /// # Errors
    ///
    /// [`DecodeError::UnsupportedEncoding`] if the label is unknown.
    pub fn with_config(
        label: &str,
        options: DecoderOptions,
        config: PipeConfig,
    ) -> Result<Self, DecodeError> {
        let engine = TextDecoder::new(label, options)?;
        Ok(Self::from_engine(engine, config))
    }
}

impl<E: DecoderEngine> StreamingDecoder<E> {
    /// Wrap an already-created engine.
    pub fn from_engine(engine: E, config: PipeConfig) -> Self {
        let encoding = engine.encoding().to_string();
        let fatal = engine.fatal();
        let ignore_bom = engine.ignore_bom();
        debug!(%encoding, fatal, ignore_bom, "streaming decoder created");

        let (writable, readable) = pipe(DecodeTransform { engine }, config);
        Self {
            encoding,
            fatal,
            ignore_bom,
            writable,
            readable,
        }
    }

    /// Canonical name of the encoding, e.g. `"utf-8"` or `"utf-16le"`.
    #[must_use]
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    #[must_use]
    pub fn fatal(&self) -> bool {
        self.fatal
    }

    #[must_use]
    pub fn ignore_bom(&self) -> bool {
        self.ignore_bom
    }

    /// The input end: accepts binary chunks.
    pub fn writable(&mut self) -> &mut PipeWriter<DecodeTransform<E>> {
        &mut self.writable
    }

    /// The output end: yields decoded text chunks.
    pub fn readable(&mut self) -> &mut PipeReader<DecodeTransform<E>> {
        &mut self.readable
    }

    /// Split into owned input and output ends.
    #[must_use]
    pub fn into_split(self) -> (PipeWriter<DecodeTransform<E>>, PipeReader<DecodeTransform<E>>) {
        (self.writable, self.readable)
    }
}

impl<E: DecoderEngine> fmt::Debug for StreamingDecoder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingDecoder")
            .field("encoding", &self.encoding)
            .field("fatal", &self.fatal)
            .field("ignore_bom", &self.ignore_bom)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    use futures::StreamExt;

    /// Delegates to a real `TextDecoder` and records which engine calls ran.
    struct Probe {
        inner: TextDecoder,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Probe {
        fn new(options: DecoderOptions) -> (Self, Arc<Mutex<Vec<&'static str>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let probe = Self {
                inner: TextDecoder::new("utf-8", options).unwrap(),
                calls: Arc::clone(&calls),
            };
            (probe, calls)
        }
    }

    impl DecoderEngine for Probe {
        fn encoding(&self) -> &str {
            self.inner.encoding()
        }
        fn fatal(&self) -> bool {
            self.inner.fatal()
        }
        fn ignore_bom(&self) -> bool {
            self.inner.ignore_bom()
        }
        fn decode_streaming(&mut self, bytes: &[u8]) -> Result<String, DecodeError> {
            self.calls.lock().unwrap().push("streaming");
            self.inner.decode_streaming(bytes)
        }
        fn decode_final(&mut self) -> Result<String, DecodeError> {
            self.calls.lock().unwrap().push("final");
            self.inner.decode_final()
        }
        fn holds_resource(&self) -> bool {
            self.inner.holds_resource()
        }
    }

    async fn run<E: DecoderEngine>(
        decoder: StreamingDecoder<E>,
        chunks: &[&[u8]],
    ) -> (Result<(), StreamError>, Vec<Result<String, StreamError>>) {
        let (mut input, output) = decoder.into_split();
        let source = futures::stream::iter(
            chunks
                .iter()
                .map(|c| Ok::<_, Infallible>(Bytes::copy_from_slice(c))),
        );
        tokio::join!(input.pipe_from(source), output.into_stream().collect::<Vec<_>>())
    }

    #[test]
    fn default_options_are_reflected() {
        let d = StreamingDecoder::new(crate::DEFAULT_LABEL, DecoderOptions::default()).unwrap();
        assert_eq!(d.encoding(), "utf-8");
        assert!(!d.fatal());
        assert!(!d.ignore_bom());
        assert_eq!(
            format!("{d:?}"),
            "StreamingDecoder { encoding: \"utf-8\", fatal: false, ignore_bom: false, .. }"
        );
    }

    #[test]
    fn label_is_normalized() {
        let d = StreamingDecoder::new("utf-16", DecoderOptions::default()).unwrap();
        assert_eq!(d.encoding(), "utf-16le");
    }

    #[test]
    fn unknown_label_fails_construction() {
        let err = StreamingDecoder::new("nope", DecoderOptions::default()).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedEncoding { label } if label == "nope"));
    }

    #[tokio::test]
    async fn chunks_come_out_in_order_without_empties() {
        let d = StreamingDecoder::new("utf-8", DecoderOptions::default()).unwrap();
        let (written, read) = run(d, &[b"fo", b"o", b"", b"bar"]).await;
        written.unwrap();
        let read: Vec<String> = read.into_iter().map(Result::unwrap).collect();
        assert_eq!(read, ["fo", "o", "bar"]);
    }

    #[tokio::test]
    async fn split_sequence_is_completed_by_next_chunk() {
        let d = StreamingDecoder::new("utf-8", DecoderOptions::default()).unwrap();
        // "€" is E2 82 AC.
        let (written, read) = run(d, &[b"1\xE2", b"\x82", b"\xAC2"]).await;
        written.unwrap();
        let read: Vec<String> = read.into_iter().map(Result::unwrap).collect();
        assert_eq!(read, ["1", "\u{20AC}2"]);
    }

    #[tokio::test]
    async fn normal_close_releases_through_flush_only() {
        let (probe, calls) = Probe::new(DecoderOptions::default());
        let d = StreamingDecoder::from_engine(probe, PipeConfig::default());
        let (written, _) = run(d, &[b"a", b"b"]).await;
        written.unwrap();
        assert_eq!(*calls.lock().unwrap(), ["streaming", "streaming", "final"]);
    }

    #[tokio::test]
    async fn cancel_before_any_chunk_releases() {
        let (probe, calls) = Probe::new(DecoderOptions::default());
        let mut d = StreamingDecoder::from_engine(probe, PipeConfig::default());
        d.readable().cancel(None);
        assert!(matches!(
            d.writable().write(&b"x"[..]).await,
            Err(PipeError::Canceled(None))
        ));
        assert_eq!(*calls.lock().unwrap(), ["final"]);
    }

    #[tokio::test]
    async fn abort_releases() {
        let (probe, calls) = Probe::new(DecoderOptions::default());
        let mut d = StreamingDecoder::from_engine(probe, PipeConfig::default());
        d.writable().write(&b"\xE2\x82"[..]).await.unwrap();
        d.writable().abort(None);
        assert!(matches!(d.readable().next().await, Some(Err(PipeError::Aborted(None)))));
        assert_eq!(*calls.lock().unwrap(), ["streaming", "final"]);
    }

    #[tokio::test]
    async fn fatal_transform_error_reaches_reader_and_releases() {
        let (probe, calls) = Probe::new(DecoderOptions::default().with_fatal(true));
        let d = StreamingDecoder::from_engine(probe, PipeConfig::default());
        let (written, read) = run(d, &[b"ok", b"\xFF", b"never"]).await;

        assert!(matches!(written, Err(PipeError::Failed(DecodeError::InvalidData))));
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].as_ref().unwrap(), "ok");
        let err = read[1].as_ref().unwrap_err();
        assert_eq!(err.to_string(), "The encoded data is not valid.");
        assert_eq!(*calls.lock().unwrap(), ["streaming", "streaming", "final"]);
    }

    #[tokio::test]
    async fn fatal_flush_error_is_backstopped_by_teardown() {
        let (probe, calls) = Probe::new(DecoderOptions::default().with_fatal(true));
        let d = StreamingDecoder::from_engine(probe, PipeConfig::default());
        let (written, read) = run(d, &[b"\xF0\x9F"]).await;

        assert!(matches!(written, Err(PipeError::Failed(DecodeError::InvalidData))));
        assert!(matches!(read.as_slice(), [Err(PipeError::Failed(DecodeError::InvalidData))]));
        // The second final call hits an already-released engine and is a no-op.
        assert_eq!(*calls.lock().unwrap(), ["streaming", "final", "final"]);
    }
}
