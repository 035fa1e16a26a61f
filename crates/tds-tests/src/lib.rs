//! Shared helpers for the tds integration tests and benches.
//!
//! - [`record`] / [`pipe_through`]: drive a decoder from a list of chunks and
//!   record what the consumer observed, event by event.
//! - [`TrackedEngine`] / [`ResourceLedger`]: a real engine wrapped so every
//!   resource allocation and release is counted, for leak assertions.
//! - [`fixtures`]: access to, and generation of, the files in `tests/fixtures/`.

use std::convert::Infallible;
use std::fmt::Display;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use bytes::Bytes;
use futures::stream;
use tds_decoder::{
    DecodeError, DecoderEngine, DecoderOptions, PipeConfig, PipeReader, StreamError,
    StreamingDecoder, TextDecoder,
};
use tds_pipe::Transformer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub mod fixtures;

static INIT: Once = Once::new();

/// Install a test-writer tracing subscriber once per process.
///
/// Uses `RUST_LOG` when set, otherwise `warn`.
pub fn init_test_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer().compact())
            .try_init();
    });
}

// ── Recording consumer ────────────────────────────────────────────────────────

/// What a consumer observed on the readable end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    Chunk(String),
    Close,
    /// The stream failed; carries the error's display text.
    Abort(String),
}

/// Read `reader` to the end, recording every chunk and how it ended.
pub async fn record<T>(mut reader: PipeReader<T>) -> Vec<RecordedEvent>
where
    T: Transformer<Output = String>,
    T::Error: Display,
{
    let mut events = Vec::new();
    loop {
        match reader.next().await {
            Some(Ok(chunk)) => events.push(RecordedEvent::Chunk(chunk)),
            Some(Err(e)) => {
                events.push(RecordedEvent::Abort(e.to_string()));
                return events;
            }
            None => {
                events.push(RecordedEvent::Close);
                return events;
            }
        }
    }
}

/// Outcome of [`pipe_through`].
#[derive(Debug)]
pub struct PipeRun {
    /// Result seen by the producer side.
    pub written: Result<(), StreamError>,
    /// Events seen by the consumer side.
    pub events: Vec<RecordedEvent>,
}

impl PipeRun {
    /// The text chunks, in order.
    #[must_use]
    pub fn chunks(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RecordedEvent::Chunk(c) => Some(c.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All text chunks joined.
    #[must_use]
    pub fn text(&self) -> String {
        self.chunks().concat()
    }

    #[must_use]
    pub fn last_event(&self) -> Option<&RecordedEvent> {
        self.events.last()
    }
}

/// Write `chunks` into the decoder while concurrently recording its output.
pub async fn pipe_through<E: DecoderEngine>(
    decoder: StreamingDecoder<E>,
    chunks: Vec<Bytes>,
) -> PipeRun {
    let (mut writable, readable) = decoder.into_split();
    let source = stream::iter(chunks.into_iter().map(Ok::<_, Infallible>));
    let (written, events) = tokio::join!(writable.pipe_from(source), record(readable));
    PipeRun { written, events }
}

/// UTF-8 encode each string into its own chunk.
#[must_use]
pub fn utf8_chunks(parts: &[&str]) -> Vec<Bytes> {
    parts
        .iter()
        .map(|p| Bytes::copy_from_slice(p.as_bytes()))
        .collect()
}

/// Split `bytes` at the given (sorted, in-range) offsets.
#[must_use]
pub fn split_at_offsets(bytes: &[u8], offsets: &[usize]) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(offsets.len() + 1);
    let mut start = 0;
    for &offset in offsets {
        chunks.push(Bytes::copy_from_slice(&bytes[start..offset]));
        start = offset;
    }
    chunks.push(Bytes::copy_from_slice(&bytes[start..]));
    chunks
}

/// Split `bytes` into chunks of at most `size` bytes.
#[must_use]
pub fn fixed_chunks(bytes: &[u8], size: usize) -> Vec<Bytes> {
    bytes
        .chunks(size.max(1))
        .map(Bytes::copy_from_slice)
        .collect()
}

// ── Leak tracking ─────────────────────────────────────────────────────────────

/// Counts engine resource allocations and releases.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    opened: AtomicUsize,
    released: AtomicUsize,
}

impl ResourceLedger {
    #[must_use]
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Handles opened and not yet released.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.opened() - self.released()
    }

    /// Panic unless exactly one handle was opened and released.
    pub fn assert_released_once(&self) {
        assert_eq!(
            (self.opened(), self.released()),
            (1, 1),
            "decoder resource leaked or released twice"
        );
    }
}

/// A [`TextDecoder`] that reports every resource transition to a ledger.
pub struct TrackedEngine {
    inner: TextDecoder,
    ledger: Arc<ResourceLedger>,
}

impl TrackedEngine {
    /// # Panics
    ///
    /// Panics if `label` is not a supported encoding.
    #[must_use]
    pub fn new(label: &str, options: DecoderOptions) -> (Self, Arc<ResourceLedger>) {
        let inner = TextDecoder::new(label, options).expect("supported label");
        let ledger = Arc::new(ResourceLedger::default());
        if inner.holds_resource() {
            ledger.opened.fetch_add(1, Ordering::SeqCst);
        }
        (
            Self {
                inner,
                ledger: Arc::clone(&ledger),
            },
            ledger,
        )
    }

    fn track<R>(&mut self, call: impl FnOnce(&mut TextDecoder) -> R) -> R {
        let before = self.inner.holds_resource();
        let result = call(&mut self.inner);
        match (before, self.inner.holds_resource()) {
            (false, true) => {
                self.ledger.opened.fetch_add(1, Ordering::SeqCst);
            }
            (true, false) => {
                self.ledger.released.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        result
    }
}

impl DecoderEngine for TrackedEngine {
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
        self.track(|d| d.decode_streaming(bytes))
    }

    fn decode_final(&mut self) -> Result<String, DecodeError> {
        self.track(|d| d.decode_final())
    }

    fn holds_resource(&self) -> bool {
        self.inner.holds_resource()
    }
}

/// A streaming decoder over a [`TrackedEngine`], plus its ledger.
#[must_use]
pub fn tracked_decoder(
    label: &str,
    options: DecoderOptions,
) -> (StreamingDecoder<TrackedEngine>, Arc<ResourceLedger>) {
    let (engine, ledger) = TrackedEngine::new(label, options);
    (StreamingDecoder::from_engine(engine, PipeConfig::default()), ledger)
}
