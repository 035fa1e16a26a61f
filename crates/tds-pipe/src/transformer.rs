use std::collections::VecDeque;

use crate::error::{PipeError, Reason};

/// Why a pipe stopped.
///
/// ```text
///   TerminationReason<E>
///   ├── Close                  ← upstream ended and flush succeeded
///   ├── ConsumerCancel(reason) ← readable end canceled or dropped
///   ├── ProducerAbort(reason)  ← writable end aborted or dropped
///   └── ProcessingError(E)     ← transform or flush returned an error
/// ```
///
/// `Close` is the only normal path. [`Transformer::teardown`] is invoked for
/// every other variant and never sees `Close`.
#[derive(Debug, Clone)]
pub enum TerminationReason<E> {
    Close,
    ConsumerCancel(Option<Reason>),
    ProducerAbort(Option<Reason>),
    ProcessingError(E),
}

impl<E> TerminationReason<E> {
    /// `true` for every path except a successful close.
    #[must_use]
    pub fn is_abnormal(&self) -> bool {
        !matches!(self, Self::Close)
    }

    /// Short lowercase label, used in log fields.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Close => "normal-close",
            Self::ConsumerCancel(_) => "consumer-cancel",
            Self::ProducerAbort(_) => "producer-abort",
            Self::ProcessingError(_) => "processing-error",
        }
    }
}

impl<E: Clone> TerminationReason<E> {
    /// The error a writer sees when it touches a pipe terminated this way.
    pub(crate) fn writer_error(&self) -> PipeError<E> {
        match self {
            Self::Close => PipeError::Closed,
            Self::ConsumerCancel(r) => PipeError::Canceled(r.clone()),
            Self::ProducerAbort(r) => PipeError::Aborted(r.clone()),
            Self::ProcessingError(e) => PipeError::Failed(e.clone()),
        }
    }

    /// The error a reader sees, or `None` when the reader should just end.
    pub(crate) fn reader_error(&self) -> Option<PipeError<E>> {
        match self {
            Self::Close | Self::ConsumerCancel(_) => None,
            Self::ProducerAbort(r) => Some(PipeError::Aborted(r.clone())),
            Self::ProcessingError(e) => Some(PipeError::Failed(e.clone())),
        }
    }
}

/// Output handle passed to [`Transformer::transform`] and [`Transformer::flush`].
///
/// Chunks emitted here are queued for the reader in emission order.
pub struct Emitter<'a, O> {
    queue: &'a mut VecDeque<O>,
    emitted: usize,
}

impl<'a, O> Emitter<'a, O> {
    pub(crate) fn new(queue: &'a mut VecDeque<O>) -> Self {
        Self { queue, emitted: 0 }
    }

    /// Enqueue one output chunk.
    pub fn emit(&mut self, chunk: O) {
        self.queue.push_back(chunk);
        self.emitted += 1;
    }

    /// Number of chunks emitted through this handle so far.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

/// The three hooks a pipe drives.
///
/// The pipe guarantees:
///
/// - hooks never run concurrently with each other;
/// - `transform` sees chunks in write order;
/// - `flush` runs at most once, only after every write succeeded and the
///   writer closed;
/// - `teardown` runs at most once, on every termination path except a
///   successful `flush`, including after `transform` or `flush` itself failed.
///
/// Hooks are synchronous and must not block.
pub trait Transformer: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;
    type Error: Clone + Send + 'static;

    /// Process one input chunk.
    ///
    /// # Errors
    ///
    /// An error terminates the pipe with [`TerminationReason::ProcessingError`].
    fn transform(
        &mut self,
        chunk: Self::Input,
        out: &mut Emitter<'_, Self::Output>,
    ) -> Result<(), Self::Error>;

    /// Emit whatever remains once the input has ended normally.
    ///
    /// # Errors
    ///
    /// An error terminates the pipe with [`TerminationReason::ProcessingError`].
    fn flush(&mut self, out: &mut Emitter<'_, Self::Output>) -> Result<(), Self::Error> {
        let _ = out;
        Ok(())
    }

    /// Release resources after an abnormal termination.
    fn teardown(&mut self, reason: &TerminationReason<Self::Error>) {
        let _ = reason;
    }
}
