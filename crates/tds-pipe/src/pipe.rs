use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{Stream, StreamExt};
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::config::PipeConfig;
use crate::error::{PipeError, Reason};
use crate::transformer::{Emitter, TerminationReason, Transformer};

/// Create a shutdown-aware pipe around `transformer`.
///
/// Returns the writable (input) end and the readable (output) end. The two
/// ends may be moved to different tasks; all hook calls are serialized by a
/// single mutex around the transformer.
///
/// ```text
///   PipeWriter ──write──▶ transform ──emit──▶ queue ──next──▶ PipeReader
///              ──close──▶ flush
///              ──abort──▶ teardown ◀──cancel──
/// ```
///
/// Lifecycle:
///
/// ```text
///   Active ──close, flush ok──────────────────────────▶ Closed
///   Active ──abort | cancel | transform/flush error──▶ teardown ─▶ Terminated
/// ```
pub fn pipe<T: Transformer>(transformer: T, config: PipeConfig) -> (PipeWriter<T>, PipeReader<T>) {
    let shared = Arc::new(Shared {
        inner: Mutex::new(Inner {
            transformer,
            queue: VecDeque::new(),
            terminated: None,
        }),
        readable: Notify::new(),
        writable: Notify::new(),
        high_water_mark: config.effective_high_water_mark(),
    });

    (
        PipeWriter {
            shared: Arc::clone(&shared),
        },
        PipeReader {
            shared,
            finished: false,
        },
    )
}

struct Inner<T: Transformer> {
    transformer: T,
    queue: VecDeque<T::Output>,
    terminated: Option<TerminationReason<T::Error>>,
}

struct Shared<T: Transformer> {
    inner: Mutex<Inner<T>>,
    /// Signaled when the reader may be able to make progress.
    readable: Notify,
    /// Signaled when the writer may be able to make progress.
    writable: Notify,
    high_water_mark: usize,
}

impl<T: Transformer> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // Hooks run to completion under the lock, so a poisoned guard still
        // holds a consistent queue and termination state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn terminate(&self, inner: &mut Inner<T>, reason: TerminationReason<T::Error>) {
        debug!(
            reason = reason.label(),
            discarded = inner.queue.len(),
            "pipe torn down"
        );
        inner.queue.clear();
        inner.transformer.teardown(&reason);
        inner.terminated = Some(reason);
        self.readable.notify_one();
        self.writable.notify_one();
    }
}

/// The writable (input) end of a pipe.
pub struct PipeWriter<T: Transformer> {
    shared: Arc<Shared<T>>,
}

impl<T: Transformer> PipeWriter<T> {
    /// Hand one chunk to the transformer.
    ///
    /// Waits while the reader has `high_water_mark` unread chunks queued, so a
    /// chunk is never transformed before earlier output has been taken.
    ///
    /// # Errors
    ///
    /// - [`PipeError::Failed`] if `transform` failed (the pipe is now torn down).
    /// - The terminal error if the pipe already ended: [`PipeError::Closed`]
    ///   after a close, [`PipeError::Canceled`] after the reader canceled, and
    ///   so on.
    pub async fn write(&mut self, chunk: impl Into<T::Input>) -> Result<(), PipeError<T::Error>> {
        let chunk = chunk.into();
        loop {
            let ready = self.shared.writable.notified();
            {
                let mut inner = self.shared.lock();
                if let Some(reason) = &inner.terminated {
                    return Err(reason.writer_error());
                }
                if inner.queue.len() < self.shared.high_water_mark {
                    return self.transform_locked(&mut inner, chunk);
                }
            }
            ready.await;
        }
    }

    fn transform_locked(
        &self,
        inner: &mut Inner<T>,
        chunk: T::Input,
    ) -> Result<(), PipeError<T::Error>> {
        let Inner {
            transformer, queue, ..
        } = &mut *inner;
        let mut out = Emitter::new(queue);
        let result = transformer.transform(chunk, &mut out);
        let emitted = out.emitted();

        match result {
            Ok(()) => {
                trace!(emitted, "chunk transformed");
                if emitted > 0 {
                    self.shared.readable.notify_one();
                }
                Ok(())
            }
            Err(e) => {
                self.shared
                    .terminate(inner, TerminationReason::ProcessingError(e.clone()));
                Err(PipeError::Failed(e))
            }
        }
    }

    /// Signal the normal end of input and run `flush`.
    ///
    /// Waits for room below the high-water mark first, like [`write`](Self::write),
    /// so output already produced has been taken by the reader before `flush`
    /// runs. A failing `flush` therefore never discards earlier output.
    ///
    /// On success the reader drains what is queued and then sees the end of
    /// the stream. On failure the pipe is torn down and `teardown` runs as a
    /// backstop.
    ///
    /// # Errors
    ///
    /// [`PipeError::Failed`] if `flush` failed, or the terminal error if the
    /// pipe already ended.
    pub async fn close(&mut self) -> Result<(), PipeError<T::Error>> {
        loop {
            let ready = self.shared.writable.notified();
            {
                let mut inner = self.shared.lock();
                if let Some(reason) = &inner.terminated {
                    return Err(reason.writer_error());
                }
                if inner.queue.len() < self.shared.high_water_mark {
                    return self.flush_locked(&mut inner);
                }
            }
            ready.await;
        }
    }

    fn flush_locked(&self, inner: &mut Inner<T>) -> Result<(), PipeError<T::Error>> {
        let Inner {
            transformer, queue, ..
        } = &mut *inner;
        let mut out = Emitter::new(queue);
        let result = transformer.flush(&mut out);
        let emitted = out.emitted();

        match result {
            Ok(()) => {
                debug!(emitted, "pipe closed");
                inner.terminated = Some(TerminationReason::Close);
                self.shared.readable.notify_one();
                Ok(())
            }
            Err(e) => {
                self.shared
                    .terminate(inner, TerminationReason::ProcessingError(e.clone()));
                Err(PipeError::Failed(e))
            }
        }
    }

    /// Abort the pipe from the producer side.
    ///
    /// Queued output is discarded, `teardown` runs, and the reader's next
    /// read fails with [`PipeError::Aborted`] carrying `reason`. A no-op if
    /// the pipe already ended.
    pub fn abort(&mut self, reason: Option<Reason>) {
        let mut inner = self.shared.lock();
        if inner.terminated.is_none() {
            self.shared
                .terminate(&mut inner, TerminationReason::ProducerAbort(reason));
        }
    }

    /// Write every item of `source`, then close.
    ///
    /// The first `Err` from the source aborts the pipe with that error as the
    /// reason. If a write fails the source is dropped without being drained.
    ///
    /// # Errors
    ///
    /// The first write or close error, or [`PipeError::Aborted`] carrying the
    /// source error.
    pub async fn pipe_from<S, C, SE>(&mut self, source: S) -> Result<(), PipeError<T::Error>>
    where
        S: Stream<Item = Result<C, SE>>,
        C: Into<T::Input>,
        SE: Error + Send + Sync + 'static,
    {
        let mut source = pin!(source);
        while let Some(item) = source.next().await {
            match item {
                Ok(chunk) => self.write(chunk).await?,
                Err(e) => {
                    let reason: Reason = Arc::new(e);
                    self.abort(Some(Arc::clone(&reason)));
                    return Err(PipeError::Aborted(Some(reason)));
                }
            }
        }
        self.close().await
    }

    /// How the pipe ended, or `None` while it is still active.
    #[must_use]
    pub fn termination(&self) -> Option<TerminationReason<T::Error>> {
        self.shared.lock().terminated.clone()
    }
}

impl<T: Transformer> Drop for PipeWriter<T> {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        if inner.terminated.is_none() {
            debug!("writer dropped before close");
            self.shared
                .terminate(&mut inner, TerminationReason::ProducerAbort(None));
        }
    }
}

impl<T: Transformer> fmt::Debug for PipeWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeWriter").finish_non_exhaustive()
    }
}

/// The readable (output) end of a pipe.
pub struct PipeReader<T: Transformer> {
    shared: Arc<Shared<T>>,
    finished: bool,
}

impl<T: Transformer> PipeReader<T> {
    /// Take the next output chunk.
    ///
    /// Returns `Some(Ok(chunk))` per emitted chunk, `Some(Err(_))` once if the
    /// pipe was aborted or a hook failed, and `None` afterwards or after a
    /// normal close once the queue is drained.
    pub async fn next(&mut self) -> Option<Result<T::Output, PipeError<T::Error>>> {
        if self.finished {
            return None;
        }
        loop {
            let ready = self.shared.readable.notified();
            {
                let mut inner = self.shared.lock();
                if let Some(chunk) = inner.queue.pop_front() {
                    self.shared.writable.notify_one();
                    return Some(Ok(chunk));
                }
                if let Some(reason) = &inner.terminated {
                    self.finished = true;
                    return reason.reader_error().map(Err);
                }
            }
            ready.await;
        }
    }

    /// Cancel the pipe from the consumer side.
    ///
    /// If the pipe is still active, queued output is discarded, `teardown`
    /// runs, and later writes fail with [`PipeError::Canceled`] carrying
    /// `reason`. After a normal close this only discards unread output.
    pub fn cancel(&mut self, reason: Option<Reason>) {
        self.finished = true;
        let mut inner = self.shared.lock();
        if inner.terminated.is_none() {
            self.shared
                .terminate(&mut inner, TerminationReason::ConsumerCancel(reason));
        } else {
            inner.queue.clear();
        }
    }

    /// How the pipe ended, or `None` while it is still active.
    #[must_use]
    pub fn termination(&self) -> Option<TerminationReason<T::Error>> {
        self.shared.lock().terminated.clone()
    }

    /// Adapt this reader into a [`Stream`] of output chunks.
    pub fn into_stream(self) -> impl Stream<Item = Result<T::Output, PipeError<T::Error>>> {
        futures::stream::unfold(self, |mut reader| async move {
            reader.next().await.map(|item| (item, reader))
        })
    }
}

impl<T: Transformer> Drop for PipeReader<T> {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        if inner.terminated.is_none() {
            debug!("reader dropped before end of stream");
            self.shared
                .terminate(&mut inner, TerminationReason::ConsumerCancel(None));
        }
    }
}

impl<T: Transformer> fmt::Debug for PipeReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeReader")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
