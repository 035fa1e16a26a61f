use std::error::Error;
use std::sync::Arc;

/// Opaque reason attached to an abort or a cancel.
///
/// The pipe never inspects it. It is handed to the transformer's teardown
/// hook and to the opposite end of the pipe as the same `Arc`, so callers
/// can recover it with `downcast_ref` or compare it with `Arc::ptr_eq`.
pub type Reason = Arc<dyn Error + Send + Sync + 'static>;

/// Errors surfaced by either end of a pipe.
///
/// ```text
///   PipeError<E>
///   ├── Failed(E)        ← transform or flush hook returned an error
///   ├── Aborted(reason)  ← the producer aborted the writable end
///   ├── Canceled(reason) ← the consumer canceled the readable end
///   └── Closed           ← write/close after a normal close
/// ```
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipeError<E> {
    /// A transformer hook failed. The pipe is terminated.
    #[error("{0}")]
    Failed(E),

    /// The producer aborted the pipe. The reason, if any, is carried unchanged.
    #[error("pipe aborted by producer{}", describe(Option::as_ref(.0)))]
    Aborted(Option<Reason>),

    /// The consumer canceled the pipe. The reason, if any, is carried unchanged.
    #[error("pipe canceled by consumer{}", describe(Option::as_ref(.0)))]
    Canceled(Option<Reason>),

    /// The writable end was already closed.
    #[error("pipe is already closed")]
    Closed,
}

impl<E> PipeError<E> {
    /// The transformer error, when this is [`PipeError::Failed`].
    #[must_use]
    pub fn failure(&self) -> Option<&E> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// The abort or cancel reason, if one was supplied.
    #[must_use]
    pub fn reason(&self) -> Option<&Reason> {
        match self {
            Self::Aborted(r) | Self::Canceled(r) => r.as_ref(),
            _ => None,
        }
    }
}

fn describe(reason: Option<&Reason>) -> String {
    reason
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}
