#![warn(clippy::pedantic)]

pub mod engine;
pub mod error;
pub mod options;
pub mod streaming;

pub use engine::{DecoderEngine, TextDecoder};
pub use error::DecodeError;
pub use options::{DEFAULT_LABEL, DecoderOptions};
pub use streaming::{DecodeTransform, StreamError, StreamingDecoder};
pub use tds_pipe::{PipeConfig, PipeError, PipeReader, PipeWriter, Reason, TerminationReason};
