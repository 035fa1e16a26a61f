#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod pipe;
pub mod transformer;

pub use config::PipeConfig;
pub use error::{PipeError, Reason};
pub use pipe::{PipeReader, PipeWriter, pipe};
pub use transformer::{Emitter, TerminationReason, Transformer};
