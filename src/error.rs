//! Typed errors for the core's synchronous, caller-facing entry points.
//!
//! Everything inside the worker loops (reader/processor/renderer) follows the
//! log-and-continue discipline instead and never surfaces one of these.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("fft length {n} is not a positive multiple of packet size {packet_size}")]
    InvalidFftLength { n: usize, packet_size: usize },

    #[error("operation requires reader, processor and renderer to be stopped")]
    WorkersRunning,

    #[error("pipeline is already connected")]
    AlreadyConnected,

    #[error("image encode failed: {0}")]
    ImageEncode(String),
}
