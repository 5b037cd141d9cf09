/// Convenience result type used across the crate.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Top-level error taxonomy for the banded rendering pipeline.
///
/// Everything here is fatal for the run: the chain has no supervision or
/// partial-failure tolerance, so the source reports the error and every
/// participant is torn down. Malformed pixel data is never an error; the
/// converter clamps it instead.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The external frame source failed to open or decode.
    #[error("frame source error: {0}")]
    FrameSource(String),

    /// A probed cascade message disagrees with the length the banding
    /// arithmetic requires. This is a protocol violation, not a condition to
    /// recover from.
    #[error(
        "cascade length mismatch at participant {participant}: expected {expected} bytes, probed {actual}"
    )]
    LengthMismatch {
        participant: usize,
        expected: usize,
        actual: usize,
    },

    /// A receive-side buffer allocation failed. No retry.
    #[error("failed to allocate a {0}-byte cascade buffer")]
    Allocation(usize),

    /// A neighbor link closed while a message was still expected. Observed by
    /// the rest of the chain when one participant aborts.
    #[error("neighbor link closed before the pipeline finished")]
    Disconnected,

    /// The rendering sink rejected a completed frame.
    #[error("render sink error: {0}")]
    Sink(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Build a [`PipelineError::FrameSource`] value.
    pub fn frame_source(msg: impl Into<String>) -> Self {
        Self::FrameSource(msg.into())
    }

    /// Build a [`PipelineError::Sink`] value.
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }
}
