/// Errors that can occur during frame encoding/decoding.
///
/// Every variant is a protocol-invariant violation: the stream can no longer
/// be trusted and must be dropped.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The length prefix cannot describe a frame (it must cover the serializer id).
    #[error("invalid frame length {0} (must be at least 4)")]
    InvalidLength(i32),

    /// The declared frame exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// More bytes arrived than the current frame declared.
    #[error("payload overrun: frame declared {declared} bytes but {received} arrived")]
    PayloadOverrun { declared: usize, received: usize },

    /// The stream ended in the middle of a frame.
    #[error("truncated frame: expected {expected} bytes, stream ended after {received}")]
    Truncated { expected: usize, received: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
