use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::codec::{Frame, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE, SERIALIZER_ID_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Reassembles a single frame from arbitrarily split reads.
///
/// Bytes are fed in as they arrive. The length prefix may itself be split
/// across reads; once it is complete the accumulator tracks how many bytes
/// the current frame still needs and only interprets the body (serializer id
/// at offset 0, payload from offset 4) when the whole frame is buffered.
///
/// At most one frame is in flight: a chunk that carries bytes beyond the end
/// of the current frame is a [`FrameError::PayloadOverrun`].
#[derive(Debug)]
pub struct ReadAccumulator {
    prefix: [u8; LENGTH_PREFIX_SIZE],
    prefix_len: usize,
    /// Declared body length, known once the prefix is complete.
    declared: Option<usize>,
    body: BytesMut,
    max_frame_size: usize,
}

impl ReadAccumulator {
    /// Create an accumulator with the default maximum frame size.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create an accumulator with an explicit maximum frame size.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            prefix: [0; LENGTH_PREFIX_SIZE],
            prefix_len: 0,
            declared: None,
            body: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_frame_size,
        }
    }

    /// Feed one read's worth of bytes.
    ///
    /// Returns `Ok(Some(frame))` once the chunk completes a frame, after which
    /// the accumulator is reset for the next one. Returns `Ok(None)` if more
    /// bytes are needed.
    pub fn feed(&mut self, mut chunk: &[u8]) -> Result<Option<Frame>> {
        if self.declared.is_none() {
            let take = (LENGTH_PREFIX_SIZE - self.prefix_len).min(chunk.len());
            self.prefix[self.prefix_len..self.prefix_len + take].copy_from_slice(&chunk[..take]);
            self.prefix_len += take;
            chunk = &chunk[take..];

            if self.prefix_len < LENGTH_PREFIX_SIZE {
                return Ok(None);
            }

            let declared = self.parse_prefix()?;
            self.declared = Some(declared);
            self.body.reserve(declared);
        }

        let declared = self.declared.unwrap_or_default();
        let received = self.body.len() + chunk.len();
        if received > declared {
            return Err(FrameError::PayloadOverrun { declared, received });
        }
        self.body.extend_from_slice(chunk);

        if self.body.len() < declared {
            trace!(
                buffered = self.body.len(),
                remaining = self.remaining(),
                "awaiting rest of frame"
            );
            return Ok(None);
        }

        let mut id = [0u8; SERIALIZER_ID_SIZE];
        id.copy_from_slice(&self.body[..SERIALIZER_ID_SIZE]);
        let serializer_id = i32::from_le_bytes(id);
        let payload = Bytes::copy_from_slice(&self.body[SERIALIZER_ID_SIZE..]);
        self.reset();

        Ok(Some(Frame {
            serializer_id,
            payload,
        }))
    }

    /// Bytes still needed to complete the current frame.
    ///
    /// Before the prefix is complete this counts only the missing prefix bytes.
    pub fn remaining(&self) -> usize {
        match self.declared {
            Some(declared) => declared - self.body.len(),
            None => LENGTH_PREFIX_SIZE - self.prefix_len,
        }
    }

    /// True if no bytes of a frame are buffered.
    pub fn is_idle(&self) -> bool {
        self.prefix_len == 0
    }

    /// Signal end of stream.
    ///
    /// Clean if it falls on a frame boundary; otherwise the frame was
    /// truncated.
    pub fn finish(&self) -> Result<()> {
        if self.is_idle() {
            return Ok(());
        }

        let (expected, received) = match self.declared {
            Some(declared) => (
                LENGTH_PREFIX_SIZE + declared,
                LENGTH_PREFIX_SIZE + self.body.len(),
            ),
            None => (LENGTH_PREFIX_SIZE, self.prefix_len),
        };
        Err(FrameError::Truncated { expected, received })
    }

    /// Drop any partial frame, keeping the allocated capacity.
    pub fn reset(&mut self) {
        self.prefix_len = 0;
        self.declared = None;
        self.body.clear();
    }

    fn parse_prefix(&self) -> Result<usize> {
        let length = i32::from_le_bytes(self.prefix);
        if length < SERIALIZER_ID_SIZE as i32 {
            return Err(FrameError::InvalidLength(length));
        }

        let length = length as usize;
        if length > self.max_frame_size {
            return Err(FrameError::PayloadTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }
        Ok(length)
    }
}

impl Default for ReadAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
