use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Size of the total-length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the serializer id that follows the length prefix.
pub const SERIALIZER_ID_SIZE: usize = 4;

/// Frame header: length (4) + serializer id (4) = 8 bytes.
pub const HEADER_SIZE: usize = LENGTH_PREFIX_SIZE + SERIALIZER_ID_SIZE;

/// Default maximum frame size (serializer id + payload): 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// The two fixed-width integers in front of every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Bytes after the length prefix: serializer id + payload.
    pub total_length: i32,
    /// Registered id of the serializer that produced the payload.
    pub serializer_id: i32,
}

impl FrameHeader {
    /// Header for a payload of `payload_len` bytes.
    pub fn for_payload(serializer_id: i32, payload_len: usize) -> Result<Self> {
        let total = payload_len
            .checked_add(SERIALIZER_ID_SIZE)
            .filter(|total| *total <= i32::MAX as usize)
            .ok_or(FrameError::PayloadTooLarge {
                size: payload_len.saturating_add(SERIALIZER_ID_SIZE),
                max: i32::MAX as usize,
            })?;

        Ok(Self {
            total_length: total as i32,
            serializer_id,
        })
    }

    /// Number of payload bytes described by this header.
    pub fn payload_len(&self) -> usize {
        (self.total_length as usize).saturating_sub(SERIALIZER_ID_SIZE)
    }

    /// Append the header in wire order.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.put_i32_le(self.total_length);
        dst.put_i32_le(self.serializer_id);
    }
}

/// A fully reassembled frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The serializer id this payload is tagged with.
    pub serializer_id: i32,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(serializer_id: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            serializer_id,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────────┬──────────────────────┐
/// │ Length       │ Serializer id │ Payload              │
/// │ (4B LE)      │ (4B LE)       │ (Length - 4 bytes)   │
/// └──────────────┴───────────────┴──────────────────────┘
/// ```
pub fn encode_frame(serializer_id: i32, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let header = FrameHeader::for_payload(serializer_id, payload.len())?;
    dst.reserve(HEADER_SIZE + payload.len());
    header.write_to(dst);
    dst.put_slice(payload);
    Ok(())
}

/// Staging buffers for one outgoing frame.
///
/// A serializer writes the payload into [`payload_mut`](Self::payload_mut);
/// [`finish`](Self::finish) then lays out header and payload in wire order.
/// Both buffers keep their capacity across [`reset`](Self::reset).
#[derive(Debug)]
pub struct WriteAccumulator {
    payload: BytesMut,
    frame: BytesMut,
    max_frame_size: usize,
}

impl WriteAccumulator {
    /// Create a write accumulator with the default maximum frame size.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a write accumulator with an explicit maximum frame size.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            payload: BytesMut::with_capacity(8 * 1024),
            frame: BytesMut::with_capacity(8 * 1024),
            max_frame_size,
        }
    }

    /// Buffer the serializer writes the payload into.
    pub fn payload_mut(&mut self) -> &mut BytesMut {
        &mut self.payload
    }

    /// Build the wire frame for the staged payload.
    pub fn finish(&mut self, serializer_id: i32) -> Result<&[u8]> {
        let size = self.payload.len() + SERIALIZER_ID_SIZE;
        if size > self.max_frame_size {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: self.max_frame_size,
            });
        }

        self.frame.clear();
        encode_frame(serializer_id, &self.payload, &mut self.frame)?;
        Ok(&self.frame)
    }

    /// Clear both buffers for the next frame.
    pub fn reset(&mut self) {
        self.payload.clear();
        self.frame.clear();
    }

    /// True if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty() && self.frame.is_empty()
    }
}

impl Default for WriteAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
