//! Length-prefixed, serializer-tagged message framing.
//!
//! Every message is framed with:
//! - A 4-byte little-endian total length (serializer id + payload)
//! - A 4-byte little-endian serializer id
//!
//! [`ReadAccumulator`] reassembles frames from arbitrarily split reads;
//! [`WriteAccumulator`] stages one outgoing frame at a time.

pub mod accumulator;
pub mod codec;
pub mod error;

pub use accumulator::ReadAccumulator;
pub use codec::{
    encode_frame, Frame, FrameHeader, WriteAccumulator, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE,
    LENGTH_PREFIX_SIZE, SERIALIZER_ID_SIZE,
};
pub use error::{FrameError, Result};
