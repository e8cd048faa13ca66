//! Little-endian field helpers for hand-written serializers.
//!
//! Payloads written with these helpers follow a field-record layout:
//!
//! ```text
//! [u16 field count]
//! [u16 field id][i32 field size][field value]   (repeated)
//! ```
//!
//! A reader that meets a field id it does not know skips `size` bytes, so
//! peers can add fields without breaking older readers.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{RegistryError, Result};

fn ensure(input: &Bytes, needed: usize) -> Result<()> {
    if input.remaining() < needed {
        return Err(RegistryError::Truncated {
            needed,
            remaining: input.remaining(),
        });
    }
    Ok(())
}

pub fn get_u8(input: &mut Bytes) -> Result<u8> {
    ensure(input, 1)?;
    Ok(input.get_u8())
}

pub fn get_bool(input: &mut Bytes) -> Result<bool> {
    Ok(get_u8(input)? != 0)
}

pub fn get_u16(input: &mut Bytes) -> Result<u16> {
    ensure(input, 2)?;
    Ok(input.get_u16_le())
}

pub fn get_i32(input: &mut Bytes) -> Result<i32> {
    ensure(input, 4)?;
    Ok(input.get_i32_le())
}

pub fn get_i64(input: &mut Bytes) -> Result<i64> {
    ensure(input, 8)?;
    Ok(input.get_i64_le())
}

/// Read a non-negative `i32` length.
pub fn get_len(input: &mut Bytes) -> Result<usize> {
    let len = get_i32(input)?;
    usize::try_from(len).map_err(|_| RegistryError::InvalidLength(len.into()))
}

/// Read `len` bytes as UTF-8.
pub fn get_string(input: &mut Bytes, len: usize) -> Result<String> {
    ensure(input, len)?;
    let bytes = input.split_to(len);
    Ok(String::from_utf8(bytes.to_vec())?)
}

/// Read an `i32`-length-prefixed UTF-8 string.
pub fn get_prefixed_string(input: &mut Bytes) -> Result<String> {
    let len = get_len(input)?;
    get_string(input, len)
}

/// Read a field header: `(field id, field size)`.
pub fn get_field_header(input: &mut Bytes) -> Result<(u16, usize)> {
    let id = get_u16(input)?;
    let size = get_len(input)?;
    Ok((id, size))
}

/// Skip `len` bytes (an unknown field).
pub fn skip(input: &mut Bytes, len: usize) -> Result<()> {
    ensure(input, len)?;
    input.advance(len);
    Ok(())
}

/// Append an `i32`-length-prefixed UTF-8 string.
pub fn put_prefixed_string(out: &mut BytesMut, value: &str) -> Result<()> {
    let len = i32::try_from(value.len())
        .map_err(|_| RegistryError::InvalidLength(value.len() as i64))?;
    out.put_i32_le(len);
    out.put_slice(value.as_bytes());
    Ok(())
}

/// Append a field header.
pub fn put_field_header(out: &mut BytesMut, id: u16, size: usize) -> Result<()> {
    let size = i32::try_from(size).map_err(|_| RegistryError::InvalidLength(size as i64))?;
    out.put_u16_le(id);
    out.put_i32_le(size);
    Ok(())
}

/// Append a string field (`id`, byte length, UTF-8 bytes).
pub fn put_string_field(out: &mut BytesMut, id: u16, value: &str) -> Result<()> {
    put_field_header(out, id, value.len())?;
    out.put_slice(value.as_bytes());
    Ok(())
}

/// Append an `i64` field.
pub fn put_i64_field(out: &mut BytesMut, id: u16, value: i64) -> Result<()> {
    put_field_header(out, id, 8)?;
    out.put_i64_le(value);
    Ok(())
}

/// Append a `u8` field.
pub fn put_u8_field(out: &mut BytesMut, id: u16, value: u8) -> Result<()> {
    put_field_header(out, id, 1)?;
    out.put_u8(value);
    Ok(())
}
