//! Big-endian integer helpers.
//!
//! Every numeric field in a DNS message is an unsigned big-endian integer of 1, 2 or 4 bytes.

use crate::Error;

#[derive(Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(transparent)]
pub(crate) struct U16(u16);

impl U16 {
    pub(crate) fn get(self) -> u16 {
        u16::from_be(self.0)
    }
}

impl From<u16> for U16 {
    fn from(value: u16) -> Self {
        Self(value.to_be())
    }
}

#[derive(Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(transparent)]
pub(crate) struct U32(u32);

impl U32 {
    pub(crate) fn get(self) -> u32 {
        u32::from_be(self.0)
    }
}

impl From<u32> for U32 {
    fn from(value: u32) -> Self {
        Self(value.to_be())
    }
}

/// Appends the lowest `width` bytes of `n` to `buf`, most significant byte first.
///
/// Bits of `n` that don't fit in `width` bytes are silently dropped.
///
/// # Panics
///
/// Panics if `width` is not in `1..=4`.
pub fn put_number(buf: &mut Vec<u8>, n: u32, width: usize) {
    assert!((1..=4).contains(&width), "invalid integer width {}", width);
    buf.extend((0..width).rev().map(|i| (n >> (8 * i)) as u8));
}

/// Encodes `n` as a `width`-byte big-endian integer.
///
/// See [`put_number`] for details.
pub fn number_to_bytes(n: u32, width: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(width);
    put_number(&mut buf, n, width);
    buf
}

/// Reads consecutive `width`-byte big-endian integers from `bytes`.
///
/// Returns [`Error::InvalidValue`] if `width` is not in `1..=4`, or if the length of `bytes` is not
/// a multiple of `width`.
pub fn bytes_to_numbers(bytes: &[u8], width: usize) -> Result<Vec<u32>, Error> {
    if !(1..=4).contains(&width) || bytes.len() % width != 0 {
        return Err(Error::InvalidValue);
    }

    Ok(bytes
        .chunks_exact(width)
        .map(|chunk| chunk.iter().fold(0, |acc, &b| (acc << 8) | u32::from(b)))
        .collect())
}
