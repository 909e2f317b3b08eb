//! Low-level I/O primitives shared by all parsers.
//!
//! Reader functions read exactly the bytes they promise or return
//! [`Error::UnexpectedEof`]; a short read is never silently accepted. Slice
//! accessors return [`Error::InvalidRange`] instead of panicking when the
//! slice is too short.

use std::io::SeekFrom;

use crate::source::ByteSource;
use crate::{Error, Result};

/// Read until `buf` is full or the source is exhausted.
///
/// Returns the number of bytes actually read.
pub(crate) fn read_up_to<S: ByteSource + ?Sized>(s: &mut S, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match s.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Fill `buf` completely.
#[inline]
pub(crate) fn fill<S: ByteSource + ?Sized>(s: &mut S, buf: &mut [u8]) -> Result<()> {
    if read_up_to(s, buf)? != buf.len() {
        return Err(Error::UnexpectedEof);
    }
    Ok(())
}

/// Read exactly `N` bytes into a fixed-size array.
#[inline]
pub(crate) fn bytesa<const N: usize>(s: &mut (impl ByteSource + ?Sized)) -> Result<[u8; N]> {
    let mut b = [0u8; N];
    fill(s, &mut b)?;
    Ok(b)
}

/// Read exactly `len` bytes into a `Vec`.
#[inline]
pub(crate) fn bytesv<S: ByteSource + ?Sized>(s: &mut S, len: usize) -> Result<Vec<u8>> {
    let mut b = vec![0u8; len];
    fill(s, &mut b)?;
    Ok(b)
}

/// Verify that the next `N` bytes in the stream match `expected`.
///
/// Returns [`Error::BadMagic`] on mismatch.
#[inline]
pub(crate) fn magic<S: ByteSource + ?Sized, const N: usize>(
    s: &mut S,
    expected: &[u8; N],
) -> Result<()> {
    let got = bytesa::<N>(s)?;
    if &got != expected {
        return Err(Error::BadMagic);
    }
    Ok(())
}

/// Current absolute position.
#[inline]
pub(crate) fn position<S: ByteSource + ?Sized>(s: &mut S) -> Result<u64> {
    Ok(s.seek(SeekFrom::Current(0))?)
}

/// Move forward (or backward) relative to the current position.
#[inline]
pub(crate) fn skip<S: ByteSource + ?Sized>(s: &mut S, n: i64) -> Result<u64> {
    Ok(s.seek(SeekFrom::Current(n))?)
}

/// Seek to an absolute position.
#[inline]
pub(crate) fn seek_to<S: ByteSource + ?Sized>(s: &mut S, pos: u64) -> Result<u64> {
    Ok(s.seek(SeekFrom::Start(pos))?)
}

/// Total stream length. The current position is preserved.
pub(crate) fn stream_len<S: ByteSource + ?Sized>(s: &mut S) -> Result<u64> {
    let here = position(s)?;
    let len = s.seek(SeekFrom::End(0))?;
    seek_to(s, here)?;
    Ok(len)
}

/// Big-endian `u16` at `at`.
#[inline]
pub(crate) fn be_u16(b: &[u8], at: usize) -> Result<u16> {
    Ok(u16::from_be_bytes(array(b, at)?))
}

/// Big-endian 24-bit value at `at`.
#[inline]
pub(crate) fn be_u24(b: &[u8], at: usize) -> Result<u32> {
    let [x, y, z] = array::<3>(b, at)?;
    Ok(u32::from_be_bytes([0, x, y, z]))
}

/// Big-endian `u32` at `at`.
#[inline]
pub(crate) fn be_u32(b: &[u8], at: usize) -> Result<u32> {
    Ok(u32::from_be_bytes(array(b, at)?))
}

/// Big-endian `u64` at `at`.
#[inline]
pub(crate) fn be_u64(b: &[u8], at: usize) -> Result<u64> {
    Ok(u64::from_be_bytes(array(b, at)?))
}

/// Little-endian `u16` at `at`.
#[inline]
pub(crate) fn le_u16(b: &[u8], at: usize) -> Result<u16> {
    Ok(u16::from_le_bytes(array(b, at)?))
}

/// Little-endian `u32` at `at`.
#[inline]
pub(crate) fn le_u32(b: &[u8], at: usize) -> Result<u32> {
    Ok(u32::from_le_bytes(array(b, at)?))
}

/// Little-endian `u64` at `at`.
#[inline]
pub(crate) fn le_u64(b: &[u8], at: usize) -> Result<u64> {
    Ok(u64::from_le_bytes(array(b, at)?))
}

/// `value * mul / div` computed wide; `None` for a zero divisor or a result
/// past `u64`.
#[inline]
pub(crate) fn mul_div(value: u64, mul: u64, div: u64) -> Option<u64> {
    if div == 0 {
        return None;
    }
    u64::try_from(value as u128 * mul as u128 / div as u128).ok()
}

/// Bits per second for `bytes` played over `ms` milliseconds.
#[inline]
pub(crate) fn bitrate(bytes: u64, ms: u64) -> Option<u32> {
    mul_div(bytes, 8000, ms).and_then(|b| u32::try_from(b).ok())
}

/// 28-bit "synchsafe" integer: four bytes, seven significant bits each.
#[inline]
pub(crate) fn synchsafe(b: [u8; 4]) -> u32 {
    (b[0] as u32 & 0x7F) << 21
        | (b[1] as u32 & 0x7F) << 14
        | (b[2] as u32 & 0x7F) << 7
        | (b[3] as u32 & 0x7F)
}

/// Copy `N` bytes starting at `at` out of `b`.
#[inline]
pub(crate) fn array<const N: usize>(b: &[u8], at: usize) -> Result<[u8; N]> {
    b.get(at..at.checked_add(N).ok_or(Error::InvalidRange)?)
        .and_then(|s| s.try_into().ok())
        .ok_or(Error::InvalidRange)
}
