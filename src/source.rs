//! The byte source every parser reads through.
//!
//! Parsers never open files. They read and seek through a [`ByteSource`]
//! borrowed for the duration of one [`crate::TagContext::extract`] call. Any
//! [`Read`] + [`Seek`] type is a byte source, so a [`std::fs::File`] or a
//! [`std::io::Cursor`] can be passed directly.
//!
//! Callers that only have the raw integer contract (a read that returns a
//! negative count on error, a seek that returns a negative position on
//! failure) can wrap it in a [`CallbackSource`].

use std::io::{self, Read, Seek, SeekFrom};

/// Readable, seekable capability backing one extraction pass.
///
/// `read` may return fewer bytes than requested only at end of stream and
/// returns `Ok(0)` once the stream is exhausted. `seek` returns the new
/// absolute position.
pub trait ByteSource {
    /// Copy up to `buf.len()` bytes into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Reposition the cursor.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
}

impl<T: Read + Seek + ?Sized> ByteSource for T {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Seek::seek(self, pos)
    }
}

/// Origin of a raw seek request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Whence {
    Start = 0,
    Current = 1,
    End = 2,
}

/// Adapter over a pair of raw read/seek callbacks.
///
/// * `read(buf) -> isize`: bytes copied, `0` at end of stream, negative on
///   error.
/// * `seek(offset, whence) -> i64`: new absolute position, negative on
///   failure (e.g. seeking before the start).
pub struct CallbackSource<R, S> {
    read: R,
    seek: S,
}

impl<R, S> CallbackSource<R, S>
where
    R: FnMut(&mut [u8]) -> isize,
    S: FnMut(i64, Whence) -> i64,
{
    pub fn new(read: R, seek: S) -> Self {
        Self { read, seek }
    }
}

impl<R, S> Read for CallbackSource<R, S>
where
    R: FnMut(&mut [u8]) -> isize,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = (self.read)(buf);
        if n < 0 {
            return Err(io::Error::other("read callback failed"));
        }
        Ok((n as usize).min(buf.len()))
    }
}

impl<R, S> Seek for CallbackSource<R, S>
where
    S: FnMut(i64, Whence) -> i64,
{
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            SeekFrom::Start(o) => (
                i64::try_from(o).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?,
                Whence::Start,
            ),
            SeekFrom::Current(o) => (o, Whence::Current),
            SeekFrom::End(o) => (o, Whence::End),
        };
        let p = (self.seek)(offset, whence);
        if p < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek callback failed",
            ));
        }
        Ok(p as u64)
    }
}
