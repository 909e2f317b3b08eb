//! Library-wide error and result types.

use std::io;

use thiserror::Error;

/// Result alias used throughout tagkit.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// Only [`Error::NotFound`] ever leaves [`crate::TagContext::extract`]; the
/// other variants describe why a single format parser gave up and are
/// absorbed by the dispatcher.
#[derive(Debug, Error)]
pub enum Error {
    /// A magic/signature field did not match the expected value.
    #[error("bad magic value")]
    BadMagic,
    /// The stream ended before all expected bytes could be read.
    #[error("unexpected end of stream")]
    UnexpectedEof,
    /// An offset or size field would read outside the valid region.
    #[error("invalid offset or size")]
    InvalidRange,
    /// A structural constraint was violated (message describes which one).
    #[error("parse error: {0}")]
    Parse(&'static str),
    /// The byte source reported a failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// No parser produced a single field.
    #[error("no tag found")]
    NotFound,
}
