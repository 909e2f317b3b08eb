//! **tagkit** - a reusable Rust library for extracting audio metadata tags.
//!
//! A [`TagContext`] reads a [`ByteSource`] (anything `Read + Seek`, or a
//! pair of callbacks via [`CallbackSource`]) and reports each decoded tag
//! as a [`Field`] to a caller-supplied sink. Audio properties (channels,
//! sample rate, bitrate, duration) are collected along the way.
//!
//! # Supported formats
//! | Module | Format |
//! |--------|--------|
//! | [`formats::id3v2`]  | ID3v2 - frame-based MP3 tag, plus MPEG stream properties |
//! | [`formats::id3v1`]  | ID3v1 - 128-byte MP3 trailer |
//! | [`formats::ogg`]    | Ogg Vorbis / Ogg Opus comments |
//! | [`formats::flac`]   | FLAC metadata blocks |
//! | [`formats::m4a`]    | MP4 / M4A iTunes metadata |

pub mod context;
pub mod error;
pub mod formats;
pub mod genres;
pub mod options;
pub mod source;
pub mod tag;
pub mod text;
pub(crate) mod utils;

pub use context::TagContext;
pub use error::{Error, Result};
pub use options::Options;
pub use source::{ByteSource, CallbackSource, Whence};
pub use tag::{Field, Format, Properties, TagKind};
