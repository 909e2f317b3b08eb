//! Parsers for audio tag formats.
//!
//! Each submodule targets one format family. All parsers follow the same
//! conventions:
//!
//! * **Driven by [`crate::TagContext`]** - a parser receives the byte source
//!   positioned at offset 0 and reports every decoded field through the
//!   context. The dispatcher rewinds the source after each parser.
//! * **Streaming** - headers are read piecewise through
//!   [`crate::ByteSource`]. Picture data is never loaded; its offset and
//!   size are reported instead.
//! * **Bounded** - text values are cut at [`crate::Options::text_len`],
//!   oversized frames and blocks are skipped.
//! * **Errors stay inside** - a parser returns [`crate::Error`] to give up
//!   on its format; fields accepted before the failure still stand.
//!
//! ## Format overview
//!
//! | Module     | Format         | Description |
//! |------------|----------------|-------------|
//! | [`id3v2`]  | ID3v2.2/2.3/2.4| Frame-based tag at the start of an MP3; MPEG stream properties |
//! | [`id3v1`]  | ID3v1/1.1      | Fixed 128-byte trailer at the end of an MP3 |
//! | [`ogg`]    | Ogg Vorbis/Opus| Comment packet of the first logical stream |
//! | [`flac`]   | FLAC           | STREAMINFO, VORBIS_COMMENT and PICTURE metadata blocks |
//! | [`m4a`]    | MP4/M4A        | iTunes `ilst` items in the atom tree |
//! | [`vorbis`] | Vorbis comment | `KEY=value` block shared by Ogg and FLAC |

pub mod flac;
pub mod id3v1;
pub mod id3v2;
pub mod m4a;
pub(crate) mod mpeg;
pub mod ogg;
pub mod vorbis;
