//! ID3v1 - fixed 128-byte trailer at the end of an MP3 stream.
//!
//! ## Layout
//! ```text
//! [0x00] Magic "TAG"                      (3 bytes)
//! [0x03] Title    (ISO-8859-1, NUL-padded, 30 bytes)
//! [0x21] Artist   (30 bytes)
//! [0x3F] Album    (30 bytes)
//! [0x5D] Year     (4 ASCII digits)
//! [0x61] Comment  (30 bytes)
//!         ID3v1.1: byte 0x7D = 0 and byte 0x7E != 0 -> 0x7E is the track
//! [0x7F] Genre code (index into the ID3 genre table)
//! ```
//!
//! Fields are NUL-padded. Space padding shows up in the wild too, but it is
//! not stripped: the bytes are reported as written.
//!
//! The trailer runs after ID3v2 in dispatch order, so every field here is
//! first-writer-wins: a kind already found is never reported again.

use std::io::SeekFrom;
use std::ops::Range;

use crate::context::Pass;
use crate::genres::genre_name;
use crate::tag::TagKind;
use crate::text::latin1_to_utf8;
use crate::utils::bytesa;
use crate::{Error, Result};

/// Size of the trailer.
pub const TRAILER_SIZE: usize = 128;

const TEXT_FIELDS: [(TagKind, Range<usize>); 4] = [
    (TagKind::Title, 3..33),
    (TagKind::Artist, 33..63),
    (TagKind::Album, 63..93),
    (TagKind::Date, 93..97),
];

const TRACK_MARKER: usize = 125;
const TRACK: usize = 126;
const GENRE: usize = 127;

pub(crate) fn parse(pass: &mut Pass<'_>) -> Result<()> {
    let base = pass.src.seek(SeekFrom::End(-(TRAILER_SIZE as i64)))?;
    let b = bytesa::<TRAILER_SIZE>(pass.src)?;
    if &b[..3] != b"TAG" {
        return Err(Error::BadMagic);
    }

    let limit = pass.text_len();
    let mut out = String::new();
    for (kind, range) in TEXT_FIELDS {
        if pass.is_found(kind) || latin1_to_utf8(&mut out, &b[range.clone()], limit) == 0 {
            continue;
        }
        pass.accept(kind, &out, base + range.start as u64, range.len() as u64);
    }

    if b[TRACK_MARKER] == 0 && b[TRACK] != 0 {
        let track = b[TRACK].to_string();
        pass.accept_once(TagKind::Track, &track, base + TRACK as u64, 1);
    }

    if let Some(name) = genre_name(b[GENRE] as usize) {
        pass.accept_once(TagKind::Genre, name, base + GENRE as u64, 1);
    }

    Ok(())
}
