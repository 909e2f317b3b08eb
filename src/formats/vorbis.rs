//! Vorbis comment block - shared by Ogg Vorbis, Ogg Opus and FLAC.
//!
//! ## Layout (little endian)
//! ```text
//! [0x00] Vendor length (u32)
//! [0x04] Vendor string (UTF-8)
//! [....] Comment count (u32)
//! [....] Comments, each: length (u32), "KEY=value" (UTF-8)
//! ```
//! Keys are matched case-insensitively. A comment whose length runs past
//! the block, or which has no `=`, ends the block; earlier fields stand.

use log::{debug, trace};

use crate::context::Pass;
use crate::tag::TagKind;
use crate::text::utf8_bounded;
use crate::utils::le_u32;
use crate::{Error, Result};

fn comment_kind(key: &[u8]) -> Option<TagKind> {
    let key = std::str::from_utf8(key).ok()?.to_ascii_uppercase();
    let kind = match key.as_str() {
        "ALBUM" => TagKind::Album,
        "TITLE" => TagKind::Title,
        "ARTIST" | "PERFORMER" => TagKind::Artist,
        "TRACKNUMBER" => TagKind::Track,
        "DATE" => TagKind::Date,
        "GENRE" => TagKind::Genre,
        "COMMENT" | "DESCRIPTION" => TagKind::Comment,
        other => return TagKind::from_replaygain_key(other),
    };
    Some(kind)
}

/// Decode a comment block held in memory. `base` is the stream offset of
/// `block[0]`, used for the reported field offsets.
pub(crate) fn read_comments(pass: &mut Pass<'_>, block: &[u8], base: u64) -> Result<()> {
    let vendor_len = le_u32(block, 0)? as usize;
    let vendor = block.get(4..4 + vendor_len).ok_or(Error::InvalidRange)?;
    let mut at = 4 + vendor_len;
    let count = le_u32(block, at)?;
    at += 4;
    trace!("vendor {:?}, {count} comment(s)", String::from_utf8_lossy(vendor));

    let limit = pass.text_len();
    let mut out = String::new();
    for _ in 0..count {
        let Ok(len) = le_u32(block, at) else {
            debug!("comment count runs past the block");
            break;
        };
        let start = at + 4;
        let Some(entry) = block.get(start..start.saturating_add(len as usize)) else {
            debug!("comment of {len} bytes runs past the block");
            break;
        };
        at = start + entry.len();

        let Some(eq) = entry.iter().position(|&b| b == b'=') else {
            debug!("comment without '='");
            break;
        };
        let Some(kind) = comment_kind(&entry[..eq]) else {
            continue;
        };
        let value = &entry[eq + 1..];
        if utf8_bounded(&mut out, value, limit) > 0 {
            let offset = base + (start + eq + 1) as u64;
            pass.accept(kind, &out, offset, value.len() as u64);
        }
    }

    Ok(())
}
