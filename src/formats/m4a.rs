//! MP4 / M4A - iTunes-style metadata in the atom tree.
//!
//! ## Atom header
//! ```text
//! [0x00] Size, header included (u32 BE); 1 = 64-bit size follows, 0 = to end of parent
//! [0x04] Type (4 bytes)
//! [0x08] 64-bit size (u64 BE, only when size == 1)
//! ```
//!
//! ## Tree
//! ```text
//! ftyp
//! moov
//! ├── trak/mdia/mdhd              timescale, duration
//! ├── trak/mdia/minf/stbl/stsd    channels, sample rate
//! └── udta/meta/ilst/<item>/data  metadata items
//! mdat                            audio, size gives the bitrate
//! ```
//! `meta` carries 4 bytes of version and flags before its children. An atom
//! that runs past its parent ends the walk of that parent only.

use log::trace;

use crate::context::Pass;
use crate::genres::genre_name;
use crate::tag::{Field, TagKind};
use crate::text::utf8_bounded;
use crate::utils::{be_u16, be_u32, be_u64, bitrate, bytesa, bytesv, mul_div, seek_to, stream_len};
use crate::{Error, Result};

const MAX_DEPTH: usize = 12;

/// `data` atom type codes.
const TYPE_JPEG: u32 = 13;
const TYPE_PNG: u32 = 14;

const CONTAINERS: [&[u8; 4]; 7] = [
    b"moov", b"udta", b"ilst", b"trak", b"mdia", b"minf", b"stbl",
];

#[derive(Debug, Default)]
struct Walk {
    mdat: u64,
}

pub(crate) fn parse(pass: &mut Pass<'_>) -> Result<()> {
    let h = bytesa::<8>(pass.src)?;
    if &h[4..] != b"ftyp" {
        return Err(Error::BadMagic);
    }
    let end = stream_len(pass.src)?;

    let mut walk = Walk::default();
    children(pass, &mut walk, *b"\0\0\0\0", 0, end, 0)?;

    if pass.options().properties {
        let props = pass.properties();
        if walk.mdat > 0
            && let Some(b) = bitrate(walk.mdat, props.duration_ms)
        {
            props.bitrate = b;
        }
    }
    Ok(())
}

/// Atom header at `at`: type, body offset and end offset.
fn atom(pass: &mut Pass<'_>, at: u64, end: u64) -> Result<Option<([u8; 4], u64, u64)>> {
    seek_to(pass.src, at)?;
    let h = bytesa::<8>(pass.src)?;
    let name = [h[4], h[5], h[6], h[7]];
    let (size, header) = match be_u32(&h, 0)? {
        0 => (end - at, 8),
        1 => (be_u64(&bytesa::<8>(pass.src)?, 0)?, 16),
        n => (n as u64, 8),
    };
    if size < header || size > end - at {
        trace!("atom {} runs past its parent", String::from_utf8_lossy(&name));
        return Ok(None);
    }
    Ok(Some((name, at + header, at + size)))
}

/// Walk the atoms in `[at, end)`.
fn children(
    pass: &mut Pass<'_>,
    walk: &mut Walk,
    parent: [u8; 4],
    mut at: u64,
    end: u64,
    depth: usize,
) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::Parse("MP4 atoms nested too deep"));
    }
    while end - at >= 8 {
        let Some((name, body, next)) = atom(pass, at, end)? else {
            break;
        };
        let props = pass.options().properties;

        match &name {
            n if CONTAINERS.contains(&n) => children(pass, walk, name, body, next, depth + 1)?,
            b"meta" if next - body >= 4 => children(pass, walk, name, body + 4, next, depth + 1)?,
            b"mdhd" if props => media_header(pass, next - body)?,
            b"stsd" if props => sample_description(pass, next - body)?,
            b"mdat" if depth == 0 => walk.mdat += next - body,
            _ if &parent == b"ilst" => item(pass, name, body, next)?,
            _ => {}
        }
        at = next;
    }
    Ok(())
}

/// `mdhd`: the first track's timescale and duration.
fn media_header(pass: &mut Pass<'_>, len: u64) -> Result<()> {
    if pass.properties().duration_ms > 0 {
        return Ok(());
    }
    let b = bytesv(pass.src, len.min(32) as usize)?;
    let (timescale, duration) = if b.first() == Some(&1) {
        (be_u32(&b, 20)?, be_u64(&b, 24)?)
    } else {
        (be_u32(&b, 12)?, be_u32(&b, 16)? as u64)
    };
    if let Some(ms) = mul_div(duration, 1000, timescale as u64) {
        pass.properties().duration_ms = ms;
    }
    Ok(())
}

/// `stsd`: channels and sample rate (16.16 fixed point) of the first entry.
fn sample_description(pass: &mut Pass<'_>, len: u64) -> Result<()> {
    let b = bytesv(pass.src, len.min(44) as usize)?;
    let channels = be_u16(&b, 32)? as u32;
    let rate = be_u32(&b, 40)? >> 16;
    let props = pass.properties();
    if props.sample_rate == 0 && channels > 0 && rate > 0 {
        props.channels = channels;
        props.sample_rate = rate;
    }
    Ok(())
}

/// One `ilst` item: `name` (freeform only) and `data` children.
fn item(pass: &mut Pass<'_>, name: [u8; 4], mut at: u64, end: u64) -> Result<()> {
    let mut freeform = None;
    while end - at >= 8 {
        let Some((child, body, next)) = atom(pass, at, end)? else {
            break;
        };
        match &child {
            b"name" if next - body > 4 => {
                let raw = bytesv(pass.src, (next - body) as usize)?;
                freeform = Some(String::from_utf8_lossy(&raw[4..]).into_owned());
            }
            b"data" if next - body >= 8 => {
                let h = bytesa::<8>(pass.src)?;
                let kind = be_u32(&h, 0)? & 0x00FF_FFFF;
                data(pass, &name, freeform.as_deref(), kind, body + 8, next - body - 8)?;
            }
            _ => {}
        }
        at = next;
    }
    Ok(())
}

fn text_kind(name: &[u8; 4]) -> Option<TagKind> {
    let kind = match name {
        b"\xA9alb" => TagKind::Album,
        b"\xA9ART" | b"aART" => TagKind::Artist,
        b"\xA9nam" => TagKind::Title,
        b"\xA9day" => TagKind::Date,
        b"\xA9gen" => TagKind::Genre,
        b"\xA9cmt" => TagKind::Comment,
        _ => return None,
    };
    Some(kind)
}

/// The payload of a `data` atom at `offset`, `len` bytes.
fn data(
    pass: &mut Pass<'_>,
    name: &[u8; 4],
    freeform: Option<&str>,
    kind: u32,
    offset: u64,
    len: u64,
) -> Result<()> {
    match name {
        b"covr" => {
            let mime = match kind {
                TYPE_JPEG => "image/jpeg",
                TYPE_PNG => "image/png",
                _ => return Ok(()),
            };
            pass.accept_field(Field {
                kind: TagKind::Image,
                text: mime,
                offset,
                size: len,
                unsync: false,
            });
        }
        b"trkn" if len >= 6 => {
            let b = bytesa::<6>(pass.src)?;
            let (track, total) = (be_u16(&b, 2)?, be_u16(&b, 4)?);
            if track > 0 {
                let text = if total > 0 {
                    format!("{track}/{total}")
                } else {
                    track.to_string()
                };
                pass.accept(TagKind::Track, &text, offset, len);
            }
        }
        b"gnre" if len >= 2 => {
            let code = be_u16(&bytesa::<2>(pass.src)?, 0)? as usize;
            if let Some(genre) = code.checked_sub(1).and_then(genre_name) {
                pass.accept(TagKind::Genre, genre, offset, len);
            }
        }
        b"trkn" | b"gnre" => {}
        _ => {
            let kind = match name {
                b"----" => freeform.and_then(TagKind::from_replaygain_key),
                _ => text_kind(name),
            };
            let Some(kind) = kind else {
                return Ok(());
            };
            if len > pass.options().block_size as u64 {
                return Ok(());
            }
            let raw = bytesv(pass.src, len as usize)?;
            let mut out = String::new();
            if utf8_bounded(&mut out, &raw, pass.text_len()) > 0 {
                pass.accept(kind, &out, offset, len);
            }
        }
    }
    Ok(())
}
