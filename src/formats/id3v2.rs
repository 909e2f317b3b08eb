//! ID3v2 (2.2, 2.3, 2.4) - frame-based tag at the start of an MP3 stream.
//!
//! ## Header (10 bytes)
//! ```text
//! [0x00] Magic "ID3"                      (3 bytes)
//! [0x03] Major version (2, 3 or 4)        (1 byte, < 0xFF)
//! [0x04] Revision                         (1 byte, < 0xFF)
//! [0x05] Flags                            (1 byte)
//!         0x80 unsynchronization
//!         0x40 extended header (2.3/2.4) / compression (2.2)
//!         0x10 footer present (2.4)
//! [0x06] Tag size, excluding header/footer (synchsafe u32)
//! ```
//!
//! ## Frame header
//! ```text
//! 2.2:  [0x00] Id (3 bytes)  [0x03] Size (u24 BE)
//! 2.3:  [0x00] Id (4 bytes)  [0x04] Size (u32 BE)        [0x08] Flags (u16)
//! 2.4:  [0x00] Id (4 bytes)  [0x04] Size (synchsafe u32) [0x08] Flags (u16)
//! ```
//! An all-zero frame header starts the padding area and ends the walk. A
//! frame claiming more bytes than the tag has left ends it too.
//!
//! ## Text encodings
//! | Byte | Encoding                          |
//! |------|-----------------------------------|
//! | 0    | ISO-8859-1                        |
//! | 1    | UTF-16 with byte-order mark       |
//! | 2    | UTF-16BE without byte-order mark  |
//! | 3    | UTF-8                             |
//!
//! After the tag, up to 2048 bytes are scanned for another appended tag or
//! for the first MPEG frame, which provides the stream properties.

use log::{debug, trace};

use crate::context::Pass;
use crate::formats::mpeg;
use crate::genres::{genre_code, genre_name};
use crate::tag::{Field, TagKind};
use crate::text::{latin1_to_utf8, utf8_bounded, utf16_to_utf8};
use crate::utils::{
    be_u16, be_u24, be_u32, bytesa, bytesv, fill, position, read_up_to, seek_to, skip, synchsafe,
};
use crate::{Error, Result};

const HEADER_SIZE: u64 = 10;
const FOOTER_SIZE: u64 = 10;

/// Bytes scanned after a tag for a further tag or the first audio frame.
const SCAN_WINDOW: usize = 2048;

/// Upper bound on consecutive tags followed in one stream.
const MAX_TAGS: usize = 8;

/// Bytes of an `APIC`/`PIC` frame read to locate the picture data.
const PICTURE_HEAD: u64 = 512;

const FLAG_UNSYNC: u8 = 0x80;
const FLAG_EXTENDED: u8 = 0x40;
const FLAG_FOOTER: u8 = 0x10;

/// Whether `d` is a plausible ID3v2 header.
pub(crate) fn is_id3(d: &[u8]) -> bool {
    d.len() >= 10
        && &d[..3] == b"ID3"
        && d[3] < 0xFF
        && d[4] < 0xFF
        && d[6..10].iter().all(|&b| b < 0x80)
}

/// Total size of the tag starting with header `d`, header and footer
/// included.
pub(crate) fn tag_size(d: &[u8; 10]) -> u64 {
    let footer = if d[3] == 4 && d[5] & FLAG_FOOTER != 0 {
        FOOTER_SIZE
    } else {
        0
    };
    HEADER_SIZE + synchsafe([d[6], d[7], d[8], d[9]]) as u64 + footer
}

/// Undo ID3v2 unsynchronization in place: every `FF 00` becomes `FF`.
pub fn unsync_decode(data: &mut Vec<u8>) {
    let mut w = 0;
    let mut after_ff = false;
    for r in 0..data.len() {
        let b = data[r];
        if after_ff && b == 0 {
            after_ff = false;
            continue;
        }
        data[w] = b;
        w += 1;
        after_ff = b == 0xFF;
    }
    data.truncate(w);
}

pub(crate) fn parse(pass: &mut Pass<'_>) -> Result<()> {
    let mut d = bytesa::<10>(pass.src)?;
    if !is_id3(&d) {
        // No tag, but the stream information may still be there.
        if !mpeg::is_sync(&d) {
            return Err(Error::BadMagic);
        }
        if pass.options().properties {
            seek_to(pass.src, 0)?;
            mpeg::read_properties(pass, 0)?;
        }
        return Ok(());
    }

    let mut start = 0u64;
    for _ in 0..MAX_TAGS {
        let end = start + tag_size(&d);
        match read_tag(pass, &d) {
            Ok(()) => {}
            Err(e) if start > 0 => {
                debug!("appended tag at {start:#x}: {e}");
                break;
            }
            Err(e) => return Err(e),
        }

        match scan_after(pass, end)? {
            Next::Tag(at, header) => {
                trace!("another ID3v2 tag at {at:#x}");
                seek_to(pass.src, at + HEADER_SIZE)?;
                start = at;
                d = header;
            }
            Next::Audio(at) => {
                if pass.options().properties {
                    seek_to(pass.src, at)?;
                    if let Err(e) = mpeg::read_properties(pass, at) {
                        debug!("MPEG properties at {at:#x}: {e}");
                    }
                }
                break;
            }
            Next::Nothing => break,
        }
    }

    Ok(())
}

enum Next {
    Tag(u64, [u8; 10]),
    Audio(u64),
    Nothing,
}

fn scan_after(pass: &mut Pass<'_>, end: u64) -> Result<Next> {
    seek_to(pass.src, end)?;
    let mut buf = vec![0u8; SCAN_WINDOW];
    let n = read_up_to(pass.src, &mut buf)?;
    buf.truncate(n);

    for i in 0..n {
        let rest = &buf[i..];
        if is_id3(rest) {
            let mut header = [0u8; 10];
            header.copy_from_slice(&rest[..10]);
            return Ok(Next::Tag(end + i as u64, header));
        }
        if mpeg::is_sync(rest)
            && be_u32(rest, 0)
                .ok()
                .and_then(mpeg::FrameHeader::parse)
                .is_some()
        {
            return Ok(Next::Audio(end + i as u64));
        }
    }
    Ok(Next::Nothing)
}

/// Walk the frames of one tag. The source is positioned right after the
/// 10-byte header `d`.
fn read_tag(pass: &mut Pass<'_>, d: &[u8; 10]) -> Result<()> {
    let ver = d[3];
    let flags = d[5];
    let unsync = flags & FLAG_UNSYNC != 0;
    let mut remaining = synchsafe([d[6], d[7], d[8], d[9]]) as u64;

    match ver {
        2 if flags & FLAG_EXTENDED != 0 => return Err(Error::Parse("compressed ID3v2.2 tag")),
        2..=4 => {}
        _ => return Err(Error::Parse("unsupported ID3v2 version")),
    }

    if ver > 2 && flags & FLAG_EXTENDED != 0 {
        let b = bytesa::<4>(pass.src)?;
        // 2.3 excludes the size field itself, 2.4 includes it.
        let consumed = if ver == 3 {
            be_u32(&b, 0)? as u64 + 4
        } else {
            synchsafe(b) as u64
        };
        if consumed < 4 || consumed > remaining {
            return Err(Error::InvalidRange);
        }
        skip(pass.src, consumed as i64 - 4)?;
        remaining -= consumed;
    }

    let header_len = if ver == 2 { 6 } else { 10 };
    let id_len = if ver == 2 { 3 } else { 4 };
    while remaining > header_len as u64 {
        let mut fh = [0u8; 10];
        fill(pass.src, &mut fh[..header_len])?;
        remaining -= header_len as u64;

        let id = &fh[..id_len];
        if !id.iter().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
            // Padding, or garbage past the last frame.
            break;
        }

        let (mut size, fflags) = match ver {
            2 => (be_u24(&fh, 3)? as u64, 0u16),
            3 => (be_u32(&fh, 4)? as u64, be_u16(&fh, 8)?),
            _ => (synchsafe([fh[4], fh[5], fh[6], fh[7]]) as u64, be_u16(&fh, 8)?),
        };
        if size > remaining {
            trace!("frame {} overruns the tag", String::from_utf8_lossy(id));
            break;
        }
        remaining -= size;
        let mut at = position(pass.src)?;
        let next = at + size;

        let frame_unsync = match ver {
            // compression, encryption
            3 if fflags & 0x00C0 != 0 => {
                seek_to(pass.src, next)?;
                continue;
            }
            4 if fflags & 0x000C != 0 => {
                seek_to(pass.src, next)?;
                continue;
            }
            4 => {
                if fflags & 0x0001 != 0 {
                    // data length indicator
                    if size < 4 {
                        seek_to(pass.src, next)?;
                        continue;
                    }
                    skip(pass.src, 4)?;
                    at += 4;
                    size -= 4;
                }
                fflags & 0x0002 != 0
            }
            _ => false,
        };

        let frame = Frame {
            id,
            offset: at,
            size,
            unsync: unsync || frame_unsync,
            v22: ver == 2,
        };
        read_frame(pass, &frame)?;
        seek_to(pass.src, next)?;
    }

    Ok(())
}

struct Frame<'a> {
    id: &'a [u8],
    /// Absolute offset of the payload.
    offset: u64,
    size: u64,
    unsync: bool,
    v22: bool,
}

fn read_frame(pass: &mut Pass<'_>, frame: &Frame<'_>) -> Result<()> {
    match frame.id {
        b"APIC" | b"PIC" => return picture(pass, frame),
        id if id[0] == b'T' || matches!(id, b"COMM" | b"COM" | b"RVA2") => {}
        _ => return Ok(()),
    }

    if frame.size > pass.options().frame_size as u64 {
        trace!("skipping {}-byte frame", frame.size);
        return Ok(());
    }
    let mut data = bytesv(pass.src, frame.size as usize)?;
    if frame.unsync {
        unsync_decode(&mut data);
    }

    match frame.id {
        b"COMM" | b"COM" => comment(pass, frame, &data),
        b"RVA2" => {
            rva2(pass, frame, &data);
            Ok(())
        }
        _ => text(pass, frame, &data),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Latin1,
    Utf16,
    Utf16Be,
    Utf8,
}

impl Encoding {
    /// Any encoding byte outside 0..=3 aborts the tag.
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Self::Latin1),
            1 => Ok(Self::Utf16),
            2 => Ok(Self::Utf16Be),
            3 => Ok(Self::Utf8),
            _ => Err(Error::Parse("unknown ID3v2 text encoding")),
        }
    }

    fn decode(self, out: &mut String, src: &[u8], limit: usize) -> usize {
        match self {
            Self::Latin1 => latin1_to_utf8(out, src, limit),
            Self::Utf16 | Self::Utf16Be => utf16_to_utf8(out, src, limit),
            Self::Utf8 => utf8_bounded(out, src, limit),
        }
    }

    /// Split `src` after its first terminator (one NUL byte, or an aligned
    /// pair for UTF-16).
    fn split_terminated(self, src: &[u8]) -> Option<(&[u8], &[u8])> {
        match self {
            Self::Latin1 | Self::Utf8 => {
                let i = src.iter().position(|&b| b == 0)?;
                Some((&src[..i], &src[i + 1..]))
            }
            Self::Utf16 | Self::Utf16Be => {
                let i = src
                    .chunks_exact(2)
                    .position(|p| p == [0, 0])
                    .map(|i| i * 2)?;
                Some((&src[..i], &src[i + 2..]))
            }
        }
    }
}

fn text(pass: &mut Pass<'_>, frame: &Frame<'_>, data: &[u8]) -> Result<()> {
    let Some((&enc, body)) = data.split_first() else {
        return Ok(());
    };
    let enc = Encoding::from_byte(enc)?;

    let kind = match frame.id {
        b"TALB" | b"TAL" => TagKind::Album,
        b"TPE1" | b"TPE2" | b"TP1" | b"TP2" => TagKind::Artist,
        b"TIT2" | b"TT2" => TagKind::Title,
        b"TYER" | b"TYE" | b"TDRC" => TagKind::Date,
        b"TRCK" | b"TRK" => TagKind::Track,
        b"TCON" | b"TCO" => TagKind::Genre,
        b"TXXX" | b"TXX" => {
            user_text(pass, frame, enc, body);
            return Ok(());
        }
        _ => return Ok(()),
    };

    let mut out = String::new();
    if enc.decode(&mut out, body, pass.text_len()) == 0 {
        return Ok(());
    }
    if kind == TagKind::Genre {
        genre(pass, &out, frame);
    } else {
        pass.accept(kind, &out, frame.offset, frame.size);
    }
    Ok(())
}

/// `TXXX`: description, then value. Only ReplayGain descriptions are mapped.
fn user_text(pass: &mut Pass<'_>, frame: &Frame<'_>, enc: Encoding, body: &[u8]) {
    let Some((desc, value)) = enc.split_terminated(body) else {
        return;
    };
    let limit = pass.text_len();
    let mut key = String::new();
    enc.decode(&mut key, desc, limit);
    let Some(kind) = TagKind::from_replaygain_key(&key) else {
        return;
    };
    let mut out = String::new();
    if enc.decode(&mut out, value, limit) > 0 {
        pass.accept(kind, &out, frame.offset, frame.size);
    }
}

/// `TCON`: `(17)`, `(17)Rock`, `Rock`, or a bare number in 2.4.
fn genre(pass: &mut Pass<'_>, value: &str, frame: &Frame<'_>) {
    let mut rest = value;
    let mut last: Option<&str> = None;
    while let Some(r) = rest.strip_prefix('(') {
        if r.starts_with('(') {
            // "((" escapes a literal parenthesis
            rest = r;
            break;
        }
        let Some(end) = r.find(')') else {
            break;
        };
        let name = match &r[..end] {
            "RX" => Some("Remix"),
            "CR" => Some("Cover"),
            code => code.parse().ok().and_then(genre_name),
        };
        if let Some(name) = name {
            pass.accept(TagKind::Genre, name, frame.offset, frame.size);
            last = Some(name);
        }
        rest = &r[end + 1..];
    }

    if rest.is_empty() {
        return;
    }
    // bare codes resolve, known names take the table spelling
    let name = rest
        .parse()
        .ok()
        .or_else(|| genre_code(rest).map(usize::from))
        .and_then(genre_name)
        .unwrap_or(rest);
    if last.is_none_or(|l| !l.eq_ignore_ascii_case(name)) {
        pass.accept(TagKind::Genre, name, frame.offset, frame.size);
    }
}

/// `COMM`: encoding, language (3), short description, text.
fn comment(pass: &mut Pass<'_>, frame: &Frame<'_>, data: &[u8]) -> Result<()> {
    let Some(&enc) = data.first() else {
        return Ok(());
    };
    let enc = Encoding::from_byte(enc)?;
    let Some((desc, body)) = data.get(4..).and_then(|d| enc.split_terminated(d)) else {
        return Ok(());
    };
    let limit = pass.text_len();
    let mut out = String::new();
    enc.decode(&mut out, desc, limit);
    // iTunes stores normalization and gapless data as comments.
    if out.starts_with("iTun") {
        return Ok(());
    }
    if enc.decode(&mut out, body, limit) > 0 {
        pass.accept(TagKind::Comment, &out, frame.offset, frame.size);
    }
    Ok(())
}

/// `APIC` (2.3/2.4) or `PIC` (2.2). Only the head of the frame is read; the
/// picture itself is reported by offset and size.
fn picture(pass: &mut Pass<'_>, frame: &Frame<'_>) -> Result<()> {
    let head = bytesv(pass.src, frame.size.min(PICTURE_HEAD) as usize)?;
    let Some(&enc) = head.first() else {
        return Ok(());
    };
    let enc = Encoding::from_byte(enc)?;

    let (mime, rest) = if frame.v22 {
        let Some(fmt) = head.get(1..4) else {
            return Ok(());
        };
        let mime = match fmt {
            b"JPG" => "image/jpeg".to_owned(),
            b"PNG" => "image/png".to_owned(),
            other => format!("image/{}", String::from_utf8_lossy(other).to_ascii_lowercase()),
        };
        (mime, head.get(5..))
    } else {
        let Some((m, r)) = head.get(1..).and_then(|h| Encoding::Latin1.split_terminated(h)) else {
            return Ok(());
        };
        let mut mime = String::new();
        latin1_to_utf8(&mut mime, m, pass.text_len());
        (mime, r.get(1..))
    };

    // skip the description
    let Some((_, data)) = rest.and_then(|r| enc.split_terminated(r)) else {
        return Ok(());
    };
    let consumed = (head.len() - data.len()) as u64;
    pass.accept_field(Field {
        kind: TagKind::Image,
        text: &mime,
        offset: frame.offset + consumed,
        size: frame.size - consumed,
        unsync: frame.unsync,
    });
    Ok(())
}

/// `RVA2`: identification, then per-channel adjustments. Only the master
/// volume channel of a `track` or `album` frame is reported.
fn rva2(pass: &mut Pass<'_>, frame: &Frame<'_>, data: &[u8]) {
    let Some((ident, mut b)) = Encoding::Latin1.split_terminated(data) else {
        return;
    };
    let (gain_kind, peak_kind) = match ident {
        i if i.eq_ignore_ascii_case(b"track") => (TagKind::TrackGain, TagKind::TrackPeak),
        i if i.eq_ignore_ascii_case(b"album") => (TagKind::AlbumGain, TagKind::AlbumPeak),
        _ => return,
    };

    while b.len() >= 4 {
        let channel = b[0];
        let adjust = i16::from_be_bytes([b[1], b[2]]) as f64 / 512.0;
        let bits = b[3] as usize;
        let Some(raw) = b.get(4..4 + bits.div_ceil(8)) else {
            return;
        };

        if channel == 1 {
            let peak = if bits == 0 || bits > 32 {
                0.0
            } else {
                let v = raw.iter().fold(0u64, |acc, &x| acc << 8 | x as u64);
                v as f64 / (1u64 << (bits - 1)) as f64
            };
            pass.accept(gain_kind, &format!("{adjust:+.5} dB"), frame.offset, frame.size);
            pass.accept(peak_kind, &format!("{peak:.5}"), frame.offset, frame.size);
            return;
        }
        b = &b[4 + raw.len()..];
    }
}
