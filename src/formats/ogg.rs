//! Ogg Vorbis / Ogg Opus - comments carried in the second logical packet.
//!
//! ## Page header (27 bytes, little endian)
//! ```text
//! [0x00] Magic "OggS"
//! [0x04] Version (0)
//! [0x05] Header type (0x01 continued, 0x02 first page, 0x04 last page)
//! [0x06] Granule position (i64, -1 = no packet ends here)
//! [0x0E] Stream serial number (u32)
//! [0x12] Page sequence number (u32)
//! [0x16] CRC32
//! [0x1A] Segment count
//! [0x1B] Lacing values, one byte per segment
//! ```
//! A packet is the concatenation of segments up to the first lacing value
//! below 255 and may span pages. Only pages of the first logical stream
//! are followed. Page checksums are not verified.
//!
//! ## Headers
//! | Codec  | Packet 1                         | Packet 2                  |
//! |--------|----------------------------------|---------------------------|
//! | Vorbis | `\x01vorbis` identification      | `\x03vorbis` + comments   |
//! | Opus   | `OpusHead` (channels, pre-skip)  | `OpusTags` + comments     |
//!
//! The duration comes from the granule position of the last page found in
//! the final 64 KiB of the stream. Opus granules always count 48 kHz
//! samples and include the pre-skip.
//!
//! Field offsets count packet bytes from the packet's first byte; a comment
//! packet spanning pages has page headers in between that are not counted.

use std::io::SeekFrom;

use log::{debug, trace};

use crate::context::Pass;
use crate::formats::vorbis;
use crate::source::ByteSource;
use crate::utils::{
    bitrate, bytesa, bytesv, fill, le_u16, le_u32, le_u64, mul_div, position, read_up_to, skip,
    stream_len,
};
use crate::{Error, Result};

const PAGE_HEADER_SIZE: usize = 27;
const OPUS_RATE: u32 = 48_000;

/// Tail of the stream searched for the last page.
const TAIL_WINDOW: u64 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    Vorbis,
    Opus { pre_skip: u64 },
}

/// Reads packets of one logical stream, page by page.
struct PacketReader {
    serial: Option<u32>,
    lacing: Vec<u8>,
    next: usize,
    limit: usize,
}

impl PacketReader {
    fn new(limit: usize) -> Self {
        Self {
            serial: None,
            lacing: Vec::new(),
            next: 0,
            limit,
        }
    }

    /// Next complete packet and the stream offset of its first byte.
    fn packet(&mut self, src: &mut dyn ByteSource) -> Result<(u64, Vec<u8>)> {
        let mut data = Vec::new();
        let mut start = None;
        loop {
            if self.next == self.lacing.len() {
                self.page(src)?;
                continue;
            }
            let n = self.lacing[self.next] as usize;
            self.next += 1;
            if start.is_none() {
                start = Some(position(src)?);
            }
            if data.len() + n > self.limit {
                return Err(Error::Parse("Ogg packet too large"));
            }
            let at = data.len();
            data.resize(at + n, 0);
            fill(src, &mut data[at..])?;
            if n < 255 {
                return Ok((start.unwrap_or_default(), data));
            }
        }
    }

    /// Load the lacing table of the next page of our stream.
    fn page(&mut self, src: &mut dyn ByteSource) -> Result<()> {
        loop {
            let h = bytesa::<PAGE_HEADER_SIZE>(src)?;
            if &h[..4] != b"OggS" {
                return Err(Error::BadMagic);
            }
            let serial = le_u32(&h, 14)?;
            let lacing = bytesv(src, h[26] as usize)?;

            match self.serial {
                Some(s) if s != serial => {
                    let body: i64 = lacing.iter().map(|&n| n as i64).sum();
                    skip(src, body)?;
                }
                _ => {
                    trace!("page {} of stream {serial:#x}", le_u32(&h, 18)?);
                    self.serial = Some(serial);
                    self.lacing = lacing;
                    self.next = 0;
                    return Ok(());
                }
            }
        }
    }
}

pub(crate) fn parse(pass: &mut Pass<'_>) -> Result<()> {
    let mut reader = PacketReader::new(pass.options().block_size);

    let (_, ident) = reader.packet(pass.src)?;
    let codec = identify(pass, &ident)?;

    let (start, comments) = reader.packet(pass.src)?;
    let skip_len = match codec {
        Codec::Vorbis if comments.starts_with(b"\x03vorbis") => 7,
        Codec::Opus { .. } if comments.starts_with(b"OpusTags") => 8,
        _ => return Err(Error::Parse("missing Ogg comment header")),
    };
    vorbis::read_comments(pass, &comments[skip_len..], start + skip_len as u64)?;

    if pass.options().properties
        && let Err(e) = read_duration(pass, codec, reader.serial)
    {
        debug!("Ogg duration: {e}");
    }
    Ok(())
}

/// Identification header: codec, channels and sample rate.
fn identify(pass: &mut Pass<'_>, p: &[u8]) -> Result<Codec> {
    if p.starts_with(b"\x01vorbis") {
        let channels = *p.get(11).ok_or(Error::UnexpectedEof)?;
        let rate = le_u32(p, 12)?;
        let maximum = le_u32(p, 16)? as i32;
        let nominal = le_u32(p, 20)? as i32;
        let bitrate = if nominal > 0 { nominal } else { maximum.max(0) };

        if pass.options().properties {
            let props = pass.properties();
            props.channels = channels as u32;
            props.sample_rate = rate;
            props.bitrate = bitrate as u32;
        }
        Ok(Codec::Vorbis)
    } else if p.starts_with(b"OpusHead") {
        let channels = *p.get(9).ok_or(Error::UnexpectedEof)?;
        let pre_skip = le_u16(p, 10)? as u64;

        if pass.options().properties {
            let props = pass.properties();
            props.channels = channels as u32;
            props.sample_rate = OPUS_RATE;
        }
        Ok(Codec::Opus { pre_skip })
    } else {
        Err(Error::Parse("unsupported Ogg codec"))
    }
}

fn read_duration(pass: &mut Pass<'_>, codec: Codec, serial: Option<u32>) -> Result<()> {
    let len = stream_len(pass.src)?;
    let from = len.saturating_sub(TAIL_WINDOW);
    pass.src.seek(SeekFrom::Start(from))?;
    let mut tail = vec![0u8; (len - from) as usize];
    let n = read_up_to(pass.src, &mut tail)?;
    tail.truncate(n);

    let Some(granule) = last_granule(&tail, serial) else {
        return Err(Error::Parse("no final Ogg page"));
    };
    let (rate, samples) = match codec {
        Codec::Vorbis => (pass.properties().sample_rate as u64, granule),
        Codec::Opus { pre_skip } => (OPUS_RATE as u64, granule.saturating_sub(pre_skip)),
    };
    if rate == 0 {
        return Err(Error::Parse("zero sample rate"));
    }
    let duration = mul_div(samples, 1000, rate).ok_or(Error::InvalidRange)?;
    let props = pass.properties();
    props.duration_ms = duration;
    if props.bitrate == 0 {
        props.bitrate = bitrate(len, duration).unwrap_or(0);
    }
    Ok(())
}

/// Granule position of the last page of `serial` in `tail`.
fn last_granule(tail: &[u8], serial: Option<u32>) -> Option<u64> {
    let mut i = tail.len().checked_sub(PAGE_HEADER_SIZE)?;
    loop {
        if &tail[i..i + 4] == b"OggS"
            && serial.is_none_or(|s| le_u32(tail, i + 14).ok() == Some(s))
            && let Ok(g) = le_u64(tail, i + 6)
            && g != u64::MAX
        {
            return Some(g);
        }
        i = i.checked_sub(1)?;
    }
}
