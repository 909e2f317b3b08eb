//! MPEG audio frame headers - stream properties for MP3 files.
//!
//! ## Frame header (32 bits, big endian)
//! ```text
//! AAAAAAAA AAABBCCD EEEEFFGH IIJJKLMM
//! A  frame sync (all ones)      B  version (00 = 2.5, 10 = 2, 11 = 1)
//! C  layer (01 = III, 10 = II, 11 = I)
//! E  bitrate index              F  sample rate index
//! G  padding                    I  channel mode (11 = mono)
//! ```
//!
//! ## Duration
//! A Xing/Info header (frame and byte counts) sits right after the side
//! information of the first frame; a VBRI header sits at a fixed offset of
//! 36 bytes. Without either, the duration is estimated from the stream length
//! and the first frame's bitrate.

use crate::context::Pass;
use crate::utils::{be_u32, mul_div, read_up_to, stream_len};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
    V1,
    V2,
    V25,
}

/// Bitrates in kbit/s, by table then index (0 = free, 15 = bad).
const BITRATES: [[u16; 16]; 5] = [
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0], // V1 L1
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0],    // V1 L2
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0],     // V1 L3
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0],    // V2 L1
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],         // V2 L2/L3
];

const SAMPLE_RATES: [u32; 3] = [44100, 48000, 32000];

/// Decoded first-frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    version: Version,
    layer: u8,
    /// bits/s
    pub(crate) bitrate: u32,
    pub(crate) sample_rate: u32,
    pub(crate) channels: u32,
    padding: bool,
}

impl FrameHeader {
    /// Decode a header word; [`None`] for anything reserved or free-format.
    pub(crate) fn parse(h: u32) -> Option<Self> {
        if h >> 21 != 0x7FF {
            return None;
        }
        let version = match h >> 19 & 3 {
            0 => Version::V25,
            2 => Version::V2,
            3 => Version::V1,
            _ => return None,
        };
        let layer = match h >> 17 & 3 {
            1 => 3,
            2 => 2,
            3 => 1,
            _ => return None,
        };
        let table = match (version, layer) {
            (Version::V1, l) => l as usize - 1,
            (_, 1) => 3,
            _ => 4,
        };
        let kbps = BITRATES[table][(h >> 12 & 0xF) as usize];
        if kbps == 0 {
            return None;
        }
        let base_rate = *SAMPLE_RATES.get((h >> 10 & 3) as usize)?;
        let sample_rate = match version {
            Version::V1 => base_rate,
            Version::V2 => base_rate / 2,
            Version::V25 => base_rate / 4,
        };

        Some(Self {
            version,
            layer,
            bitrate: kbps as u32 * 1000,
            sample_rate,
            channels: if h >> 6 & 3 == 3 { 1 } else { 2 },
            padding: h >> 9 & 1 == 1,
        })
    }

    pub(crate) fn samples_per_frame(&self) -> u32 {
        match (self.layer, self.version) {
            (1, _) => 384,
            (2, _) | (3, Version::V1) => 1152,
            _ => 576,
        }
    }

    /// Frame length in bytes, padding included.
    pub(crate) fn frame_len(&self) -> u32 {
        if self.layer == 1 {
            (12 * self.bitrate / self.sample_rate + self.padding as u32) * 4
        } else {
            self.samples_per_frame() / 8 * self.bitrate / self.sample_rate + self.padding as u32
        }
    }

    /// Offset of a Xing/Info header from the start of the frame.
    fn xing_offset(&self) -> usize {
        let side_info = match (self.version, self.channels) {
            (Version::V1, 1) => 17,
            (Version::V1, _) => 32,
            (_, 1) => 9,
            _ => 17,
        };
        4 + side_info
    }
}

const VBRI_OFFSET: usize = 36;

/// Whether `b` starts with an MPEG frame sync.
#[inline]
pub(crate) fn is_sync(b: &[u8]) -> bool {
    b.len() >= 2 && b[0] == 0xFF && b[1] & 0xE0 == 0xE0
}

/// Read the frame at the current position (absolute `offset`) and fill in
/// the stream properties.
pub(crate) fn read_properties(pass: &mut Pass<'_>, offset: u64) -> Result<()> {
    let mut buf = [0u8; 64];
    let n = read_up_to(pass.src, &mut buf)?;
    let buf = &buf[..n];
    let fh = FrameHeader::parse(be_u32(buf, 0)?).ok_or(Error::Parse("bad MPEG frame header"))?;

    let spf = fh.samples_per_frame() as u64;
    let rate = fh.sample_rate as u64;
    let mut bitrate = fh.bitrate as u64;
    let mut duration = 0u64;

    let xing = fh.xing_offset();
    match buf.get(xing..xing + 4) {
        Some(b"Xing") | Some(b"Info") => {
            let flags = be_u32(buf, xing + 4)?;
            let mut p = xing + 8;
            let mut frames = 0u64;
            if flags & 1 != 0 {
                frames = be_u32(buf, p)? as u64;
                p += 4;
            }
            let bytes = if flags & 2 != 0 { be_u32(buf, p)? as u64 } else { 0 };
            if frames == 0 && bytes > 0 {
                frames = bytes / fh.frame_len().max(1) as u64;
            }
            duration = mul_div(frames * spf, 1000, rate).unwrap_or(0);
            if bytes > 0
                && let Some(b) = mul_div(bytes, 8000, duration)
            {
                bitrate = b;
            }
        }
        _ if buf.get(VBRI_OFFSET..VBRI_OFFSET + 4) == Some(&b"VBRI"[..]) => {
            let bytes = be_u32(buf, VBRI_OFFSET + 10)? as u64;
            let frames = be_u32(buf, VBRI_OFFSET + 14)? as u64;
            duration = mul_div(frames * spf, 1000, rate).unwrap_or(0);
            if bytes > 0
                && let Some(b) = mul_div(bytes, 8000, duration)
            {
                bitrate = b;
            }
        }
        _ => {}
    }

    if duration == 0 {
        let len = stream_len(pass.src)?.saturating_sub(offset);
        duration = mul_div(len, 8000, bitrate).unwrap_or(0);
    }

    let props = pass.properties();
    props.channels = fh.channels;
    props.sample_rate = fh.sample_rate;
    props.bitrate = u32::try_from(bitrate).unwrap_or(0);
    props.duration_ms = duration;
    Ok(())
}
