//! FLAC - metadata blocks after the `fLaC` marker.
//!
//! A leading ID3v2 tag, which some taggers prepend, is skipped.
//!
//! ## Block header (4 bytes)
//! ```text
//! [0x00] bit 7: last block, bits 0-6: type
//! [0x01] Length of the block body (u24 BE)
//! ```
//!
//! | Type | Block          | Used for                                   |
//! |------|----------------|--------------------------------------------|
//! | 0    | STREAMINFO     | sample rate, channels, duration, bitrate   |
//! | 4    | VORBIS_COMMENT | text fields                                |
//! | 6    | PICTURE        | [`TagKind::Image`] location                |
//!
//! ## STREAMINFO bits 80..144
//! ```text
//! 20 bits sample rate | 3 bits channels - 1 | 5 bits bits per sample - 1
//! 36 bits total samples
//! ```

use log::{debug, trace};

use crate::context::Pass;
use crate::formats::{id3v2, vorbis};
use crate::tag::{Field, TagKind};
use crate::text::latin1_to_utf8;
use crate::utils::{
    be_u24, be_u32, be_u64, bitrate, bytesa, bytesv, magic, mul_div, position, seek_to, skip,
    stream_len,
};
use crate::{Error, Result};

const STREAMINFO: u8 = 0;
const VORBIS_COMMENT: u8 = 4;
const PICTURE: u8 = 6;
const INVALID: u8 = 127;

const STREAMINFO_SIZE: usize = 34;

/// Longest MIME type read from a PICTURE block.
const MAX_MIME_LEN: u32 = 256;

pub(crate) fn parse(pass: &mut Pass<'_>) -> Result<()> {
    let d = bytesa::<10>(pass.src)?;
    let start = if id3v2::is_id3(&d) {
        id3v2::tag_size(&d)
    } else {
        0
    };
    seek_to(pass.src, start)?;
    magic(pass.src, b"fLaC")?;

    let mut total_samples = 0u64;
    loop {
        let h = bytesa::<4>(pass.src)?;
        let last = h[0] & 0x80 != 0;
        let kind = h[0] & 0x7F;
        let len = be_u24(&h, 1)? as u64;
        let at = position(pass.src)?;
        trace!("block {kind} at {at:#x}, {len} bytes");

        match kind {
            STREAMINFO => total_samples = stream_info(pass)?,
            VORBIS_COMMENT if len > pass.options().block_size as u64 => {
                debug!("{len}-byte comment block over the limit");
                return Err(Error::InvalidRange);
            }
            VORBIS_COMMENT => {
                let block = bytesv(pass.src, len as usize)?;
                vorbis::read_comments(pass, &block, at)?;
            }
            PICTURE => picture(pass, at + len)?,
            INVALID => return Err(Error::Parse("invalid FLAC metadata block")),
            _ => {}
        }

        seek_to(pass.src, at + len)?;
        if last {
            break;
        }
    }

    if pass.options().properties {
        let audio = position(pass.src)?;
        let len = stream_len(pass.src)?.saturating_sub(audio);
        let props = pass.properties();
        props.duration_ms = mul_div(total_samples, 1000, props.sample_rate as u64).unwrap_or(0);
        props.bitrate = bitrate(len, props.duration_ms).unwrap_or(0);
    }
    Ok(())
}

/// Sample rate and channels into the properties; returns the total sample
/// count.
fn stream_info(pass: &mut Pass<'_>) -> Result<u64> {
    let b = bytesa::<STREAMINFO_SIZE>(pass.src)?;
    let v = be_u64(&b, 10)?;
    if pass.options().properties {
        let props = pass.properties();
        props.sample_rate = (v >> 44) as u32;
        props.channels = (v >> 41 & 7) as u32 + 1;
    }
    Ok(v & 0xF_FFFF_FFFF)
}

/// PICTURE block: type, MIME, description, dimensions, then the data.
fn picture(pass: &mut Pass<'_>, end: u64) -> Result<()> {
    let h = bytesa::<8>(pass.src)?;
    let mime_len = be_u32(&h, 4)?;
    if mime_len > MAX_MIME_LEN {
        return Err(Error::InvalidRange);
    }
    let raw = bytesv(pass.src, mime_len as usize)?;
    let desc_len = be_u32(&bytesa::<4>(pass.src)?, 0)?;
    // description, then width, height, depth, colors
    skip(pass.src, desc_len as i64 + 16)?;
    let data_len = be_u32(&bytesa::<4>(pass.src)?, 0)? as u64;

    let offset = position(pass.src)?;
    if offset + data_len > end {
        return Err(Error::InvalidRange);
    }
    let mut mime = String::new();
    latin1_to_utf8(&mut mime, &raw, pass.text_len());
    pass.accept_field(Field {
        kind: TagKind::Image,
        text: &mime,
        offset,
        size: data_len,
        unsync: false,
    });
    Ok(())
}
