//! Field kinds, formats, and the values handed to the caller's sink.

use std::fmt;

/// Kind of a metadata field.
///
/// The discriminant is the field's bit position in the found-bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TagKind {
    Artist = 0,
    Album,
    Title,
    /// `"2014"`, `"2015/02/01"`; the year goes first.
    Date,
    /// `"1"`, `"01"`, `"1/4"`; the track number goes first.
    Track,
    AlbumGain,
    AlbumPeak,
    TrackGain,
    TrackPeak,
    Genre,
    /// Embedded picture. The text is the MIME type; offset and size locate
    /// the picture bytes in the byte source.
    Image,
    Comment,
}

impl TagKind {
    /// All kinds, in bit order.
    pub const ALL: [TagKind; 12] = [
        TagKind::Artist,
        TagKind::Album,
        TagKind::Title,
        TagKind::Date,
        TagKind::Track,
        TagKind::AlbumGain,
        TagKind::AlbumPeak,
        TagKind::TrackGain,
        TagKind::TrackPeak,
        TagKind::Genre,
        TagKind::Image,
        TagKind::Comment,
    ];

    /// This kind's bit in the found-bitmask.
    #[inline]
    pub const fn bit(self) -> u32 {
        1 << self as u32
    }

    /// Kind for a `REPLAYGAIN_{TRACK,ALBUM}_{GAIN,PEAK}` key, in any case.
    pub fn from_replaygain_key(key: &str) -> Option<Self> {
        let key = key.to_ascii_uppercase();
        let kind = match key.strip_prefix("REPLAYGAIN_")? {
            "TRACK_GAIN" => TagKind::TrackGain,
            "TRACK_PEAK" => TagKind::TrackPeak,
            "ALBUM_GAIN" => TagKind::AlbumGain,
            "ALBUM_PEAK" => TagKind::AlbumPeak,
            _ => return None,
        };
        Some(kind)
    }
}

/// Container/tag format matched by a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    /// Frame-based tag at the start of an MP3 stream.
    Mp3IdV2,
    /// Fixed 128-byte trailer at the end of an MP3 stream.
    Mp3IdV1,
    Ogg,
    Flac,
    M4a,
    #[default]
    Unknown,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Format::Mp3IdV2 => "MP3 (ID3v2)",
            Format::Mp3IdV1 => "MP3 (ID3v1)",
            Format::Ogg => "Ogg",
            Format::Flac => "FLAC",
            Format::M4a => "M4A",
            Format::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One decoded field, valid only for the duration of the sink call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    pub kind: TagKind,
    /// UTF-8 value (the MIME type for [`TagKind::Image`]).
    pub text: &'a str,
    /// Absolute offset of the raw value in the byte source.
    pub offset: u64,
    /// Size of the raw value in the byte source.
    pub size: u64,
    /// The raw bytes at `offset` are ID3v2-unsynchronized; run them through
    /// [`crate::formats::id3v2::unsync_decode`] before use.
    pub unsync: bool,
}

impl Field<'_> {
    /// Leading decimal integer of the value (`"5/12"` gives 5).
    pub fn number(&self) -> Option<u32> {
        let t = self.text.trim_start();
        let end = t.find(|c: char| !c.is_ascii_digit()).unwrap_or(t.len());
        t[..end].parse().ok()
    }
}

/// Audio properties. Zero means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Properties {
    pub channels: u32,
    /// Hz
    pub sample_rate: u32,
    /// bits/s
    pub bitrate: u32,
    pub duration_ms: u64,
}

impl Properties {
    /// Duration rendered as `"4s"`, `"3:07"`, or `"1:02:03"`.
    pub fn duration_display(&self) -> String {
        let secs = self.duration_ms / 1000;
        let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
        if h > 0 {
            format!("{h}:{m:02}:{s:02}")
        } else if m > 0 {
            format!("{m}:{s:02}")
        } else {
            format!("{s}s")
        }
    }
}
