//! End-to-end extraction through `TagContext`.
//!
//! These tests verify:
//! - ID3v1 trailer fields, genre and track rules
//! - first-writer-wins between ID3v2 and ID3v1 in one stream
//! - failure reporting for unmatched and empty sources
//! - dispatch by extension and without a filename
//! - Ogg, FLAC and MP4 streams end to end
//! - precedence across formats in one stream
//! - callback-backed byte sources

use std::cell::Cell;
use std::io::Cursor;
use std::rc::Rc;

use tagkit::{CallbackSource, Error, Format, Options, TagContext, TagKind, Whence};

/// Build a 128-byte ID3v1 trailer.
fn trailer(
    title: &str,
    artist: &str,
    album: &str,
    year: &str,
    track: (u8, u8),
    genre: u8,
) -> Vec<u8> {
    let mut b = vec![0u8; 128];
    b[..3].copy_from_slice(b"TAG");
    for (at, s) in [(3, title), (33, artist), (63, album), (93, year)] {
        b[at..at + s.len()].copy_from_slice(s.as_bytes());
    }
    b[125] = track.0;
    b[126] = track.1;
    b[127] = genre;
    b
}

/// Build an ID3v2.3 tag with Latin-1 text frames.
fn id3v23(frames: &[(&[u8; 4], &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (id, text) in frames {
        body.extend_from_slice(*id);
        body.extend_from_slice(&(text.len() as u32 + 1).to_be_bytes());
        body.extend_from_slice(&[0, 0, 0]);
        body.extend_from_slice(text.as_bytes());
    }
    let n = body.len() as u32;
    let mut tag = b"ID3\x03\x00\x00".to_vec();
    for shift in [21, 14, 7, 0] {
        tag.push((n >> shift) as u8 & 0x7F);
    }
    tag.extend(body);
    tag
}

/// A Vorbis comment block: vendor, count, `KEY=value` entries.
fn comment_block(entries: &[&str]) -> Vec<u8> {
    let vendor = b"tagkit tests";
    let mut b = (vendor.len() as u32).to_le_bytes().to_vec();
    b.extend_from_slice(vendor);
    b.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for e in entries {
        b.extend_from_slice(&(e.len() as u32).to_le_bytes());
        b.extend_from_slice(e.as_bytes());
    }
    b
}

/// `fLaC` with a STREAMINFO and a final VORBIS_COMMENT block.
fn flac(entries: &[&str]) -> Vec<u8> {
    let mut f = b"fLaC".to_vec();
    let mut info = vec![0x10, 0x00, 0x10, 0x00, 0, 0, 0, 0, 0, 0];
    let packed: u64 = 44100 << 44 | 1 << 41 | 15 << 36 | 44100 * 2;
    info.extend_from_slice(&packed.to_be_bytes());
    info.extend_from_slice(&[0; 16]);
    for (kind, body) in [(0x00, info), (0x84, comment_block(entries))] {
        f.push(kind);
        f.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        f.extend(body);
    }
    f
}

/// An Ogg page of whole packets, each shorter than 255 bytes.
fn ogg_page(flags: u8, granule: u64, seq: u32, packets: &[&[u8]]) -> Vec<u8> {
    let mut p = b"OggS\0".to_vec();
    p.push(flags);
    p.extend_from_slice(&granule.to_le_bytes());
    p.extend_from_slice(&7u32.to_le_bytes());
    p.extend_from_slice(&seq.to_le_bytes());
    p.extend_from_slice(&[0; 4]);
    p.push(packets.len() as u8);
    p.extend(packets.iter().map(|pk| pk.len() as u8));
    for pk in packets {
        p.extend_from_slice(pk);
    }
    p
}

fn ogg_vorbis(entries: &[&str]) -> Vec<u8> {
    let mut ident = b"\x01vorbis".to_vec();
    ident.extend_from_slice(&0u32.to_le_bytes());
    ident.push(2);
    ident.extend_from_slice(&44100u32.to_le_bytes());
    ident.extend_from_slice(&0u32.to_le_bytes());
    ident.extend_from_slice(&96_000u32.to_le_bytes());
    ident.extend_from_slice(&0u32.to_le_bytes());
    ident.extend_from_slice(&[0xB8, 1]);
    let mut comments = b"\x03vorbis".to_vec();
    comments.extend(comment_block(entries));
    comments.push(1);

    let mut s = ogg_page(0x02, 0, 0, &[&ident]);
    s.extend(ogg_page(0, 0, 1, &[&comments, b"\x05vorbis"]));
    s.extend(ogg_page(0x04, 44100 * 2, 2, &[&[0u8; 64]]));
    s
}

fn ogg_opus(entries: &[&str]) -> Vec<u8> {
    let mut head = b"OpusHead\x01\x01".to_vec();
    head.extend_from_slice(&312u16.to_le_bytes());
    head.extend_from_slice(&48000u32.to_le_bytes());
    head.extend_from_slice(&[0, 0, 0]);
    let mut tags = b"OpusTags".to_vec();
    tags.extend(comment_block(entries));

    let mut s = ogg_page(0x02, 0, 0, &[&head]);
    s.extend(ogg_page(0, 0, 1, &[&tags]));
    s.extend(ogg_page(0x04, 48000 * 3 + 312, 2, &[&[0u8; 64]]));
    s
}

fn atom(name: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut a = ((body.len() + 8) as u32).to_be_bytes().to_vec();
    a.extend_from_slice(name);
    a.extend_from_slice(body);
    a
}

/// `ftyp`, then `moov/udta/meta/ilst` holding UTF-8 text items.
fn m4a(items: &[(&[u8; 4], &str)]) -> Vec<u8> {
    let mut ilst = Vec::new();
    for (name, text) in items {
        let mut data = 1u32.to_be_bytes().to_vec();
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(text.as_bytes());
        ilst.extend(atom(name, &atom(b"data", &data)));
    }
    let mut meta = vec![0; 4];
    meta.extend(atom(b"hdlr", &[0; 25]));
    meta.extend(atom(b"ilst", &ilst));

    let mut f = atom(b"ftyp", b"M4A \0\0\0\0M4A isom");
    f.extend(atom(b"moov", &atom(b"udta", &atom(b"meta", &meta))));
    f.extend(atom(b"mdat", &[0u8; 32]));
    f
}

type Outcome = (tagkit::Result<Format>, Vec<(TagKind, String)>, TagContext);

fn extract(data: Vec<u8>, filename: Option<&str>) -> Outcome {
    let mut ctx = TagContext::new();
    let mut fields = Vec::new();
    let res = ctx.extract(&mut Cursor::new(data), filename, |f| {
        fields.push((f.kind, f.text.to_owned()));
    });
    (res, fields, ctx)
}

fn value(fields: &[(TagKind, String)], kind: TagKind) -> Option<&str> {
    fields.iter().find(|(k, _)| *k == kind).map(|(_, v)| v.as_str())
}

#[test]
fn test_trailer_yields_six_fields() {
    let data = trailer("Title", "Artist", "Album", "1999", (0, 5), 17);
    let (res, fields, ctx) = extract(data, Some("song.mp3"));

    assert_eq!(res.unwrap(), Format::Mp3IdV1);
    assert_eq!(fields.len(), 6);
    assert_eq!(value(&fields, TagKind::Title), Some("Title"));
    assert_eq!(value(&fields, TagKind::Artist), Some("Artist"));
    assert_eq!(value(&fields, TagKind::Album), Some("Album"));
    assert_eq!(value(&fields, TagKind::Date), Some("1999"));
    assert_eq!(value(&fields, TagKind::Track), Some("5"));
    assert_eq!(value(&fields, TagKind::Genre), Some("Rock"));
    assert_eq!(ctx.num(), 6);
    assert_eq!(ctx.format(), Format::Mp3IdV1);
}

#[test]
fn test_bad_trailer_magic_is_not_found() {
    let mut data = trailer("Title", "Artist", "", "", (0, 1), 0);
    data[..3].copy_from_slice(b"TAX");
    let (res, fields, ctx) = extract(data, Some("song.mp3"));
    assert!(matches!(res, Err(Error::NotFound)));
    assert!(fields.is_empty());
    assert_eq!(ctx.found(), 0);
}

#[test]
fn test_frame_tag_wins_over_trailer() {
    let mut data = id3v23(&[(b"TIT2", "Frame Title")]);
    data.extend_from_slice(&[0u8; 256]);
    data.extend(trailer("Trailer Title", "", "Trailer Album", "", (0, 0), 255));

    let (res, fields, ctx) = extract(data, Some("track.mp3"));
    assert!(res.is_ok());
    let titles: Vec<_> = fields.iter().filter(|(k, _)| *k == TagKind::Title).collect();
    assert_eq!(titles.len(), 1);
    assert_eq!(titles[0].1, "Frame Title");
    // kinds the frame tag lacks still come from the trailer
    assert_eq!(value(&fields, TagKind::Album), Some("Trailer Album"));
    assert_eq!(ctx.format(), Format::Mp3IdV1);
}

#[test]
fn test_out_of_range_genre_omitted() {
    for code in [192, 200, 255] {
        let data = trailer("T", "A", "B", "2000", (0, 3), code);
        let (res, fields, ctx) = extract(data, Some("song.mp3"));
        assert!(res.is_ok());
        assert_eq!(value(&fields, TagKind::Genre), None);
        assert!(!ctx.is_found(TagKind::Genre));
        assert_eq!(fields.len(), 5);
    }
}

#[test]
fn test_track_byte_rules() {
    let (_, fields, _) = extract(trailer("T", "", "", "", (0, 5), 255), Some("a.mp3"));
    assert_eq!(value(&fields, TagKind::Track), Some("5"));

    let (_, fields, _) = extract(trailer("T", "", "", "", (0, 0), 255), Some("a.mp3"));
    assert_eq!(value(&fields, TagKind::Track), None);

    let (_, fields, _) = extract(trailer("T", "", "", "", (7, 5), 255), Some("a.mp3"));
    assert_eq!(value(&fields, TagKind::Track), None);
}

#[test]
fn test_empty_source() {
    let (res, fields, ctx) = extract(Vec::new(), None);
    assert!(matches!(res, Err(Error::NotFound)));
    assert!(fields.is_empty());
    assert_eq!(ctx.num(), 0);
    assert_eq!(ctx.found(), 0);
    assert_eq!(ctx.format(), Format::Unknown);
}

#[test]
fn test_no_filename_tries_every_parser() {
    let mut data = b"fLaC".to_vec();
    let comment = b"\x01\0\0\0v\x01\0\0\0\x0c\0\0\0GENRE=Techno";
    data.push(0x84);
    data.extend_from_slice(&(comment.len() as u32).to_be_bytes()[1..]);
    data.extend_from_slice(comment);

    let (res, fields, _) = extract(data.clone(), None);
    assert_eq!(res.unwrap(), Format::Flac);
    assert_eq!(fields, vec![(TagKind::Genre, "Techno".to_owned())]);

    // the same bytes under another extension are not looked at
    let (res, _, _) = extract(data, Some("song.ogg"));
    assert!(matches!(res, Err(Error::NotFound)));
}

#[test]
fn test_text_length_bound() {
    let data = trailer("A long enough title", "", "", "", (0, 0), 255);
    let mut ctx = TagContext::with_options(Options::new().max_text_len(6));
    let mut title = String::new();
    ctx.extract(&mut Cursor::new(data), Some("x.mp3"), |f| title = f.text.to_owned())
        .unwrap();
    assert_eq!(title, "A long");
}

#[test]
fn test_callback_source() {
    let data: Rc<[u8]> = trailer("Callback", "", "", "", (0, 9), 8).into();
    let pos = Rc::new(Cell::new(0usize));

    let (rd, rp) = (data.clone(), pos.clone());
    let read = move |buf: &mut [u8]| {
        let at = rp.get().min(rd.len());
        let n = buf.len().min(rd.len() - at);
        buf[..n].copy_from_slice(&rd[at..at + n]);
        rp.set(at + n);
        n as isize
    };
    let (len, sp) = (data.len() as i64, pos.clone());
    let seek = move |offset: i64, whence: Whence| {
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => sp.get() as i64,
            Whence::End => len,
        };
        let p = base + offset;
        if p < 0 {
            return -1;
        }
        sp.set(p as usize);
        p
    };

    let mut src = CallbackSource::new(read, seek);
    let mut ctx = TagContext::new();
    let mut fields = Vec::new();
    let res = ctx.extract(&mut src, Some("cb.mp3"), |f| {
        fields.push((f.kind, f.text.to_owned()));
    });
    assert_eq!(res.unwrap(), Format::Mp3IdV1);
    assert_eq!(value(&fields, TagKind::Title), Some("Callback"));
    assert_eq!(value(&fields, TagKind::Track), Some("9"));
    assert_eq!(value(&fields, TagKind::Genre), Some("Jazz"));
}

#[test]
fn test_context_reuse() {
    let mut ctx = TagContext::new();
    let first = trailer("One", "", "", "", (0, 0), 255);
    ctx.extract(&mut Cursor::new(first), Some("1.mp3"), |_| {}).unwrap();
    assert_eq!(ctx.num(), 1);

    let second = trailer("Two", "Artist", "", "", (0, 0), 255);
    let mut titles = Vec::new();
    ctx.extract(&mut Cursor::new(second), Some("2.mp3"), |f| {
        if f.kind == TagKind::Title {
            titles.push(f.text.to_owned());
        }
    })
    .unwrap();
    assert_eq!(titles, ["Two"]);
    assert_eq!(ctx.num(), 2);
}

#[test]
fn test_ogg_extensions() {
    for name in ["a.ogg", "a.oga"] {
        let (res, fields, ctx) = extract(ogg_vorbis(&["TITLE=Ogg", "ALBUM=Xiph"]), Some(name));
        assert_eq!(res.unwrap(), Format::Ogg);
        assert_eq!(value(&fields, TagKind::Title), Some("Ogg"));
        assert_eq!(value(&fields, TagKind::Album), Some("Xiph"));
        let p = ctx.properties();
        assert_eq!((p.channels, p.sample_rate, p.bitrate), (2, 44100, 96_000));
        assert_eq!(p.duration_ms, 2000);
    }
}

#[test]
fn test_opus_stream() {
    let (res, fields, ctx) = extract(ogg_opus(&["artist=Opus Band"]), Some("voice.opus"));
    assert_eq!(res.unwrap(), Format::Ogg);
    assert_eq!(fields, vec![(TagKind::Artist, "Opus Band".to_owned())]);
    assert_eq!(ctx.properties().sample_rate, 48000);
    assert_eq!(ctx.properties().duration_ms, 3000);
}

#[test]
fn test_flac_stream() {
    let (res, fields, ctx) = extract(flac(&["TITLE=Lossless", "DATE=2001"]), Some("a.flac"));
    assert_eq!(res.unwrap(), Format::Flac);
    assert_eq!(value(&fields, TagKind::Title), Some("Lossless"));
    assert_eq!(value(&fields, TagKind::Date), Some("2001"));
    assert_eq!(ctx.properties().sample_rate, 44100);
    assert_eq!(ctx.properties().channels, 2);
    assert_eq!(ctx.properties().duration_ms, 2000);
}

#[test]
fn test_m4a_extensions() {
    let data = m4a(&[(b"\xA9nam", "Movie Title"), (b"\xA9ART", "Director")]);
    for name in ["a.m4a", "a.m4b", "a.mp4"] {
        let (res, fields, _) = extract(data.clone(), Some(name));
        assert_eq!(res.unwrap(), Format::M4a);
        assert_eq!(value(&fields, TagKind::Title), Some("Movie Title"));
        assert_eq!(value(&fields, TagKind::Artist), Some("Director"));
    }
    // an MP4 is never handed to the Ogg parser
    let (res, _, _) = extract(data, Some("a.ogg"));
    assert!(matches!(res, Err(Error::NotFound)));
}

#[test]
fn test_earlier_format_wins_without_filename() {
    let mut data = id3v23(&[(b"TIT2", "From Frames")]);
    data.extend(flac(&["TITLE=From Comments", "ALBUM=Only Here"]));

    let (res, fields, ctx) = extract(data.clone(), None);
    assert_eq!(res.unwrap(), Format::Flac);
    let titles: Vec<_> = fields.iter().filter(|(k, _)| *k == TagKind::Title).collect();
    assert_eq!(titles.len(), 1);
    assert_eq!(titles[0].1, "From Frames");
    assert_eq!(value(&fields, TagKind::Album), Some("Only Here"));
    assert_eq!(ctx.num(), 2);

    // with the extension only the FLAC parser runs, and it skips the frames
    let (res, fields, _) = extract(data, Some("mixed.flac"));
    assert_eq!(res.unwrap(), Format::Flac);
    assert_eq!(value(&fields, TagKind::Title), Some("From Comments"));
}

#[test]
fn test_truncated_stream_keeps_delivered_fields() {
    let mut data = flac(&["TITLE=Partial"]);
    // the comment block is no longer last; a cut-off block follows it
    data[4 + 4 + 34] = 0x04;
    data.extend_from_slice(&[0x04, 0x00, 0x00, 0x64]);
    data.extend_from_slice(b"cut short");

    let (res, fields, ctx) = extract(data, Some("cut.flac"));
    assert_eq!(res.unwrap(), Format::Flac);
    assert_eq!(fields, vec![(TagKind::Title, "Partial".to_owned())]);
    assert_eq!(ctx.num(), 1);
}

#[test]
fn test_empty_filename_fails() {
    let data = trailer("Title", "", "", "", (0, 0), 255);
    let (res, fields, ctx) = extract(data, Some(""));
    assert!(matches!(res, Err(Error::NotFound)));
    assert!(fields.is_empty());
    assert_eq!(ctx.num(), 0);
}
