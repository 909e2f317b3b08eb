//! Tag context and format dispatch.
//!
//! A [`TagContext`] carries the per-pass state (found-bitmask, accepted
//! field count, matched format, audio properties) and is reset at the top of
//! every [`TagContext::extract`] call, so one context can be reused across
//! any number of streams. Distinct contexts share nothing mutable and may run
//! on different threads.
//!
//! ## Dispatch order
//! Parsers run in table order and the first accepted value of a
//! first-writer-wins kind is final. For `.mp3` that means ID3v2 frames take
//! precedence over the ID3v1 trailer.
//!
//! | Parser                    | Extensions            | Format    |
//! |---------------------------|-----------------------|-----------|
//! | [`crate::formats::id3v2`] | `.mp3`                | `Mp3IdV2` |
//! | [`crate::formats::id3v1`] | `.mp3`                | `Mp3IdV1` |
//! | [`crate::formats::ogg`]   | `.ogg` `.oga` `.opus` | `Ogg`     |
//! | [`crate::formats::flac`]  | `.flac`               | `Flac`    |
//! | [`crate::formats::m4a`]   | `.m4a` `.m4b` `.mp4`  | `M4a`     |

use std::io::SeekFrom;

use log::{debug, trace};

use crate::formats::{flac, id3v1, id3v2, m4a, ogg};
use crate::options::Options;
use crate::source::ByteSource;
use crate::tag::{Field, Format, Properties, TagKind};
use crate::{Error, Result};

/// Shortest filename that can carry a recognizable extension.
const MIN_FILENAME_LEN: usize = 5;

type ParseFn = fn(&mut Pass<'_>) -> Result<()>;

struct Getter {
    name: &'static str,
    parse: ParseFn,
    exts: &'static [&'static str],
    format: Format,
}

static GETTERS: &[Getter] = &[
    Getter {
        name: "id3v2",
        parse: id3v2::parse,
        exts: &[".mp3"],
        format: Format::Mp3IdV2,
    },
    Getter {
        name: "id3v1",
        parse: id3v1::parse,
        exts: &[".mp3"],
        format: Format::Mp3IdV1,
    },
    Getter {
        name: "ogg",
        parse: ogg::parse,
        exts: &[".ogg", ".oga", ".opus"],
        format: Format::Ogg,
    },
    Getter {
        name: "flac",
        parse: flac::parse,
        exts: &[".flac"],
        format: Format::Flac,
    },
    Getter {
        name: "m4a",
        parse: m4a::parse,
        exts: &[".m4a", ".m4b", ".mp4"],
        format: Format::M4a,
    },
];

/// Reusable extraction state.
///
/// ```
/// use std::io::Cursor;
/// use tagkit::{TagContext, TagKind};
///
/// let mut trailer = vec![0u8; 128];
/// trailer[..3].copy_from_slice(b"TAG");
/// trailer[3..8].copy_from_slice(b"Title");
/// trailer[127] = 17;
///
/// let mut ctx = TagContext::new();
/// let mut title = String::new();
/// ctx.extract(&mut Cursor::new(trailer), Some("song.mp3"), |f| {
///     if f.kind == TagKind::Title {
///         title = f.text.to_owned();
///     }
/// })
/// .unwrap();
/// assert_eq!(title, "Title");
/// assert!(ctx.is_found(TagKind::Genre));
/// ```
#[derive(Debug, Default)]
pub struct TagContext {
    options: Options,
    found: u32,
    num: usize,
    format: Format,
    properties: Properties,
}

impl TagContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: Options) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Identify the tag formats in `source` and report every decoded field
    /// to `sink`.
    ///
    /// With a `filename` only the parsers registered for its extension run;
    /// without one every parser is tried. A filename too short to carry an
    /// extension, the empty one included, fails at once. The source is
    /// rewound to offset 0 after each parser.
    ///
    /// Returns the last format that produced a field, or
    /// [`Error::NotFound`] when no parser produced any. A parser that fails
    /// after accepting fields still counts as a match.
    pub fn extract<F>(
        &mut self,
        source: &mut dyn ByteSource,
        filename: Option<&str>,
        mut sink: F,
    ) -> Result<Format>
    where
        F: FnMut(&Field<'_>),
    {
        self.reset();

        if let Some(name) = filename
            && name.len() < MIN_FILENAME_LEN
        {
            debug!("filename {name:?} too short to carry an extension");
            return Err(Error::NotFound);
        }

        let mut matched = false;
        for g in GETTERS {
            if let Some(name) = filename
                && !g.exts.iter().any(|ext| name.ends_with(ext))
            {
                continue;
            }

            let before = self.num;
            let outcome = {
                let mut pass = Pass::new(&mut *source, &mut *self, &mut sink);
                (g.parse)(&mut pass)
            };
            if let Err(e) = &outcome {
                debug!("{}: {e}", g.name);
            }
            if self.num > before {
                debug!("{}: {} field(s)", g.name, self.num - before);
                matched = true;
                self.format = g.format;
            } else if outcome.is_ok() {
                debug!("{}: no fields", g.name);
            }

            if let Err(e) = source.seek(SeekFrom::Start(0)) {
                debug!("rewind after {} failed: {e}", g.name);
            }
        }

        if matched {
            Ok(self.format)
        } else {
            Err(Error::NotFound)
        }
    }

    fn reset(&mut self) {
        self.found = 0;
        self.num = 0;
        self.format = Format::Unknown;
        self.properties = Properties::default();
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Bitmask of the kinds accepted in the last pass, one bit per
    /// [`TagKind`].
    pub fn found(&self) -> u32 {
        self.found
    }

    pub fn is_found(&self, kind: TagKind) -> bool {
        self.found & kind.bit() != 0
    }

    /// Number of fields accepted in the last pass.
    pub fn num(&self) -> usize {
        self.num
    }

    /// Last format that produced a field in the last pass.
    pub fn format(&self) -> Format {
        self.format
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}

/// One parser's view of a pass: the byte source, the context state, and the
/// caller's sink.
pub(crate) struct Pass<'a> {
    pub(crate) src: &'a mut dyn ByteSource,
    ctx: &'a mut TagContext,
    sink: &'a mut dyn FnMut(&Field<'_>),
    /// Kinds found by earlier parsers; those never reach the sink again.
    prior: u32,
}

impl<'a> Pass<'a> {
    pub(crate) fn new(
        src: &'a mut dyn ByteSource,
        ctx: &'a mut TagContext,
        sink: &'a mut dyn FnMut(&Field<'_>),
    ) -> Self {
        let prior = ctx.found;
        Self {
            src,
            ctx,
            sink,
            prior,
        }
    }

    pub(crate) fn options(&self) -> &Options {
        &self.ctx.options
    }

    pub(crate) fn text_len(&self) -> usize {
        self.ctx.options.text_len
    }

    pub(crate) fn is_found(&self, kind: TagKind) -> bool {
        self.ctx.is_found(kind)
    }

    pub(crate) fn properties(&mut self) -> &mut Properties {
        &mut self.ctx.properties
    }

    /// Hand a text field to the sink.
    pub(crate) fn accept(&mut self, kind: TagKind, text: &str, offset: u64, size: u64) {
        self.accept_field(Field {
            kind,
            text,
            offset,
            size,
            unsync: false,
        });
    }

    /// Like [`Pass::accept`] but skipped when `kind` was already found.
    pub(crate) fn accept_once(&mut self, kind: TagKind, text: &str, offset: u64, size: u64) {
        if !self.is_found(kind) {
            self.accept(kind, text, offset, size);
        }
    }

    /// Hand a field to the sink unless an earlier parser already found its
    /// kind. Repeats from the running parser go through.
    pub(crate) fn accept_field(&mut self, field: Field<'_>) {
        if self.prior & field.kind.bit() != 0 {
            trace!("{:?} already found, dropped", field.kind);
            return;
        }
        trace!("{:?} = {:?} @{:#x}+{}", field.kind, field.text, field.offset, field.size);
        self.ctx.found |= field.kind.bit();
        self.ctx.num += 1;
        (self.sink)(&field);
    }
}
