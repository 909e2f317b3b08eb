//! Extraction options.

/// Knobs for a [`crate::TagContext`].
///
/// ```
/// use tagkit::Options;
///
/// let opts = Options::new().read_properties(false).max_text_len(256);
/// assert!(!opts.properties);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct Options {
    /// Compute channels, sample rate, bitrate and duration.
    pub properties: bool,
    /// Bound on the UTF-8 output of a single text value, in bytes.
    pub text_len: usize,
    /// Largest ID3v2 frame payload read into memory.
    pub frame_size: usize,
    /// Largest comment packet or metadata block read into memory.
    pub block_size: usize,
}

impl Options {
    pub const DEFAULT_TEXT_LEN: usize = 1024;
    pub const DEFAULT_FRAME_SIZE: usize = 1 << 20;
    pub const DEFAULT_BLOCK_SIZE: usize = 16 << 20;

    pub const fn new() -> Self {
        Self {
            properties: true,
            text_len: Self::DEFAULT_TEXT_LEN,
            frame_size: Self::DEFAULT_FRAME_SIZE,
            block_size: Self::DEFAULT_BLOCK_SIZE,
        }
    }

    pub const fn read_properties(mut self, yes: bool) -> Self {
        self.properties = yes;
        self
    }

    pub const fn max_text_len(mut self, len: usize) -> Self {
        self.text_len = len;
        self
    }

    pub const fn max_frame_size(mut self, len: usize) -> Self {
        self.frame_size = len;
        self
    }

    pub const fn max_block_size(mut self, len: usize) -> Self {
        self.block_size = len;
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}
