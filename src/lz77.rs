//! LZ77 codec: 4 KiB sliding window, matches of 3..=18 bytes.
//!
//! # Wire format
//!
//! ```text
//! flag:u8 = 0x01 | original_size:u32 (BE) | token*
//! ```
//!
//! | Token | Bytes |
//! |-------|-------|
//! | literal `b < 0x80` | `b` |
//! | literal `b >= 0x80` | `0x80 b` |
//! | match, `offset <= 255 && length <= 15` | `0x81 | (length-3) << 1`, `offset` |
//! | match, otherwise | `0xFF`, `length-3`, `offset` (u16 BE) |
//!
//! Only the canonical short form is accepted: a short byte with bit 0 clear,
//! bits 5..=6 set, or a length above 15 is refused rather than reinterpreted.
//!
//! There is no stored/raw variant. The encoder always emits flag `0x01`, even
//! when the coded form is larger than the input, and the decoder rejects every
//! other flag value, `0x00` included.

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use crate::buffer::ByteBuffer;

pub const WINDOW_SIZE: usize = 4096;
pub const MIN_MATCH:   usize = 3;
pub const MAX_MATCH:   usize = 18;

/// The only accepted stream flag.
pub const FLAG_COMPRESSED: u8 = 0x01;
/// Flag byte plus the 4-byte original size.
pub const STREAM_HEADER_LEN: usize = 5;

const LITERAL_ESCAPE:   u8 = 0x80;
const SHORT_MATCH_BASE: u8 = 0x81;
const LONG_MATCH:       u8 = 0xFF;
const SHORT_MAX_OFFSET: usize = 255;
const SHORT_MAX_LENGTH: usize = 15;

const HASH_BITS: u32 = 13;
const NO_POS:    usize = usize::MAX;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Lz77Error {
    #[error("Empty input")]
    EmptyInput,
    #[error("Input of {0} bytes exceeds the u32 size field")]
    InputTooLarge(usize),
    #[error("Invalid stream flag 0x{0:02x} (only 0x01 is accepted)")]
    InvalidFlag(u8),
    #[error("Stream truncated at input byte {0}")]
    Truncated(usize),
    #[error("Reserved token byte 0x{byte:02x} at input byte {position}")]
    InvalidToken { byte: u8, position: usize },
    #[error("Back-reference offset {offset} invalid at output position {position}")]
    InvalidOffset { offset: usize, position: usize },
    #[error("Match length {0} outside 3..=18")]
    InvalidLength(usize),
    #[error("Match of {length} bytes at output position {position} overruns declared size {declared}")]
    Overrun { length: usize, position: usize, declared: usize },
    #[error("Declared size {declared} exceeds limit {limit}")]
    SizeLimit { declared: u64, limit: u64 },
    #[error("Cannot allocate {0} bytes for output")]
    OutOfMemory(usize),
    #[error("Decoded {produced} bytes, header declares {declared}")]
    SizeMismatch { declared: usize, produced: usize },
}

// ── Tokens ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lz77Token {
    Literal(u8),
    Match { offset: u16, length: u8 },
}

impl Lz77Token {
    /// Append the wire form of this token.
    pub fn encode_into(self, out: &mut ByteBuffer) {
        match self {
            Lz77Token::Literal(b) if b < LITERAL_ESCAPE => out.push(b),
            Lz77Token::Literal(b) => {
                out.push(LITERAL_ESCAPE);
                out.push(b);
            }
            Lz77Token::Match { offset, length } => {
                let len_code = length - MIN_MATCH as u8;
                if offset as usize <= SHORT_MAX_OFFSET && length as usize <= SHORT_MAX_LENGTH {
                    out.push(SHORT_MATCH_BASE | (len_code << 1));
                    out.push(offset as u8);
                } else {
                    let mut off = [0u8; 2];
                    BigEndian::write_u16(&mut off, offset);
                    out.push(LONG_MATCH);
                    out.push(len_code);
                    out.extend_from_slice(&off);
                }
            }
        }
    }

    pub fn encoded_len(self) -> usize {
        match self {
            Lz77Token::Literal(b) if b < LITERAL_ESCAPE => 1,
            Lz77Token::Literal(_) => 2,
            Lz77Token::Match { offset, length }
                if offset as usize <= SHORT_MAX_OFFSET && length as usize <= SHORT_MAX_LENGTH => 2,
            Lz77Token::Match { .. } => 4,
        }
    }
}

/// Iterates the tokens of a stream body (the bytes after the 5-byte header).
///
/// Only the token syntax is checked here. Offsets and lengths are validated
/// against the output by [`decompress`].
pub struct TokenReader<'a> {
    data: &'a [u8],
    pos:  usize,
    base: usize,
}

impl<'a> TokenReader<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        Self::with_base(body, 0)
    }

    /// `base` is added to positions reported in errors.
    fn with_base(body: &'a [u8], base: usize) -> Self {
        Self { data: body, pos: 0, base }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Lz77Error> {
        if self.data.len() - self.pos < n {
            return Err(Lz77Error::Truncated(self.base + self.data.len()));
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn read_token(&mut self) -> Result<Lz77Token, Lz77Error> {
        let at = self.base + self.pos;
        let b = self.take(1)?[0];
        match b {
            b if b < LITERAL_ESCAPE => Ok(Lz77Token::Literal(b)),
            LITERAL_ESCAPE => Ok(Lz77Token::Literal(self.take(1)?[0])),
            LONG_MATCH => {
                let rest = self.take(3)?;
                let length = rest[0] as usize + MIN_MATCH;
                if length > MAX_MATCH {
                    return Err(Lz77Error::InvalidLength(length));
                }
                Ok(Lz77Token::Match {
                    offset: BigEndian::read_u16(&rest[1..3]),
                    length: length as u8,
                })
            }
            // Short form: bit 0 set, length code in bits 1..=4, bits 5..=6 clear.
            b if b & 0x61 == 0x01 => {
                let length = ((b & 0x1E) >> 1) as usize + MIN_MATCH;
                if length > SHORT_MAX_LENGTH {
                    return Err(Lz77Error::InvalidToken { byte: b, position: at });
                }
                let offset = self.take(1)?[0] as u16;
                Ok(Lz77Token::Match { offset, length: length as u8 })
            }
            b => Err(Lz77Error::InvalidToken { byte: b, position: at }),
        }
    }
}

impl<'a> Iterator for TokenReader<'a> {
    type Item = Result<Lz77Token, Lz77Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        Some(self.read_token())
    }
}

// ── Match finding ────────────────────────────────────────────────────────────

#[inline]
fn match_len(data: &[u8], candidate: usize, pos: usize, limit: usize) -> usize {
    let mut len = 0;
    while len < limit && data[candidate + len] == data[pos + len] {
        len += 1;
    }
    len
}

/// Longest match for `data[pos..]` in the preceding window, as
/// `(offset, length)`.
///
/// Offsets are tried in ascending order and a candidate only replaces the
/// current best when strictly longer, so ties resolve to the smallest offset.
/// Matches may run into the lookahead. Returns `None` below [`MIN_MATCH`].
pub fn find_longest_match(data: &[u8], pos: usize) -> Option<(usize, usize)> {
    let limit = MAX_MATCH.min(data.len().saturating_sub(pos));
    if limit < MIN_MATCH {
        return None;
    }
    let mut best = (0, 0);
    for offset in 1..=pos.min(WINDOW_SIZE) {
        let len = match_len(data, pos - offset, pos, limit);
        if len > best.1 {
            best = (offset, len);
            if len == limit {
                break;
            }
        }
    }
    (best.1 >= MIN_MATCH).then_some(best)
}

/// Hash-chain match finder. Produces the same `(offset, length)` as
/// [`find_longest_match`]: every match of at least [`MIN_MATCH`] bytes shares
/// its 3-byte prefix, and chains are walked nearest-first.
struct MatchFinder {
    head: Vec<usize>,
    prev: Vec<usize>,
}

impl MatchFinder {
    fn new(len: usize) -> Self {
        Self {
            head: vec![NO_POS; 1 << HASH_BITS],
            prev: vec![NO_POS; len],
        }
    }

    #[inline]
    fn hash(data: &[u8], pos: usize) -> usize {
        let v = (data[pos] as u32) << 16 | (data[pos + 1] as u32) << 8 | data[pos + 2] as u32;
        (v.wrapping_mul(2_654_435_761) >> (32 - HASH_BITS)) as usize
    }

    fn insert(&mut self, data: &[u8], pos: usize) {
        if pos + MIN_MATCH > data.len() {
            return;
        }
        let h = Self::hash(data, pos);
        self.prev[pos] = self.head[h];
        self.head[h] = pos;
    }

    fn find(&self, data: &[u8], pos: usize) -> Option<(usize, usize)> {
        let limit = MAX_MATCH.min(data.len() - pos);
        if limit < MIN_MATCH {
            return None;
        }
        let mut best = (0, 0);
        let mut candidate = self.head[Self::hash(data, pos)];
        while candidate != NO_POS {
            let offset = pos - candidate;
            if offset > WINDOW_SIZE {
                break;
            }
            let len = match_len(data, candidate, pos, limit);
            if len > best.1 {
                best = (offset, len);
                if len == limit {
                    break;
                }
            }
            candidate = self.prev[candidate];
        }
        (best.1 >= MIN_MATCH).then_some(best)
    }
}

// ── Compression ──────────────────────────────────────────────────────────────

/// Tokenise `data` greedily.
pub fn tokenize(data: &[u8]) -> Vec<Lz77Token> {
    let mut finder = MatchFinder::new(data.len());
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let step = match finder.find(data, pos) {
            Some((offset, length)) => {
                tokens.push(Lz77Token::Match { offset: offset as u16, length: length as u8 });
                length
            }
            None => {
                tokens.push(Lz77Token::Literal(data[pos]));
                1
            }
        };
        for p in pos..pos + step {
            finder.insert(data, p);
        }
        pos += step;
    }
    tokens
}

/// Compress `data` into a complete LZ77 stream.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, Lz77Error> {
    if data.is_empty() {
        return Err(Lz77Error::EmptyInput);
    }
    let size = u32::try_from(data.len()).map_err(|_| Lz77Error::InputTooLarge(data.len()))?;

    let mut out = ByteBuffer::with_capacity(STREAM_HEADER_LEN + data.len() / 2 + 16);
    out.push(FLAG_COMPRESSED);
    out.extend_from_slice(&[0u8; 4]);

    for token in tokenize(data) {
        token.encode_into(&mut out);
    }

    // Size field is filled in once the token stream is complete.
    let mut size_be = [0u8; 4];
    BigEndian::write_u32(&mut size_be, size);
    let patched = out.patch(1, &size_be);
    debug_assert!(patched);
    log::debug!("lz77: {} -> {} bytes", data.len(), out.len());
    Ok(out.into_vec())
}

// ── Decompression ────────────────────────────────────────────────────────────

/// Original size declared by a stream header, after checking the flag.
pub fn declared_size(input: &[u8]) -> Result<u32, Lz77Error> {
    let flag = *input.first().ok_or(Lz77Error::EmptyInput)?;
    if flag != FLAG_COMPRESSED {
        return Err(Lz77Error::InvalidFlag(flag));
    }
    if input.len() < STREAM_HEADER_LEN {
        return Err(Lz77Error::Truncated(input.len()));
    }
    Ok(BigEndian::read_u32(&input[1..STREAM_HEADER_LEN]))
}

pub fn decompress(input: &[u8]) -> Result<Vec<u8>, Lz77Error> {
    decompress_with_limit(input, u32::MAX as u64)
}

/// Decompress, refusing streams that declare more than `limit` bytes.
pub fn decompress_with_limit(input: &[u8], limit: u64) -> Result<Vec<u8>, Lz77Error> {
    let declared = declared_size(input)? as usize;
    if declared as u64 > limit {
        return Err(Lz77Error::SizeLimit { declared: declared as u64, limit });
    }

    let mut out: Vec<u8> = Vec::new();
    out.try_reserve_exact(declared).map_err(|_| Lz77Error::OutOfMemory(declared))?;

    let mut tokens = TokenReader::with_base(&input[STREAM_HEADER_LEN..], STREAM_HEADER_LEN);
    while out.len() < declared {
        let token = match tokens.next() {
            Some(t) => t?,
            None => break,
        };
        match token {
            Lz77Token::Literal(b) => out.push(b),
            Lz77Token::Match { offset, length } => {
                let (offset, length) = (offset as usize, length as usize);
                let position = out.len();
                if offset == 0 || offset > WINDOW_SIZE || offset > position {
                    return Err(Lz77Error::InvalidOffset { offset, position });
                }
                if position + length > declared {
                    return Err(Lz77Error::Overrun { length, position, declared });
                }
                let start = position - offset;
                if offset >= length {
                    out.extend_from_within(start..start + length);
                } else {
                    for i in 0..length {
                        let b = out[start + i % offset];
                        out.push(b);
                    }
                }
            }
        }
    }

    if out.len() != declared {
        return Err(Lz77Error::SizeMismatch { declared, produced: out.len() });
    }
    Ok(out)
}
