//! Buffered MSB-first bit reader.
//!
//! A [`BitCursor`] reads from either an in-memory copy of a buffer or any
//! `Read` source through an 8 KiB working buffer. Each byte pulled from the
//! buffer is shifted into the low end of an accumulator; reads take bits from
//! the high end, so the first bit returned is the most significant bit of the
//! first byte.
//!
//! Reading past the end of the input is an error ([`BitError::UnexpectedEof`]),
//! never a silently zeroed value.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use thiserror::Error;

/// Size of the working buffer for stream-backed cursors.
pub const BUFFER_SIZE: usize = 8 * 1024;

/// Widest single read supported by [`BitCursor::read_bits`].
pub const MAX_READ_BITS: u32 = 32;

#[derive(Error, Debug)]
pub enum BitError {
    #[error("Read past end of input")]
    UnexpectedEof,
    #[error("Invalid bit width {0} (expected 1..=32)")]
    InvalidWidth(u32),
    #[error("Seek is only supported on stream-backed cursors")]
    NotSeekable,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Memory-backed cursor type returned by [`BitCursor::from_bytes`].
pub type MemoryBitCursor = BitCursor<io::Empty>;

pub struct BitCursor<R> {
    /// `None` for memory-backed cursors: the whole input is already buffered.
    source:     Option<R>,
    buffer:     Vec<u8>,
    pos:        usize,
    end:        usize,
    // u64 so that topping up a 32-bit request never drops pending bits.
    acc:        u64,
    available:  u32,
    eof:        bool,
    error:      bool,
    bits_read:  u64,
    bytes_read: u64,
}

impl MemoryBitCursor {
    /// Cursor over a private copy of `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            source:     None,
            buffer:     data.to_vec(),
            pos:        0,
            end:        data.len(),
            acc:        0,
            available:  0,
            eof:        true,
            error:      false,
            bits_read:  0,
            bytes_read: 0,
        }
    }
}

impl BitCursor<File> {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl<R: Read> BitCursor<R> {
    /// Stream-backed cursor. Nothing is read until the first bit request.
    pub fn new(reader: R) -> Self {
        Self {
            source:     Some(reader),
            buffer:     vec![0u8; BUFFER_SIZE],
            pos:        0,
            end:        0,
            acc:        0,
            available:  0,
            eof:        false,
            error:      false,
            bits_read:  0,
            bytes_read: 0,
        }
    }

    /// Pull more bytes from the source. Returns `Ok(false)` once the source
    /// is exhausted.
    fn refill(&mut self) -> Result<bool, BitError> {
        if self.eof {
            return Ok(false);
        }
        let reader = match self.source.as_mut() {
            Some(r) => r,
            None => {
                self.eof = true;
                return Ok(false);
            }
        };

        if self.pos > 0 {
            self.buffer.copy_within(self.pos..self.end, 0);
            self.end -= self.pos;
            self.pos = 0;
        }

        loop {
            match reader.read(&mut self.buffer[self.end..]) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(false);
                }
                Ok(n) => {
                    self.end += n;
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.error = true;
                    return Err(e.into());
                }
            }
        }
    }

    fn next_byte(&mut self) -> Result<Option<u8>, BitError> {
        if self.pos >= self.end && !self.refill()? {
            return Ok(None);
        }
        let b = self.buffer[self.pos];
        self.pos += 1;
        self.bytes_read += 1;
        Ok(Some(b))
    }

    fn ensure_bits(&mut self, n: u32) -> Result<bool, BitError> {
        while self.available < n {
            match self.next_byte()? {
                Some(b) => {
                    self.acc = (self.acc << 8) | b as u64;
                    self.available += 8;
                }
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    fn check_width(n: u32) -> Result<(), BitError> {
        if n == 0 || n > MAX_READ_BITS {
            return Err(BitError::InvalidWidth(n));
        }
        Ok(())
    }

    /// Read `n` bits (1..=32), most significant first.
    pub fn read_bits(&mut self, n: u32) -> Result<u32, BitError> {
        Self::check_width(n)?;
        if !self.ensure_bits(n)? {
            return Err(BitError::UnexpectedEof);
        }
        self.available -= n;
        let mask = (1u64 << n) - 1;
        self.bits_read += n as u64;
        Ok(((self.acc >> self.available) & mask) as u32)
    }

    /// Look at the next `n` bits without consuming them.
    pub fn peek_bits(&mut self, n: u32) -> Result<u32, BitError> {
        Self::check_width(n)?;
        if !self.ensure_bits(n)? {
            return Err(BitError::UnexpectedEof);
        }
        let mask = (1u64 << n) - 1;
        Ok(((self.acc >> (self.available - n)) & mask) as u32)
    }

    pub fn read_bit(&mut self) -> Result<u8, BitError> {
        Ok(self.read_bits(1)? as u8)
    }

    pub fn read_byte(&mut self) -> Result<u8, BitError> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn skip_bits(&mut self, mut n: u64) -> Result<(), BitError> {
        while n > 0 {
            let step = n.min(MAX_READ_BITS as u64) as u32;
            self.read_bits(step)?;
            n -= step as u64;
        }
        Ok(())
    }

    /// Discard the unread remainder of the current byte.
    pub fn align_to_byte(&mut self) -> Result<(), BitError> {
        let rem = self.available % 8;
        if rem > 0 {
            self.read_bits(rem)?;
        }
        Ok(())
    }

    /// True once the source is exhausted and no buffered bits remain.
    pub fn is_eof(&self) -> bool {
        self.eof && self.pos >= self.end && self.available == 0
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    pub fn bits_read(&self) -> u64 {
        self.bits_read
    }

    /// Bytes moved from the input into the bit accumulator.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl<R: Read + Seek> BitCursor<R> {
    /// Reposition to an absolute bit offset in the underlying stream.
    ///
    /// All buffered state is dropped and reloaded from the new position.
    pub fn seek(&mut self, bit_position: u64) -> Result<(), BitError> {
        let byte_position = bit_position / 8;
        let reader = self.source.as_mut().ok_or(BitError::NotSeekable)?;
        if let Err(e) = reader.seek(SeekFrom::Start(byte_position)) {
            self.error = true;
            return Err(e.into());
        }

        self.pos        = 0;
        self.end        = 0;
        self.acc        = 0;
        self.available  = 0;
        self.eof        = false;
        self.error      = false;
        self.bytes_read = byte_position;
        self.bits_read  = byte_position * 8;

        self.skip_bits(bit_position % 8)
    }
}

/// Known-answer test: `[AB CD EF 12]` reads back as `0xAB`, `0xC`, `0xD`.
pub fn self_test() -> bool {
    let mut c = BitCursor::from_bytes(&[0xAB, 0xCD, 0xEF, 0x12]);
    matches!(
        (c.read_bits(8), c.read_bits(4), c.read_bits(4)),
        (Ok(0xAB), Ok(0xC), Ok(0xD))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn msb_first_order() {
        let mut c = BitCursor::from_bytes(&[0b1010_0000]);
        assert_eq!(c.read_bit().unwrap(), 1);
        assert_eq!(c.read_bit().unwrap(), 0);
        assert_eq!(c.read_bit().unwrap(), 1);
        assert_eq!(c.read_bits(5).unwrap(), 0);
        assert!(c.is_eof());
    }

    #[test]
    fn known_answer() {
        assert!(self_test());
        let mut c = BitCursor::from_bytes(&[0xAB, 0xCD, 0xEF, 0x12]);
        assert_eq!(c.read_bits(8).unwrap(), 0xAB);
        assert_eq!(c.read_bits(4).unwrap(), 0xC);
        assert_eq!(c.read_bits(4).unwrap(), 0xD);
        assert_eq!(c.read_byte().unwrap(), 0xEF);
        assert_eq!(c.bits_read(), 24);
    }

    #[test]
    fn full_width_read_after_partial() {
        let mut c = BitCursor::from_bytes(&[0xFF, 0x12, 0x34, 0x56, 0x78]);
        assert_eq!(c.read_bits(4).unwrap(), 0xF);
        // 4 bits pending; a 32-bit read needs four more bytes on top.
        assert_eq!(c.read_bits(32).unwrap(), 0xF123_4567);
        assert_eq!(c.read_bits(4).unwrap(), 0x8);
    }

    #[test]
    fn eof_is_an_error() {
        let mut c = BitCursor::from_bytes(&[0x01]);
        assert!(matches!(c.read_bits(9), Err(BitError::UnexpectedEof)));
        let mut empty = BitCursor::from_bytes(&[]);
        assert!(empty.is_eof());
        assert!(matches!(empty.read_bit(), Err(BitError::UnexpectedEof)));
    }

    #[test]
    fn invalid_widths() {
        let mut c = BitCursor::from_bytes(&[0; 8]);
        assert!(matches!(c.read_bits(0), Err(BitError::InvalidWidth(0))));
        assert!(matches!(c.read_bits(33), Err(BitError::InvalidWidth(33))));
    }

    #[test]
    fn peek_does_not_consume() {
        let mut c = BitCursor::from_bytes(&[0xA5]);
        assert_eq!(c.peek_bits(4).unwrap(), 0xA);
        assert_eq!(c.read_bits(4).unwrap(), 0xA);
        assert_eq!(c.read_bits(4).unwrap(), 0x5);
    }

    #[test]
    fn skip_and_align() {
        let mut c = BitCursor::from_bytes(&[0xFF, 0x00, 0x3C, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
        c.skip_bits(3).unwrap();
        c.align_to_byte().unwrap();
        assert_eq!(c.read_byte().unwrap(), 0x00);
        c.skip_bits(40).unwrap();
        assert_eq!(c.read_byte().unwrap(), 0xEE);
        assert!(c.is_eof());
    }

    #[test]
    fn stream_crosses_buffer_boundary() {
        let data: Vec<u8> = (0..BUFFER_SIZE + 100).map(|i| i as u8).collect();
        let mut c = BitCursor::new(Cursor::new(data.clone()));
        for &expected in &data {
            assert_eq!(c.read_byte().unwrap(), expected);
        }
        assert!(matches!(c.read_bit(), Err(BitError::UnexpectedEof)));
        assert!(c.is_eof());
        assert!(!c.has_error());
        assert_eq!(c.bytes_read(), data.len() as u64);
    }

    #[test]
    fn seek_to_bit_offset() {
        let mut c = BitCursor::new(Cursor::new(vec![0x00, 0x00, 0b0001_1111, 0xF0]));
        c.read_bits(12).unwrap();
        c.seek(19).unwrap();
        assert_eq!(c.bits_read(), 19);
        assert_eq!(c.read_bits(9).unwrap(), 0b1_1111_1111);
        assert_eq!(c.bits_read(), 28);
    }

    #[test]
    fn memory_cursor_cannot_seek() {
        let mut c = BitCursor::from_bytes(&[1, 2, 3]);
        assert!(matches!(c.seek(8), Err(BitError::NotSeekable)));
    }

    #[test]
    fn file_backed() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0xAB, 0xCD]).unwrap();
        f.flush().unwrap();
        let mut c = BitCursor::open(f.path()).unwrap();
        assert_eq!(c.read_bits(16).unwrap(), 0xABCD);
    }
}
