//! Growable owned output buffer.
//!
//! [`ByteBuffer`] is the sink the LZ77 encoder writes tokens into. Capacity
//! growth is amortised by the underlying `Vec`. Appends are the norm; the one
//! exception is [`ByteBuffer::patch`], which back-fills the stream's size
//! field after the tokens are written.

use std::io::{self, Write};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: Vec::with_capacity(capacity) }
    }

    #[inline]
    pub fn push(&mut self, byte: u8) {
        self.data.push(byte);
    }

    #[inline]
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Overwrite bytes already written at `offset`.
    ///
    /// Returns `false` if the range is not fully inside the buffer.
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) -> bool {
        match offset.checked_add(bytes.len()) {
            Some(end) if end <= self.data.len() => {
                self.data[offset..end].copy_from_slice(bytes);
                true
            }
            _ => false,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl Write for ByteBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, WriteBytesExt};

    #[test]
    fn appends_in_order() {
        let mut b = ByteBuffer::with_capacity(1);
        b.push(1);
        b.extend_from_slice(&[2, 3]);
        b.write_u16::<BigEndian>(0x0405).unwrap();
        assert_eq!(b.as_slice(), &[1, 2, 3, 4, 5]);
        assert_eq!(b.len(), 5);
        assert_eq!(b.into_vec(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn patch_bounds() {
        let mut b = ByteBuffer::new();
        assert!(b.is_empty());
        b.extend_from_slice(&[0; 4]);
        assert!(b.patch(1, &[9, 9]));
        assert!(!b.patch(3, &[1, 1]));
        assert!(!b.patch(usize::MAX, &[1]));
        assert_eq!(b.as_slice(), &[0, 9, 9, 0]);
    }
}
