//! CRC32 integrity checking.
//!
//! Standard reflected CRC-32 (polynomial `0xEDB88320`, init `0xFFFFFFFF`,
//! final XOR `0xFFFFFFFF`), the same checksum stored in V3 container headers.
//!
//! The lookup tables live inside `crc32fast` as compile-time constants, so
//! there is no process-wide initialisation step and concurrent first use
//! cannot race.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read size used when checksumming files.
pub const FILE_CHUNK_SIZE: usize = 8 * 1024;

/// Check value for the ASCII string `"123456789"`.
pub const CHECK_VALUE: u32 = 0xCBF4_3926;

/// One-shot CRC32 of `data`.
#[inline]
pub fn calculate(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// CRC32 of a file's contents, read in [`FILE_CHUNK_SIZE`] chunks.
pub fn calculate_file(path: &Path) -> io::Result<u32> {
    let mut file = File::open(path)?;
    let mut ctx = Crc32Context::new();
    let mut buf = [0u8; FILE_CHUNK_SIZE];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        ctx.update(&buf[..n]);
    }
    Ok(ctx.finalize())
}

#[inline]
pub fn verify(data: &[u8], expected: u32) -> bool {
    calculate(data) == expected
}

pub fn verify_file(path: &Path, expected: u32) -> io::Result<bool> {
    Ok(calculate_file(path)? == expected)
}

/// Streaming CRC32.
///
/// Feeding any split of a buffer through [`update`](Self::update) yields the
/// same value as [`calculate`] over the whole buffer.
#[derive(Clone, Default)]
pub struct Crc32Context {
    hasher: crc32fast::Hasher,
    bytes:  u64,
}

impl Crc32Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Total bytes fed so far.
    pub fn bytes_processed(&self) -> u64 {
        self.bytes
    }

    pub fn reset(&mut self) {
        self.hasher.reset();
        self.bytes = 0;
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

/// Known-answer test against [`CHECK_VALUE`], one-shot and streaming.
pub fn self_test() -> bool {
    let input = b"123456789";
    if calculate(input) != CHECK_VALUE {
        return false;
    }
    let mut ctx = Crc32Context::new();
    ctx.update(&input[..4]);
    ctx.update(&input[4..]);
    ctx.finalize() == CHECK_VALUE
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    #[test]
    fn known_vector() {
        assert_eq!(calculate(b"123456789"), 0xCBF43926);
        assert!(verify(b"123456789", CHECK_VALUE));
        assert!(!verify(b"123456780", CHECK_VALUE));
    }

    #[test]
    fn empty_input() {
        assert_eq!(calculate(&[]), 0);
        assert_eq!(Crc32Context::new().finalize(), 0);
    }

    #[test]
    fn self_test_passes() {
        assert!(self_test());
    }

    #[test]
    fn reset_clears_state() {
        let mut ctx = Crc32Context::new();
        ctx.update(b"garbage");
        ctx.reset();
        assert_eq!(ctx.bytes_processed(), 0);
        ctx.update(b"123456789");
        assert_eq!(ctx.finalize(), CHECK_VALUE);
    }

    #[test]
    fn file_matches_buffer() {
        // Larger than one read chunk so the loop runs more than once.
        let data: Vec<u8> = (0..FILE_CHUNK_SIZE * 3 + 17).map(|i| (i * 31) as u8).collect();
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&data).unwrap();
        f.flush().unwrap();
        let crc = calculate_file(f.path()).unwrap();
        assert_eq!(crc, calculate(&data));
        assert!(verify_file(f.path(), crc).unwrap());
    }

    proptest! {
        #[test]
        fn streaming_equals_one_shot(
            data in proptest::collection::vec(any::<u8>(), 0..2048),
            cuts in proptest::collection::vec(any::<usize>(), 0..8),
        ) {
            let mut points: Vec<usize> = cuts.iter().map(|c| if data.is_empty() { 0 } else { c % data.len() }).collect();
            points.sort_unstable();
            let mut ctx = Crc32Context::new();
            let mut start = 0;
            for p in points {
                ctx.update(&data[start..p]);
                start = p;
            }
            ctx.update(&data[start..]);
            prop_assert_eq!(ctx.bytes_processed(), data.len() as u64);
            prop_assert_eq!(ctx.finalize(), calculate(&data));
        }
    }
}
