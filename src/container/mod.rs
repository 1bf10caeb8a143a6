//! COMP and Hardcore container headers.
//!
//! # COMP V3 (legacy, 26 bytes, host byte order)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | magic `"COMP"` |
//! | 4 | 1 | version = 3 |
//! | 5 | 1 | algorithm id |
//! | 6 | 8 | original size |
//! | 14 | 8 | compressed size |
//! | 22 | 4 | CRC32 of the decoded payload (0 = not recorded) |
//!
//! V3 multi-byte fields are read in host order with no normalisation. This
//! matches how V3 files were written and is kept as a separate code path from
//! V4.
//!
//! # COMP V4 (64 bytes, big-endian)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | magic `"COMP"` |
//! | 4 | 1 | version = 4 |
//! | 5 | 1 | algorithm id |
//! | 6 | 1 | level |
//! | 7 | 1 | file-type hint |
//! | 8 | 8 | original size |
//! | 16 | 8 | compressed size (0 = not recorded) |
//! | 24 | 4 | block count |
//! | 28 | 4 | `"BLK4"` if a block table follows the header |
//! | 32 | 32 | zero |
//!
//! # Hardcore (8 bytes)
//!
//! `AD EF 01`, an inner tag byte, then the original size as a little-endian
//! u32. The compressed size is everything after the 8-byte header.

pub mod block_table;

use std::io::{self, Cursor};
use std::ops::Range;

use byteorder::{BigEndian, ByteOrder, LittleEndian, NativeEndian, ReadBytesExt};
use serde::Serialize;
use thiserror::Error;

use crate::codec::AlgorithmId;

pub use block_table::{BlockDescriptor, BlockTable};

pub const COMP_MAGIC:     [u8; 4] = *b"COMP";
pub const HARDCORE_MAGIC: [u8; 3] = [0xAD, 0xEF, 0x01];
/// `"COMP"` read as a little-endian u32.
pub const COMP_MAGIC_U32:     u32 = 0x504D_4F43;
pub const HARDCORE_MAGIC_U32: u32 = 0x0001_EFAD;

pub const BLOCK_MARKER: [u8; 4] = *b"BLK4";

/// Inputs shorter than this are rejected before any field is read.
pub const MIN_FILE_SIZE: usize = 16;

pub const V3_HEADER_LEN:       usize = 26;
pub const V4_FIXED_LEN:        usize = 28;
pub const V4_HEADER_LEN:       usize = 64;
pub const HARDCORE_HEADER_LEN: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    #[error("File too small: {0} bytes (minimum {MIN_FILE_SIZE})")]
    InvalidFileSize(usize),
    #[error("Invalid magic number {found}")]
    InvalidMagic { found: String },
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u8),
    #[error("Corrupted header: cannot read {0}")]
    CorruptedHeader(&'static str),
    #[error("Invalid algorithm id {0}")]
    InvalidAlgorithm(u8),
    #[error("Truncated container: need {needed} bytes, have {available}")]
    Truncated { needed: u64, available: u64 },
    #[error("Invalid block table: {0}")]
    InvalidBlockTable(&'static str),
    #[error("Block table lists {table} blocks, header declares {header}")]
    BlockCountMismatch { header: u32, table: u32 },
    #[error("Block count {0} exceeds limit")]
    TooManyBlocks(u32),
    #[error("Cannot encode header: {0}")]
    Unencodable(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerKind {
    V3,
    V4,
    Hardcore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressedContainer {
    pub kind:            ContainerKind,
    pub magic:           u32,
    /// 3 or 4 for COMP; 0 for Hardcore.
    pub version:         u8,
    pub algorithm:       AlgorithmId,
    /// V4 only.
    pub level:           u8,
    /// V4 only.
    pub file_type_hint:  Option<u8>,
    pub original_size:   u64,
    pub compressed_size: u64,
    /// V3 only; zero when not recorded.
    pub checksum:        u32,
    pub block_count:     u32,
    pub has_block_table: bool,
    /// Hardcore inner-algorithm byte (offset 3).
    pub hardcore_tag:    Option<u8>,
}

impl CompressedContainer {
    /// Header for a single-block V4 container.
    pub fn new_v4(
        algorithm:       AlgorithmId,
        level:           u8,
        file_type_hint:  u8,
        original_size:   u64,
        compressed_size: u64,
    ) -> Self {
        Self {
            kind: ContainerKind::V4,
            magic: COMP_MAGIC_U32,
            version: 4,
            algorithm,
            level,
            file_type_hint: Some(file_type_hint),
            original_size,
            compressed_size,
            checksum: 0,
            block_count: 1,
            has_block_table: false,
            hardcore_tag: None,
        }
    }

    pub fn header_len(&self) -> usize {
        match self.kind {
            ContainerKind::V3       => V3_HEADER_LEN,
            ContainerKind::V4       => V4_HEADER_LEN,
            ContainerKind::Hardcore => HARDCORE_HEADER_LEN,
        }
    }

    /// Analyzer view: more than one block behind a block table.
    pub fn is_blockwise(&self) -> bool {
        self.has_block_table && self.block_count > 1
    }

    pub fn compression_ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        self.compressed_size as f64 / self.original_size as f64
    }

    /// Byte range of the payload inside a container of `total_len` bytes.
    ///
    /// A zero `compressed_size` means "everything after the header". With a
    /// block table the range covers the table and all block payloads; the
    /// table checks its own extent. For Hardcore the whole container is
    /// returned, since the Hardcore codec reads its own header.
    pub fn payload_range(&self, total_len: usize) -> Result<Range<usize>, ContainerError> {
        let start = self.header_len();
        if total_len < start {
            return Err(ContainerError::Truncated {
                needed:    start as u64,
                available: total_len as u64,
            });
        }
        if self.kind == ContainerKind::Hardcore {
            return Ok(0..total_len);
        }
        if self.has_block_table || self.compressed_size == 0 {
            return Ok(start..total_len);
        }
        let needed = (start as u64).saturating_add(self.compressed_size);
        if needed > total_len as u64 {
            return Err(ContainerError::Truncated { needed, available: total_len as u64 });
        }
        Ok(start..needed as usize)
    }
}

fn field<T>(r: io::Result<T>, name: &'static str) -> Result<T, ContainerError> {
    r.map_err(|_| ContainerError::CorruptedHeader(name))
}

fn algorithm_field(id: u8) -> Result<AlgorithmId, ContainerError> {
    AlgorithmId::from_id(id).ok_or(ContainerError::InvalidAlgorithm(id))
}

/// Parse a COMP V3/V4 or Hardcore header from the start of `data`.
pub fn parse_header(data: &[u8]) -> Result<CompressedContainer, ContainerError> {
    if data.len() < MIN_FILE_SIZE {
        return Err(ContainerError::InvalidFileSize(data.len()));
    }
    if data[..4] == COMP_MAGIC {
        return match data[4] {
            3 => parse_v3(data),
            4 => parse_v4(data),
            v => Err(ContainerError::UnsupportedVersion(v)),
        };
    }
    if data[..3] == HARDCORE_MAGIC {
        return Ok(parse_hardcore(data));
    }
    Err(ContainerError::InvalidMagic { found: hex::encode(&data[..4]) })
}

fn parse_v3(data: &[u8]) -> Result<CompressedContainer, ContainerError> {
    let mut r = Cursor::new(data);
    r.set_position(5);
    let algorithm       = algorithm_field(field(r.read_u8(), "algorithm")?)?;
    let original_size   = field(r.read_u64::<NativeEndian>(), "original_size")?;
    let compressed_size = field(r.read_u64::<NativeEndian>(), "compressed_size")?;
    let checksum        = field(r.read_u32::<NativeEndian>(), "checksum")?;

    Ok(CompressedContainer {
        kind: ContainerKind::V3,
        magic: COMP_MAGIC_U32,
        version: 3,
        algorithm,
        level: 0,
        file_type_hint: None,
        original_size,
        compressed_size,
        checksum,
        block_count: 1,
        has_block_table: false,
        hardcore_tag: None,
    })
}

fn parse_v4(data: &[u8]) -> Result<CompressedContainer, ContainerError> {
    let mut r = Cursor::new(data);
    r.set_position(5);
    let algorithm       = algorithm_field(field(r.read_u8(), "algorithm")?)?;
    let level           = field(r.read_u8(), "level")?;
    let file_type       = field(r.read_u8(), "file_type")?;
    let original_size   = field(r.read_u64::<BigEndian>(), "original_size")?;
    let compressed_size = field(r.read_u64::<BigEndian>(), "compressed_size")?;
    let block_count     = field(r.read_u32::<BigEndian>(), "block_count")?;

    let has_block_table = data.get(V4_FIXED_LEN..V4_FIXED_LEN + 4) == Some(&BLOCK_MARKER[..]);

    Ok(CompressedContainer {
        kind: ContainerKind::V4,
        magic: COMP_MAGIC_U32,
        version: 4,
        algorithm,
        level,
        file_type_hint: Some(file_type),
        original_size,
        compressed_size,
        checksum: 0,
        block_count,
        has_block_table,
        hardcore_tag: None,
    })
}

fn parse_hardcore(data: &[u8]) -> CompressedContainer {
    CompressedContainer {
        kind: ContainerKind::Hardcore,
        magic: HARDCORE_MAGIC_U32,
        version: 0,
        algorithm: AlgorithmId::Hardcore,
        level: 0,
        file_type_hint: None,
        original_size: LittleEndian::read_u32(&data[4..8]) as u64,
        compressed_size: (data.len() - HARDCORE_HEADER_LEN) as u64,
        checksum: 0,
        block_count: 1,
        has_block_table: false,
        hardcore_tag: Some(data[3]),
    }
}

/// Serialise a V4 header to its 64-byte on-disk form.
pub fn encode_header(header: &CompressedContainer) -> Result<[u8; V4_HEADER_LEN], ContainerError> {
    if header.kind != ContainerKind::V4 {
        return Err(ContainerError::Unencodable("only V4 headers can be written"));
    }
    let algorithm = header
        .algorithm
        .id()
        .ok_or(ContainerError::Unencodable("algorithm has no on-disk id"))?;

    let mut buf = [0u8; V4_HEADER_LEN];
    buf[0..4].copy_from_slice(&COMP_MAGIC);
    buf[4] = 4;
    buf[5] = algorithm;
    buf[6] = header.level;
    buf[7] = header.file_type_hint.unwrap_or(crate::filetype::HINT_UNKNOWN);
    BigEndian::write_u64(&mut buf[8..16], header.original_size);
    BigEndian::write_u64(&mut buf[16..24], header.compressed_size);
    BigEndian::write_u32(&mut buf[24..28], header.block_count);
    if header.has_block_table {
        buf[28..32].copy_from_slice(&BLOCK_MARKER);
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v3_bytes(algorithm: u8, orig: u64, comp: u64, crc: u32) -> Vec<u8> {
        let mut v = b"COMP".to_vec();
        v.push(3);
        v.push(algorithm);
        v.extend_from_slice(&orig.to_ne_bytes());
        v.extend_from_slice(&comp.to_ne_bytes());
        v.extend_from_slice(&crc.to_ne_bytes());
        v
    }

    #[test]
    fn short_input_rejected_first() {
        // Even a valid-looking magic is not inspected below 16 bytes.
        let data = b"COMP\x04\x01\x00\x00\x00\x00";
        assert_eq!(parse_header(data), Err(ContainerError::InvalidFileSize(10)));
    }

    #[test]
    fn unsupported_version() {
        let mut data = vec![0u8; 64];
        data[..4].copy_from_slice(b"COMP");
        for v in [0u8, 1, 2, 5, 255] {
            data[4] = v;
            assert_eq!(parse_header(&data), Err(ContainerError::UnsupportedVersion(v)));
        }
    }

    #[test]
    fn bad_magic() {
        let data = [0x50u8; 32];
        assert!(matches!(parse_header(&data), Err(ContainerError::InvalidMagic { found }) if found == "50505050"));
    }

    #[test]
    fn v4_with_block_marker() {
        let mut h = CompressedContainer::new_v4(AlgorithmId::Blockwise, 6, 0, 1000, 400);
        h.block_count = 3;
        h.has_block_table = true;
        let bytes = encode_header(&h).unwrap();
        assert_eq!(&bytes[28..32], b"BLK4");
        let parsed = parse_header(&bytes).unwrap();
        assert!(parsed.has_block_table);
        assert_eq!(parsed.block_count, 3);
        assert!(parsed.is_blockwise());
        assert_eq!(parsed, h);
    }

    #[test]
    fn v4_fields_are_big_endian() {
        let h = CompressedContainer::new_v4(AlgorithmId::Lz77, 1, 6, 0x0102, 0x0304);
        let b = encode_header(&h).unwrap();
        assert_eq!(&b[8..16], &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(&b[16..24], &[0, 0, 0, 0, 0, 0, 3, 4]);
        assert_eq!(&b[24..28], &[0, 0, 0, 1]);
        assert!(!parse_header(&b).unwrap().has_block_table);
    }

    #[test]
    fn v4_short_fixed_fields() {
        let mut data = vec![0u8; 20];
        data[..4].copy_from_slice(b"COMP");
        data[4] = 4;
        data[5] = 1;
        assert_eq!(parse_header(&data), Err(ContainerError::CorruptedHeader("compressed_size")));
    }

    #[test]
    fn v3_native_order() {
        let data = v3_bytes(1, 10, 8, 0xDEADBEEF);
        let h = parse_header(&data).unwrap();
        assert_eq!(h.kind, ContainerKind::V3);
        assert_eq!(h.algorithm, AlgorithmId::Lz77);
        assert_eq!(h.original_size, 10);
        assert_eq!(h.compressed_size, 8);
        assert_eq!(h.checksum, 0xDEADBEEF);
        assert_eq!(h.block_count, 1);
        assert!(encode_header(&h).is_err());
    }

    #[test]
    fn v3_missing_checksum() {
        let mut data = v3_bytes(0, 1, 1, 0);
        data.truncate(24);
        assert_eq!(parse_header(&data), Err(ContainerError::CorruptedHeader("checksum")));
    }

    #[test]
    fn unknown_algorithm_rejected() {
        let data = v3_bytes(42, 1, 1, 0);
        assert_eq!(parse_header(&data), Err(ContainerError::InvalidAlgorithm(42)));
    }

    #[test]
    fn hardcore_header() {
        let mut data = vec![0xAD, 0xEF, 0x01, 0x03, 0x10, 0x27, 0x00, 0x00];
        data.extend_from_slice(&[0u8; 12]);
        let h = parse_header(&data).unwrap();
        assert_eq!(h.kind, ContainerKind::Hardcore);
        assert_eq!(h.original_size, 10_000);
        assert_eq!(h.compressed_size, 12);
        assert_eq!(h.hardcore_tag, Some(3));
        assert_eq!(h.payload_range(data.len()).unwrap(), 0..20);
    }

    #[test]
    fn payload_range_checks_extent() {
        let h = CompressedContainer::new_v4(AlgorithmId::Lz77, 0, 0, 10, 20);
        assert_eq!(h.payload_range(84).unwrap(), 64..84);
        assert_eq!(h.payload_range(90).unwrap(), 64..84);
        assert_eq!(
            h.payload_range(70),
            Err(ContainerError::Truncated { needed: 84, available: 70 })
        );
        let placeholder = CompressedContainer::new_v4(AlgorithmId::Lz77, 0, 0, 10, 0);
        assert_eq!(placeholder.payload_range(75).unwrap(), 64..75);
    }

    proptest! {
        #[test]
        fn v4_encode_parse(
            algo in 0u8..8,
            level in any::<u8>(),
            hint in any::<u8>(),
            orig in any::<u64>(),
            comp in any::<u64>(),
            blocks in any::<u32>(),
            table in any::<bool>(),
        ) {
            let mut h = CompressedContainer::new_v4(AlgorithmId::from_id(algo).unwrap(), level, hint, orig, comp);
            h.block_count = blocks;
            h.has_block_table = table;
            let bytes = encode_header(&h).unwrap();
            prop_assert_eq!(parse_header(&bytes).unwrap(), h);
        }
    }
}
