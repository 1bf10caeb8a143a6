//! Block table for blockwise V4 containers.
//!
//! When a V4 header carries the `BLK4` marker, the payload starts with:
//!
//! ```text
//! "BTAB" | count:u32 BE | count × descriptor | block payloads...
//! descriptor = algorithm:u8 | level:u8 | original:u32 BE | compressed:u32 BE
//! ```
//!
//! Block payloads follow the last descriptor back to back, in table order.

use std::io::Cursor;

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use serde::Serialize;

use super::ContainerError;
use crate::codec::AlgorithmId;

pub const TABLE_MAGIC:      [u8; 4] = *b"BTAB";
pub const TABLE_HEADER_LEN: usize = 8;
pub const DESCRIPTOR_LEN:   usize = 10;
pub const MAX_BLOCKS:       u32 = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockDescriptor {
    pub algorithm:       AlgorithmId,
    pub level:           u8,
    pub original_size:   u32,
    pub compressed_size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockTable {
    pub blocks: Vec<BlockDescriptor>,
}

impl BlockTable {
    /// Parse the table at the start of `data` and slice out every block
    /// payload. `expected_blocks` is the header's block count.
    pub fn parse(
        data:            &[u8],
        expected_blocks: u32,
    ) -> Result<(BlockTable, Vec<&[u8]>), ContainerError> {
        if data.len() < TABLE_HEADER_LEN {
            return Err(ContainerError::Truncated {
                needed:    TABLE_HEADER_LEN as u64,
                available: data.len() as u64,
            });
        }
        if data[..4] != TABLE_MAGIC {
            return Err(ContainerError::InvalidBlockTable("missing BTAB marker"));
        }
        let count = BigEndian::read_u32(&data[4..8]);
        if count != expected_blocks {
            return Err(ContainerError::BlockCountMismatch { header: expected_blocks, table: count });
        }
        if count == 0 {
            return Err(ContainerError::InvalidBlockTable("no blocks"));
        }
        if count > MAX_BLOCKS {
            return Err(ContainerError::TooManyBlocks(count));
        }

        let table_end = TABLE_HEADER_LEN + count as usize * DESCRIPTOR_LEN;
        if data.len() < table_end {
            return Err(ContainerError::Truncated {
                needed:    table_end as u64,
                available: data.len() as u64,
            });
        }

        let mut r = Cursor::new(&data[TABLE_HEADER_LEN..table_end]);
        let mut blocks = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let read = |e: std::io::Error| {
                log::debug!("block table read: {e}");
                ContainerError::CorruptedHeader("block descriptor")
            };
            let id              = r.read_u8().map_err(read)?;
            let level           = r.read_u8().map_err(read)?;
            let original_size   = r.read_u32::<BigEndian>().map_err(read)?;
            let compressed_size = r.read_u32::<BigEndian>().map_err(read)?;

            let algorithm = AlgorithmId::from_id(id).ok_or(ContainerError::InvalidAlgorithm(id))?;
            if algorithm == AlgorithmId::Blockwise {
                return Err(ContainerError::InvalidBlockTable("nested blockwise block"));
            }
            if original_size == 0 || compressed_size == 0 {
                return Err(ContainerError::InvalidBlockTable("empty block"));
            }
            blocks.push(BlockDescriptor { algorithm, level, original_size, compressed_size });
        }

        let table = BlockTable { blocks };
        let needed = table_end as u64 + table.total_compressed();
        if needed > data.len() as u64 {
            return Err(ContainerError::Truncated { needed, available: data.len() as u64 });
        }

        let mut payloads = Vec::with_capacity(table.blocks.len());
        let mut at = table_end;
        for b in &table.blocks {
            let end = at + b.compressed_size as usize;
            payloads.push(&data[at..end]);
            at = end;
        }
        Ok((table, payloads))
    }

    pub fn total_original(&self) -> u64 {
        self.blocks.iter().map(|b| b.original_size as u64).sum()
    }

    pub fn total_compressed(&self) -> u64 {
        self.blocks.iter().map(|b| b.compressed_size as u64).sum()
    }

    pub fn encoded_len(&self) -> usize {
        TABLE_HEADER_LEN + self.blocks.len() * DESCRIPTOR_LEN
    }

    /// Table bytes (marker, count, descriptors) without the block payloads.
    pub fn encode(&self) -> Result<Vec<u8>, ContainerError> {
        let mut out = vec![0u8; self.encoded_len()];
        out[..4].copy_from_slice(&TABLE_MAGIC);
        BigEndian::write_u32(&mut out[4..8], self.blocks.len() as u32);
        for (i, b) in self.blocks.iter().enumerate() {
            let d = &mut out[TABLE_HEADER_LEN + i * DESCRIPTOR_LEN..][..DESCRIPTOR_LEN];
            d[0] = b
                .algorithm
                .id()
                .ok_or(ContainerError::Unencodable("block algorithm has no on-disk id"))?;
            d[1] = b.level;
            BigEndian::write_u32(&mut d[2..6], b.original_size);
            BigEndian::write_u32(&mut d[6..10], b.compressed_size);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (BlockTable, Vec<u8>) {
        let table = BlockTable {
            blocks: vec![
                BlockDescriptor { algorithm: AlgorithmId::Lz77, level: 1, original_size: 10, compressed_size: 3 },
                BlockDescriptor { algorithm: AlgorithmId::Huffman, level: 0, original_size: 2, compressed_size: 2 },
            ],
        };
        let mut bytes = table.encode().unwrap();
        bytes.extend_from_slice(b"abcXY");
        (table, bytes)
    }

    #[test]
    fn parse_slices_payloads() {
        let (table, bytes) = sample();
        let (parsed, payloads) = BlockTable::parse(&bytes, 2).unwrap();
        assert_eq!(parsed, table);
        assert_eq!(payloads, vec![&b"abc"[..], &b"XY"[..]]);
        assert_eq!(parsed.total_original(), 12);
        assert_eq!(parsed.total_compressed(), 5);
    }

    #[test]
    fn count_must_match_header() {
        let (_, bytes) = sample();
        assert_eq!(
            BlockTable::parse(&bytes, 3),
            Err(ContainerError::BlockCountMismatch { header: 3, table: 2 })
        );
    }

    #[test]
    fn truncated_payload() {
        let (_, bytes) = sample();
        let cut = &bytes[..bytes.len() - 1];
        assert!(matches!(BlockTable::parse(cut, 2), Err(ContainerError::Truncated { .. })));
    }

    #[test]
    fn rejects_bad_descriptors() {
        let (_, mut bytes) = sample();
        bytes[TABLE_HEADER_LEN] = 255;
        assert_eq!(
            BlockTable::parse(&bytes, 2),
            Err(ContainerError::InvalidBlockTable("nested blockwise block"))
        );
        bytes[TABLE_HEADER_LEN] = 99;
        assert_eq!(BlockTable::parse(&bytes, 2), Err(ContainerError::InvalidAlgorithm(99)));
    }

    #[test]
    fn missing_marker() {
        let (_, mut bytes) = sample();
        bytes[0] = b'X';
        assert_eq!(
            BlockTable::parse(&bytes, 2),
            Err(ContainerError::InvalidBlockTable("missing BTAB marker"))
        );
    }
}
