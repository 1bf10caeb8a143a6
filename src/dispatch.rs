//! Algorithm dispatch: from container bytes to decoded output.
//!
//! [`Dispatcher::decompress_container`] is the main entry point:
//!
//! 1. parse the header ([`container::parse_header`])
//! 2. locate the payload and check the declared extent
//! 3. pick the algorithm ([`select_algorithm`])
//! 4. run the codec, or walk the block table for blockwise containers
//! 5. validate the output against the header
//!
//! Validation failures discard the output. Callers never receive partially
//! decoded data.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;

use crate::codec::{AlgorithmId, Codec, CodecRegistry, Lz77Codec};
use crate::container::{
    self, BlockDescriptor, BlockTable, CompressedContainer, ContainerError, ContainerKind,
};
use crate::error::{CompError, Result};
use crate::filetype::{detect_file_type, FileType};
use crate::integrity;

/// Largest output the dispatcher will allocate for.
pub const DEFAULT_MAX_OUTPUT: u64 = 512 * 1024 * 1024;

/// Default block size for [`Dispatcher::compress_blockwise`].
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DecompressOptions {
    /// When a V4 header overstates `compressed_size`, decode the bytes that
    /// are actually present instead of failing.
    pub auto_repair:      bool,
    /// Check the decoded size and the V3 checksum.
    pub verify_integrity: bool,
    pub max_output_size:  u64,
}

impl Default for DecompressOptions {
    fn default() -> Self {
        Self {
            auto_repair:      false,
            verify_integrity: true,
            max_output_size:  DEFAULT_MAX_OUTPUT,
        }
    }
}

/// Output of a successful container decode.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub header:    CompressedContainer,
    /// Algorithm actually used (`Blockwise` for block-table payloads).
    pub algorithm: AlgorithmId,
    pub data:      Vec<u8>,
    /// The header was repaired before decoding.
    pub repaired:  bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    pub files_processed: u64,
    pub files_succeeded: u64,
    pub files_failed:    u64,
    pub bytes_in:        u64,
    pub bytes_out:       u64,
}

impl ProcessingStats {
    pub fn summary(&self) -> String {
        format!(
            "{} file(s) processed: {} succeeded, {} failed, {} bytes in, {} bytes out",
            self.files_processed, self.files_succeeded, self.files_failed,
            self.bytes_in, self.bytes_out,
        )
    }
}

/// Algorithm for a container: the header's own algorithm when it names one,
/// otherwise a default for the file type.
pub fn select_algorithm(header: &CompressedContainer, file_type: FileType) -> AlgorithmId {
    if header.algorithm != AlgorithmId::Unknown {
        return header.algorithm;
    }
    match file_type {
        FileType::Text | FileType::Csv | FileType::Json | FileType::Xml => AlgorithmId::Huffman,
        FileType::Pdf | FileType::Docx => AlgorithmId::Lz77,
        FileType::Audio   => AlgorithmId::AudioAdvanced,
        FileType::Image   => AlgorithmId::ImageAdvanced,
        FileType::Binary  => AlgorithmId::Hardcore,
        FileType::Unknown => AlgorithmId::Huffman,
    }
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    options:  DecompressOptions,
    registry: CodecRegistry,
    stats:    ProcessingStats,
}

impl Dispatcher {
    pub fn new(options: DecompressOptions) -> Self {
        Self { options, registry: CodecRegistry::new(), stats: ProcessingStats::default() }
    }

    pub fn with_registry(options: DecompressOptions, registry: CodecRegistry) -> Self {
        Self { options, registry, stats: ProcessingStats::default() }
    }

    pub fn options(&self) -> &DecompressOptions {
        &self.options
    }

    pub fn registry(&self) -> &CodecRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &ProcessingStats {
        &self.stats
    }

    /// Same codecs and limits, different options.
    pub fn with_options(&self, options: DecompressOptions) -> Dispatcher {
        Dispatcher { options, registry: self.registry.clone(), stats: ProcessingStats::default() }
    }

    fn codec(&self, algorithm: AlgorithmId) -> Result<Arc<dyn Codec>> {
        match algorithm {
            AlgorithmId::Unknown => Err(CompError::InvalidAlgorithm("no algorithm selected".into())),
            AlgorithmId::Lz77 => Ok(Arc::new(Lz77Codec { max_output: self.options.max_output_size })),
            other => Ok(self.registry.resolve(other)?),
        }
    }

    // ── Decompression ────────────────────────────────────────────────────────

    /// Decode a bare payload with `algorithm`.
    ///
    /// For `Blockwise` the payload is a block table followed by its blocks.
    pub fn decompress(&self, data: &[u8], algorithm: AlgorithmId) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Err(CompError::InvalidArgument("empty input".into()));
        }
        let out = if algorithm == AlgorithmId::Blockwise {
            if data.len() < 8 {
                return Err(ContainerError::Truncated { needed: 8, available: data.len() as u64 }.into());
            }
            self.decode_blocks(data, BigEndian::read_u32(&data[4..8]))?.0
        } else {
            log::debug!("decoding {} bytes with {}", data.len(), algorithm.name());
            self.codec(algorithm)?.decompress(data)?
        };
        if out.is_empty() {
            return Err(CompError::IntegrityFailure(format!(
                "{} produced no output",
                algorithm.name()
            )));
        }
        Ok(out)
    }

    /// Parse, decode and validate a complete container.
    pub fn decompress_container(&self, data: &[u8]) -> Result<Decoded> {
        if data.is_empty() {
            return Err(CompError::InvalidArgument("empty input".into()));
        }
        let header = container::parse_header(data)?;

        let (range, repaired) = match header.payload_range(data.len()) {
            Ok(r) => (r, false),
            Err(ContainerError::Truncated { needed, available })
                if self.options.auto_repair
                    && header.kind == ContainerKind::V4
                    && !header.has_block_table
                    && available > header.header_len() as u64 =>
            {
                log::warn!(
                    "header declares {needed} bytes but only {available} are present; decoding what is there"
                );
                (header.header_len()..data.len(), true)
            }
            Err(e) => return Err(e.into()),
        };
        let payload = &data[range];

        let (out, algorithm) = if header.has_block_table {
            let (out, table) = self.decode_blocks(payload, header.block_count)?;
            if header.compressed_size != 0 && header.compressed_size != table.total_compressed() {
                return Err(CompError::CorruptedHeader(format!(
                    "compressed size {} does not match block table total {}",
                    header.compressed_size,
                    table.total_compressed()
                )));
            }
            (out, AlgorithmId::Blockwise)
        } else {
            let file_type = header
                .file_type_hint
                .map(FileType::from_hint)
                .unwrap_or_else(|| detect_file_type(payload));
            let algorithm = select_algorithm(&header, file_type);
            (self.decompress(payload, algorithm)?, algorithm)
        };

        self.validate(&header, &out)?;
        Ok(Decoded { header, algorithm, data: out, repaired })
    }

    /// Decode every block listed in the table at the start of `section`.
    fn decode_blocks(&self, section: &[u8], expected_blocks: u32) -> Result<(Vec<u8>, BlockTable)> {
        let (table, payloads) = BlockTable::parse(section, expected_blocks)?;
        let total = table.total_original();
        if total > self.options.max_output_size {
            return Err(CompError::InvalidArgument(format!(
                "block table declares {total} bytes, limit is {}",
                self.options.max_output_size
            )));
        }

        let mut out = Vec::new();
        out.try_reserve_exact(total as usize)
            .map_err(|_| CompError::Memory(format!("cannot allocate {total} bytes")))?;

        for (i, (desc, payload)) in table.blocks.iter().zip(payloads).enumerate() {
            let block = self.decode_block(desc, payload).map_err(|e| match e {
                CompError::Decompression(msg) => CompError::Decompression(format!("block {i}: {msg}")),
                other => other,
            })?;
            if block.len() != desc.original_size as usize {
                return Err(CompError::IntegrityFailure(format!(
                    "block {i} decoded to {} bytes, table declares {}",
                    block.len(),
                    desc.original_size
                )));
            }
            out.extend_from_slice(&block);
        }
        log::debug!("decoded {} blocks, {} bytes", table.blocks.len(), out.len());
        Ok((out, table))
    }

    fn decode_block(&self, desc: &BlockDescriptor, payload: &[u8]) -> Result<Vec<u8>> {
        // Huffman blocks that did not shrink are written verbatim.
        if desc.algorithm == AlgorithmId::Huffman && desc.compressed_size == desc.original_size {
            return Ok(payload.to_vec());
        }
        self.decompress(payload, desc.algorithm)
    }

    fn validate(&self, header: &CompressedContainer, out: &[u8]) -> Result<()> {
        if !self.options.verify_integrity {
            return Ok(());
        }
        if header.original_size != 0 && out.len() as u64 != header.original_size {
            log::warn!("size mismatch: decoded {} bytes, header declares {}", out.len(), header.original_size);
            return Err(CompError::IntegrityFailure(format!(
                "decoded {} bytes, header declares {}",
                out.len(),
                header.original_size
            )));
        }
        if header.kind == ContainerKind::V3 && header.checksum != 0 {
            let actual = integrity::calculate(out);
            if actual != header.checksum {
                log::warn!("checksum mismatch: {actual:08x} != {:08x}", header.checksum);
                return Err(CompError::IntegrityFailure(format!(
                    "CRC32 {actual:08x} does not match stored {:08x}",
                    header.checksum
                )));
            }
        }
        Ok(())
    }

    /// Decode `input` and write the result to `output`.
    ///
    /// Nothing is written unless the decode fully succeeds.
    pub fn decompress_file(&mut self, input: &Path, output: &Path) -> Result<Decoded> {
        self.stats.files_processed += 1;
        let result = self.decode_file(input, output);
        match &result {
            Ok(decoded) => {
                self.stats.files_succeeded += 1;
                self.stats.bytes_out += decoded.data.len() as u64;
                log::info!("{} -> {} ({} bytes)", input.display(), output.display(), decoded.data.len());
            }
            Err(e) => {
                self.stats.files_failed += 1;
                log::info!("{}: {e}", input.display());
            }
        }
        result
    }

    fn decode_file(&mut self, input: &Path, output: &Path) -> Result<Decoded> {
        let data = fs::read(input)?;
        self.stats.bytes_in += data.len() as u64;
        let decoded = self.decompress_container(&data)?;
        fs::write(output, &decoded.data)?;
        Ok(decoded)
    }

    // ── Compression ──────────────────────────────────────────────────────────

    /// Encode `data` with `algorithm` (no container).
    pub fn compress(&self, data: &[u8], algorithm: AlgorithmId, level: u8) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Err(CompError::InvalidArgument("empty input".into()));
        }
        if algorithm == AlgorithmId::Blockwise {
            return Err(CompError::InvalidAlgorithm(
                "blockwise output needs a container; use compress_blockwise".into(),
            ));
        }
        Ok(self.codec(algorithm)?.compress(data, level)?)
    }

    /// Encode `data` into a single-block V4 container.
    pub fn compress_container(&self, data: &[u8], algorithm: AlgorithmId, level: u8) -> Result<Vec<u8>> {
        let payload = self.compress(data, algorithm, level)?;
        let header = CompressedContainer::new_v4(
            algorithm,
            level,
            detect_file_type(data).hint(),
            data.len() as u64,
            payload.len() as u64,
        );
        let mut out = container::encode_header(&header)?.to_vec();
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Split `data` into `block_size` blocks, LZ77-encode each, and write a
    /// blockwise V4 container.
    pub fn compress_blockwise(&self, data: &[u8], block_size: usize, level: u8) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Err(CompError::InvalidArgument("empty input".into()));
        }
        if block_size == 0 || u32::try_from(block_size).is_err() {
            return Err(CompError::InvalidArgument(format!("invalid block size {block_size}")));
        }
        let count = data.len().div_ceil(block_size);
        if count > container::block_table::MAX_BLOCKS as usize {
            return Err(CompError::InvalidArgument(format!(
                "{count} blocks exceed the block table limit"
            )));
        }

        let mut table = BlockTable::default();
        let mut payloads = Vec::with_capacity(count);
        for chunk in data.chunks(block_size) {
            let packed = self.compress(chunk, AlgorithmId::Lz77, level)?;
            table.blocks.push(BlockDescriptor {
                algorithm:       AlgorithmId::Lz77,
                level,
                original_size:   chunk.len() as u32,
                compressed_size: packed.len() as u32,
            });
            payloads.push(packed);
        }

        let mut header = CompressedContainer::new_v4(
            AlgorithmId::Blockwise,
            level,
            detect_file_type(data).hint(),
            data.len() as u64,
            table.total_compressed(),
        );
        header.block_count = count as u32;
        header.has_block_table = true;

        let mut out = container::encode_header(&header)?.to_vec();
        out.extend_from_slice(&table.encode()?);
        for p in &payloads {
            out.extend_from_slice(p);
        }
        log::debug!("blockwise: {} bytes in {count} blocks -> {} bytes", data.len(), out.len());
        Ok(out)
    }
}
