pub mod error;
pub mod integrity;
pub mod buffer;
pub mod bitio;
pub mod lz77;
pub mod container;
pub mod codec;
pub mod filetype;
pub mod dispatch;
pub mod recovery;
pub mod analyzer;

pub use error::{CompError, Status};
pub use container::{parse_header, CompressedContainer, ContainerKind};
pub use codec::{get_codec, AlgorithmId, Codec, CodecRegistry};
pub use dispatch::{DecompressOptions, Decoded, Dispatcher};
pub use recovery::{decompress_with_recovery, RecoveryOptions, RecoveryOutcome, RecoveryPipeline};
pub use analyzer::{analyze_directory, analyze_file, AnalysisSummary, FileAnalysis};

/// Built-in checks for the CRC table, the bit reader and the LZ77 codec.
pub fn self_test() -> Vec<(&'static str, bool)> {
    let sample = b"self-test self-test self-test payload";
    let lz77_ok = lz77::compress(sample)
        .and_then(|packed| lz77::decompress(&packed))
        .map_or(false, |out| out == sample);
    vec![
        ("crc32", integrity::self_test()),
        ("bitio", bitio::self_test()),
        ("lz77", lz77_ok),
    ]
}
