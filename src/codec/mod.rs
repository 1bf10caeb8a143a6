//! Algorithm identities and the codec registry.
//!
//! # Identity rules
//! Every container names its payload algorithm with a single byte:
//!
//! | Id | Algorithm | Decoder in this crate |
//! |----|-----------|-----------------------|
//! | 0 | Huffman | external slot |
//! | 1 | LZ77 | [`Lz77Codec`] |
//! | 2 | LZW | external slot |
//! | 3 | RLE | [`RleCodec`], always fails |
//! | 4 | BWT+MTF+Huffman | external slot |
//! | 5 | Hardcore | external slot |
//! | 6 | Audio advanced | [`PassThroughCodec`] unless replaced |
//! | 7 | Image advanced | [`PassThroughCodec`] unless replaced |
//! | 255 | Blockwise | not a codec; the payload is a block table |
//!
//! External slots have no built-in implementation. A caller may register one
//! through [`CodecRegistry`]; without it, decoding fails with
//! [`CodecError::Unavailable`]. A reader never substitutes another codec.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::lz77::{self, Lz77Error};

// ── AlgorithmId ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AlgorithmId {
    Huffman,
    Lz77,
    Lzw,
    Rle,
    BwtMtfHuffman,
    Hardcore,
    AudioAdvanced,
    ImageAdvanced,
    Blockwise,
    /// No algorithm recorded; the dispatcher picks one from the file type.
    Unknown,
}

impl AlgorithmId {
    pub const ALL: [AlgorithmId; 9] = [
        AlgorithmId::Huffman,
        AlgorithmId::Lz77,
        AlgorithmId::Lzw,
        AlgorithmId::Rle,
        AlgorithmId::BwtMtfHuffman,
        AlgorithmId::Hardcore,
        AlgorithmId::AudioAdvanced,
        AlgorithmId::ImageAdvanced,
        AlgorithmId::Blockwise,
    ];

    /// On-disk id byte. `Unknown` has none.
    pub fn id(self) -> Option<u8> {
        match self {
            AlgorithmId::Huffman       => Some(0),
            AlgorithmId::Lz77          => Some(1),
            AlgorithmId::Lzw           => Some(2),
            AlgorithmId::Rle           => Some(3),
            AlgorithmId::BwtMtfHuffman => Some(4),
            AlgorithmId::Hardcore      => Some(5),
            AlgorithmId::AudioAdvanced => Some(6),
            AlgorithmId::ImageAdvanced => Some(7),
            AlgorithmId::Blockwise     => Some(255),
            AlgorithmId::Unknown       => None,
        }
    }

    /// Returns `None` for ids this build does not know.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.id() == Some(id))
    }

    pub fn name(self) -> &'static str {
        match self {
            AlgorithmId::Huffman       => "Huffman",
            AlgorithmId::Lz77          => "LZ77",
            AlgorithmId::Lzw           => "LZW",
            AlgorithmId::Rle           => "RLE",
            AlgorithmId::BwtMtfHuffman => "BWT+MTF+Huffman",
            AlgorithmId::Hardcore      => "Hardcore",
            AlgorithmId::AudioAdvanced => "Audio Advanced",
            AlgorithmId::ImageAdvanced => "Image Advanced",
            AlgorithmId::Blockwise     => "Blockwise",
            AlgorithmId::Unknown       => "Unknown",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "huffman"               => Some(AlgorithmId::Huffman),
            "lz77"                  => Some(AlgorithmId::Lz77),
            "lzw"                   => Some(AlgorithmId::Lzw),
            "rle"                   => Some(AlgorithmId::Rle),
            "bwt" | "bwt+mtf+huffman" => Some(AlgorithmId::BwtMtfHuffman),
            "hardcore"              => Some(AlgorithmId::Hardcore),
            "audio"                 => Some(AlgorithmId::AudioAdvanced),
            "image"                 => Some(AlgorithmId::ImageAdvanced),
            "blockwise"             => Some(AlgorithmId::Blockwise),
            _                       => None,
        }
    }

    /// Slots whose implementation may be supplied from outside the crate.
    pub fn is_pluggable(self) -> bool {
        matches!(
            self,
            AlgorithmId::Huffman
                | AlgorithmId::Lzw
                | AlgorithmId::BwtMtfHuffman
                | AlgorithmId::Hardcore
                | AlgorithmId::AudioAdvanced
                | AlgorithmId::ImageAdvanced
        )
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("LZ77: {0}")]
    Lz77(#[from] Lz77Error),
    /// No implementation is available for an external slot. Decoding MUST
    /// NOT continue with a different codec.
    #[error("No {algorithm} codec is available in this build")]
    Unavailable { algorithm: &'static str },
    #[error("{algorithm} does not support encoding")]
    EncodeUnsupported { algorithm: &'static str },
    #[error("{algorithm} is not a codec")]
    NotACodec { algorithm: &'static str },
    #[error("Cannot register a codec for the {algorithm} slot")]
    NotPluggable { algorithm: &'static str },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn algorithm(&self) -> AlgorithmId;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;

    fn compress(&self, _data: &[u8], _level: u8) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::EncodeUnsupported { algorithm: self.algorithm().name() })
    }
}

// ── Built-in codec implementations ──────────────────────────────────────────

pub struct Lz77Codec {
    /// Streams declaring more output than this are refused before allocation.
    pub max_output: u64,
}

impl Default for Lz77Codec {
    fn default() -> Self {
        Self { max_output: u32::MAX as u64 }
    }
}

impl Codec for Lz77Codec {
    fn algorithm(&self) -> AlgorithmId { AlgorithmId::Lz77 }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(lz77::decompress_with_limit(data, self.max_output)?)
    }

    fn compress(&self, data: &[u8], _level: u8) -> Result<Vec<u8>, CodecError> {
        Ok(lz77::compress(data)?)
    }
}

/// RLE has no decoder.
pub struct RleCodec;
impl Codec for RleCodec {
    fn algorithm(&self) -> AlgorithmId { AlgorithmId::Rle }
    fn decompress(&self, _data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Decompression("RLE decoding is not supported".into()))
    }
}

/// Identity placeholder for the audio and image slots.
pub struct PassThroughCodec {
    algorithm: AlgorithmId,
}

impl PassThroughCodec {
    pub fn new(algorithm: AlgorithmId) -> Self {
        Self { algorithm }
    }
}

impl Codec for PassThroughCodec {
    fn algorithm(&self) -> AlgorithmId { self.algorithm }
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
    fn compress(&self, data: &[u8], _: u8) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
}

/// Stands in for an external slot nobody has filled.
pub struct UnavailableCodec {
    algorithm: AlgorithmId,
}

impl UnavailableCodec {
    pub fn new(algorithm: AlgorithmId) -> Self {
        Self { algorithm }
    }
}

impl Codec for UnavailableCodec {
    fn algorithm(&self) -> AlgorithmId { self.algorithm }
    fn decompress(&self, _data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Unavailable { algorithm: self.algorithm.name() })
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve an algorithm to its built-in codec.
///
/// `Blockwise` and `Unknown` have no codec and return
/// [`CodecError::NotACodec`].
pub fn get_codec(id: AlgorithmId) -> Result<Box<dyn Codec>, CodecError> {
    match id {
        AlgorithmId::Lz77 => Ok(Box::new(Lz77Codec::default())),
        AlgorithmId::Rle  => Ok(Box::new(RleCodec)),
        AlgorithmId::AudioAdvanced | AlgorithmId::ImageAdvanced => {
            Ok(Box::new(PassThroughCodec::new(id)))
        }
        AlgorithmId::Huffman
        | AlgorithmId::Lzw
        | AlgorithmId::BwtMtfHuffman
        | AlgorithmId::Hardcore => Ok(Box::new(UnavailableCodec::new(id))),
        AlgorithmId::Blockwise | AlgorithmId::Unknown => {
            Err(CodecError::NotACodec { algorithm: id.name() })
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Built-in codecs plus caller-supplied implementations for external slots.
///
/// Registered codecs must be safe to call concurrently; the registry hands
/// out shared references.
#[derive(Default, Clone)]
pub struct CodecRegistry {
    external: HashMap<AlgorithmId, Arc<dyn Codec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `codec` for its own algorithm slot, replacing any earlier one.
    pub fn register(&mut self, codec: Arc<dyn Codec>) -> Result<(), CodecError> {
        let id = codec.algorithm();
        if !id.is_pluggable() {
            return Err(CodecError::NotPluggable { algorithm: id.name() });
        }
        log::debug!("registered external {} codec", id.name());
        self.external.insert(id, codec);
        Ok(())
    }

    pub fn is_registered(&self, id: AlgorithmId) -> bool {
        self.external.contains_key(&id)
    }

    pub fn resolve(&self, id: AlgorithmId) -> Result<Arc<dyn Codec>, CodecError> {
        match self.external.get(&id) {
            Some(codec) => Ok(Arc::clone(codec)),
            None => Ok(Arc::from(get_codec(id)?)),
        }
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.external.keys().map(|a| a.name()).collect();
        names.sort_unstable();
        f.debug_struct("CodecRegistry").field("external", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ReverseCodec;
    impl Codec for ReverseCodec {
        fn algorithm(&self) -> AlgorithmId { AlgorithmId::Huffman }
        fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
            Ok(data.iter().rev().copied().collect())
        }
    }

    #[test]
    fn id_table() {
        for a in AlgorithmId::ALL {
            let id = a.id().unwrap();
            assert_eq!(AlgorithmId::from_id(id), Some(a));
        }
        assert_eq!(AlgorithmId::from_id(4), Some(AlgorithmId::BwtMtfHuffman));
        assert_eq!(AlgorithmId::from_id(255), Some(AlgorithmId::Blockwise));
        assert_eq!(AlgorithmId::from_id(8), None);
        assert_eq!(AlgorithmId::Unknown.id(), None);
        assert_eq!(AlgorithmId::from_name("LZ77"), Some(AlgorithmId::Lz77));
    }

    #[test]
    fn rle_always_fails() {
        let c = get_codec(AlgorithmId::Rle).unwrap();
        assert!(matches!(c.decompress(b"abc"), Err(CodecError::Decompression(_))));
    }

    #[test]
    fn placeholders_are_identity() {
        for a in [AlgorithmId::AudioAdvanced, AlgorithmId::ImageAdvanced] {
            let c = get_codec(a).unwrap();
            assert_eq!(c.decompress(b"pcm").unwrap(), b"pcm");
        }
    }

    #[test]
    fn external_slots_fail_hard() {
        let c = get_codec(AlgorithmId::Huffman).unwrap();
        assert!(matches!(c.decompress(b"x"), Err(CodecError::Unavailable { algorithm: "Huffman" })));
        assert!(matches!(c.compress(b"x", 0), Err(CodecError::EncodeUnsupported { .. })));
        assert!(matches!(get_codec(AlgorithmId::Blockwise), Err(CodecError::NotACodec { .. })));
        assert!(matches!(get_codec(AlgorithmId::Unknown), Err(CodecError::NotACodec { .. })));
    }

    #[test]
    fn registry_overrides_external_slot() {
        let mut reg = CodecRegistry::new();
        assert!(!reg.is_registered(AlgorithmId::Huffman));
        reg.register(Arc::new(ReverseCodec)).unwrap();
        assert!(reg.is_registered(AlgorithmId::Huffman));
        assert_eq!(reg.resolve(AlgorithmId::Huffman).unwrap().decompress(b"abc").unwrap(), b"cba");
        // Other slots still resolve to built-ins.
        assert_eq!(reg.resolve(AlgorithmId::Lz77).unwrap().algorithm(), AlgorithmId::Lz77);
    }

    #[test]
    fn builtin_slots_not_pluggable() {
        struct FakeLz77;
        impl Codec for FakeLz77 {
            fn algorithm(&self) -> AlgorithmId { AlgorithmId::Lz77 }
            fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> { Ok(data.to_vec()) }
        }
        let mut reg = CodecRegistry::new();
        assert!(matches!(reg.register(Arc::new(FakeLz77)), Err(CodecError::NotPluggable { .. })));
    }

    #[test]
    fn lz77_codec_roundtrip() {
        let c = Lz77Codec::default();
        let packed = c.compress(b"abcabcabcabc", 0).unwrap();
        assert_eq!(c.decompress(&packed).unwrap(), b"abcabcabcabc");
    }
}
