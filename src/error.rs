//! Caller-facing errors.
//!
//! Each module keeps its own error enum. [`CompError`] folds them into
//! the status categories reported to callers, and [`Status`] names those
//! categories without the payload.

use std::io;

use serde::Serialize;
use thiserror::Error;

use crate::codec::CodecError;
use crate::container::ContainerError;
use crate::lz77::Lz77Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    Success,
    InvalidArgument,
    InvalidMagic,
    UnsupportedVersion,
    CorruptedHeader,
    TruncatedData,
    InvalidAlgorithm,
    DecompressionError,
    IntegrityFailure,
    MemoryError,
    IoError,
}

impl Status {
    pub fn name(self) -> &'static str {
        match self {
            Status::Success            => "success",
            Status::InvalidArgument    => "invalid argument",
            Status::InvalidMagic       => "invalid magic",
            Status::UnsupportedVersion => "unsupported version",
            Status::CorruptedHeader    => "corrupted header",
            Status::TruncatedData      => "truncated data",
            Status::InvalidAlgorithm   => "invalid algorithm",
            Status::DecompressionError => "decompression error",
            Status::IntegrityFailure   => "integrity failure",
            Status::MemoryError        => "memory error",
            Status::IoError            => "I/O error",
        }
    }
}

pub type Result<T> = std::result::Result<T, CompError>;

#[derive(Error, Debug)]
pub enum CompError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid magic number: {0}")]
    InvalidMagic(String),
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u8),
    #[error("Corrupted header: {0}")]
    CorruptedHeader(String),
    #[error("Truncated data: {0}")]
    TruncatedData(String),
    #[error("Invalid algorithm: {0}")]
    InvalidAlgorithm(String),
    #[error("Decompression failed: {0}")]
    Decompression(String),
    /// The decoded output failed a size or checksum check and was discarded.
    #[error("Integrity check failed: {0}")]
    IntegrityFailure(String),
    #[error("Out of memory: {0}")]
    Memory(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl CompError {
    pub fn status(&self) -> Status {
        match self {
            CompError::InvalidArgument(_)    => Status::InvalidArgument,
            CompError::InvalidMagic(_)       => Status::InvalidMagic,
            CompError::UnsupportedVersion(_) => Status::UnsupportedVersion,
            CompError::CorruptedHeader(_)    => Status::CorruptedHeader,
            CompError::TruncatedData(_)      => Status::TruncatedData,
            CompError::InvalidAlgorithm(_)   => Status::InvalidAlgorithm,
            CompError::Decompression(_)      => Status::DecompressionError,
            CompError::IntegrityFailure(_)   => Status::IntegrityFailure,
            CompError::Memory(_)             => Status::MemoryError,
            CompError::Io(_)                 => Status::IoError,
        }
    }

    /// Whether the recovery pipeline may be tried after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.status(),
            Status::InvalidMagic
                | Status::CorruptedHeader
                | Status::TruncatedData
                | Status::DecompressionError
        )
    }
}

impl From<ContainerError> for CompError {
    fn from(e: ContainerError) -> Self {
        match e {
            ContainerError::InvalidFileSize(_) => CompError::InvalidArgument(e.to_string()),
            ContainerError::InvalidMagic { found } => CompError::InvalidMagic(found),
            ContainerError::UnsupportedVersion(v) => CompError::UnsupportedVersion(v),
            ContainerError::InvalidAlgorithm(id) => {
                CompError::InvalidAlgorithm(format!("id {id}"))
            }
            ContainerError::Truncated { .. } => CompError::TruncatedData(e.to_string()),
            ContainerError::Unencodable(_) => CompError::InvalidArgument(e.to_string()),
            ContainerError::CorruptedHeader(_)
            | ContainerError::InvalidBlockTable(_)
            | ContainerError::BlockCountMismatch { .. }
            | ContainerError::TooManyBlocks(_) => CompError::CorruptedHeader(e.to_string()),
        }
    }
}

impl From<Lz77Error> for CompError {
    fn from(e: Lz77Error) -> Self {
        match e {
            Lz77Error::EmptyInput | Lz77Error::InputTooLarge(_) | Lz77Error::SizeLimit { .. } => {
                CompError::InvalidArgument(e.to_string())
            }
            Lz77Error::OutOfMemory(_) => CompError::Memory(e.to_string()),
            _ => CompError::Decompression(e.to_string()),
        }
    }
}

impl From<CodecError> for CompError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Lz77(inner) => inner.into(),
            CodecError::NotACodec { .. }
            | CodecError::NotPluggable { .. }
            | CodecError::EncodeUnsupported { .. } => CompError::InvalidAlgorithm(e.to_string()),
            CodecError::Io(inner) => CompError::Io(inner),
            other => CompError::Decompression(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_set() {
        let recoverable = [
            CompError::InvalidMagic("00".into()),
            CompError::CorruptedHeader("x".into()),
            CompError::TruncatedData("x".into()),
            CompError::Decompression("x".into()),
        ];
        assert!(recoverable.iter().all(|e| e.is_recoverable()));

        let fatal = [
            CompError::InvalidArgument("x".into()),
            CompError::UnsupportedVersion(9),
            CompError::InvalidAlgorithm("x".into()),
            CompError::IntegrityFailure("x".into()),
            CompError::Memory("x".into()),
            CompError::Io(io::Error::new(io::ErrorKind::Other, "x")),
        ];
        assert!(fatal.iter().all(|e| !e.is_recoverable()));
    }

    #[test]
    fn conversions() {
        let e: CompError = ContainerError::UnsupportedVersion(7).into();
        assert_eq!(e.status(), Status::UnsupportedVersion);
        let e: CompError = ContainerError::InvalidFileSize(3).into();
        assert_eq!(e.status(), Status::InvalidArgument);
        let e: CompError = Lz77Error::InvalidFlag(0).into();
        assert_eq!(e.status(), Status::DecompressionError);
        let e: CompError = CodecError::Lz77(Lz77Error::OutOfMemory(9)).into();
        assert_eq!(e.status(), Status::MemoryError);
        let e: CompError = CodecError::Unavailable { algorithm: "Huffman" }.into();
        assert_eq!(e.status(), Status::DecompressionError);
    }
}
