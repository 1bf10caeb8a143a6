//! Content sniffing used to pick an algorithm when a container does not name
//! one.

use serde::Serialize;

/// Bytes inspected by [`detect_file_type`].
pub const SAMPLE_SIZE: usize = 1024;

/// File-type hint written into V4 headers when the type is unknown.
pub const HINT_UNKNOWN: u8 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FileType {
    Text,
    Csv,
    Json,
    Xml,
    Pdf,
    Docx,
    Audio,
    Image,
    Binary,
    Unknown,
}

impl FileType {
    /// Map a V4 file-type hint byte.
    pub fn from_hint(hint: u8) -> Self {
        match hint {
            0          => FileType::Text,
            1          => FileType::Pdf,
            2          => FileType::Docx,
            3          => FileType::Xml,
            4          => FileType::Audio,
            5          => FileType::Csv,
            6          => FileType::Json,
            7..=10     => FileType::Image,
            _          => FileType::Unknown,
        }
    }

    pub fn hint(self) -> u8 {
        match self {
            FileType::Text  => 0,
            FileType::Pdf   => 1,
            FileType::Docx  => 2,
            FileType::Xml   => 3,
            FileType::Audio => 4,
            FileType::Csv   => 5,
            FileType::Json  => 6,
            FileType::Image => 10,
            FileType::Binary | FileType::Unknown => HINT_UNKNOWN,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FileType::Text    => "text",
            FileType::Csv     => "csv",
            FileType::Json    => "json",
            FileType::Xml     => "xml",
            FileType::Pdf     => "pdf",
            FileType::Docx    => "docx",
            FileType::Audio   => "audio",
            FileType::Image   => "image",
            FileType::Binary  => "binary",
            FileType::Unknown => "unknown",
        }
    }
}

/// Text is anything without control bytes other than `\n\r\t\0`. Bytes
/// above 0x7F are allowed, so UTF-8 and Latin-1 text count.
fn is_text(sample: &[u8]) -> bool {
    sample
        .iter()
        .all(|&b| b >= 0x20 || matches!(b, b'\n' | b'\r' | b'\t' | 0))
}

fn text_subtype(sample: &[u8]) -> FileType {
    let start = sample.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(sample.len());
    let end = sample.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    let trimmed = &sample[start..end];
    match (trimmed.first(), trimmed.last()) {
        (Some(b'{'), Some(b'}')) | (Some(b'['), Some(b']')) => return FileType::Json,
        _ => {}
    }
    if trimmed.starts_with(b"<?xml") {
        return FileType::Xml;
    }
    let head = &sample[..sample.len().min(100)];
    let commas = head.iter().filter(|&&b| b == b',').count();
    if commas > 2 && head.contains(&b'\n') {
        return FileType::Csv;
    }
    FileType::Text
}

fn binary_signature(data: &[u8]) -> FileType {
    const IMAGE: &[&[u8]] = &[b"\x89PNG", b"\xFF\xD8", b"BM", b"GIF8"];
    const AUDIO: &[&[u8]] = &[b"RIFF", b"ID3", b"\xFF\xFB"];

    if data.starts_with(b"%PDF") {
        FileType::Pdf
    } else if data.starts_with(b"PK\x03\x04") {
        FileType::Docx
    } else if IMAGE.iter().any(|sig| data.starts_with(sig)) || is_tga(data) {
        FileType::Image
    } else if AUDIO.iter().any(|sig| data.starts_with(sig)) {
        FileType::Audio
    } else {
        FileType::Binary
    }
}

/// Uncompressed true-colour or grey TGA: no colour map, image type 2 or 3.
fn is_tga(data: &[u8]) -> bool {
    data.len() >= 18 && data[1] == 0 && matches!(data[2], 2 | 3) && matches!(data[16], 8 | 24 | 32)
}

/// Classify `data` from its first [`SAMPLE_SIZE`] bytes.
pub fn detect_file_type(data: &[u8]) -> FileType {
    if data.len() < 4 {
        return FileType::Binary;
    }
    let sample = &data[..data.len().min(SAMPLE_SIZE)];
    if is_text(sample) {
        text_subtype(sample)
    } else {
        binary_signature(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_kinds() {
        assert_eq!(detect_file_type(b"hello world\n"), FileType::Text);
        assert_eq!(detect_file_type(b"  {\"a\": 1}\n"), FileType::Json);
        assert_eq!(detect_file_type(b"[1, 2, 3]"), FileType::Json);
        assert_eq!(detect_file_type(b"<?xml version=\"1.0\"?><a/>"), FileType::Xml);
        assert_eq!(detect_file_type(b"a,b,c\n1,2,3\n"), FileType::Csv);
    }

    #[test]
    fn binary_signatures() {
        assert_eq!(detect_file_type(b"%PDF-1.7\n\x01\x02"), FileType::Pdf);
        assert_eq!(detect_file_type(b"\x89PNG\r\n\x1a\n"), FileType::Image);
        assert_eq!(detect_file_type(b"\xFF\xD8\xFF\xE0\x00\x10JFIF\x00"), FileType::Image);
        assert_eq!(detect_file_type(b"RIFF\x24\x08\x01\x00WAVE"), FileType::Audio);
        assert_eq!(detect_file_type(b"PK\x03\x04\x14\x00"), FileType::Docx);
        assert_eq!(detect_file_type(&[0x00, 0x01, 0x02, 0x03, 0xFE]), FileType::Binary);
    }

    #[test]
    fn csv_needs_commas_near_the_start() {
        let mut prose = b"plain prose line one\n".to_vec();
        prose.extend_from_slice(&[b'x'; 150]);
        prose.extend_from_slice(b" see a, b, c, d and e");
        assert_eq!(detect_file_type(&prose), FileType::Text);
    }

    #[test]
    fn non_ascii_text_is_text() {
        assert_eq!(detect_file_type("café crème brûlée is a dessert served cold".as_bytes()), FileType::Text);
        assert_eq!(detect_file_type(b"na\xEFve r\xE9sum\xE9 in Latin-1\n"), FileType::Text);
        assert_eq!(detect_file_type(b"caf\xC3\xA9\x01\x02"), FileType::Binary);
    }

    #[test]
    fn tiny_inputs_are_binary() {
        assert_eq!(detect_file_type(b"abc"), FileType::Binary);
    }

    #[test]
    fn hints() {
        assert_eq!(FileType::from_hint(6), FileType::Json);
        assert_eq!(FileType::from_hint(8), FileType::Image);
        assert_eq!(FileType::from_hint(200), FileType::Unknown);
        for t in [FileType::Text, FileType::Csv, FileType::Json, FileType::Xml, FileType::Pdf, FileType::Docx, FileType::Audio, FileType::Image] {
            assert_eq!(FileType::from_hint(t.hint()), t);
        }
    }
}
