//! Read-only container introspection.
//!
//! The analyzer reads at most [`V4_HEADER_LEN`] bytes from each file and
//! classifies it without decoding anything:
//!
//! | Class | Condition |
//! |-------|-----------|
//! | `SingleBlock` | valid COMP header, at most one block |
//! | `Blockwise` | valid COMP header, block table with more than one block |
//! | `Hardcore` | Hardcore magic |
//! | `Invalid` | anything else; the parse error is kept |

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::container::{self, ContainerKind, MIN_FILE_SIZE, V4_HEADER_LEN, HARDCORE_HEADER_LEN};

/// Files beyond this count in one directory are not analyzed.
pub const MAX_ANALYSIS_FILES: usize = 1000;

pub const CONTAINER_EXTENSION: &str = "comp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileClass {
    SingleBlock,
    Blockwise,
    Hardcore,
    Invalid,
}

impl FileClass {
    pub fn label(self) -> &'static str {
        match self {
            FileClass::SingleBlock => "single",
            FileClass::Blockwise   => "blockwise",
            FileClass::Hardcore    => "hardcore",
            FileClass::Invalid     => "invalid",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileAnalysis {
    pub path:            PathBuf,
    pub file_size:       u64,
    pub class:           FileClass,
    pub kind:            Option<ContainerKind>,
    pub version:         u8,
    pub algorithm:       Option<&'static str>,
    pub level:           u8,
    pub original_size:   u64,
    pub compressed_size: u64,
    pub ratio:           f64,
    pub block_count:     u32,
    pub error:           Option<String>,
}

impl FileAnalysis {
    fn invalid(path: &Path, file_size: u64, error: String) -> Self {
        Self {
            path: path.to_path_buf(),
            file_size,
            class: FileClass::Invalid,
            kind: None,
            version: 0,
            algorithm: None,
            level: 0,
            original_size: 0,
            compressed_size: 0,
            ratio: 0.0,
            block_count: 0,
            error: Some(error),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.class != FileClass::Invalid
    }
}

/// Classify a header prefix. `file_size` is the size of the whole file;
/// `head` may be shorter.
pub fn analyze_bytes(path: &Path, head: &[u8], file_size: u64) -> FileAnalysis {
    if file_size < MIN_FILE_SIZE as u64 {
        return FileAnalysis::invalid(path, file_size, format!("file too small ({file_size} bytes)"));
    }
    let header = match container::parse_header(head) {
        Ok(h) => h,
        Err(e) => return FileAnalysis::invalid(path, file_size, e.to_string()),
    };

    let class = match header.kind {
        ContainerKind::Hardcore              => FileClass::Hardcore,
        _ if header.is_blockwise()           => FileClass::Blockwise,
        _                                    => FileClass::SingleBlock,
    };
    let compressed_size = if header.kind == ContainerKind::Hardcore {
        file_size.saturating_sub(HARDCORE_HEADER_LEN as u64)
    } else {
        header.compressed_size
    };
    let ratio = if header.original_size == 0 {
        0.0
    } else {
        compressed_size as f64 / header.original_size as f64
    };

    FileAnalysis {
        path: path.to_path_buf(),
        file_size,
        class,
        kind: Some(header.kind),
        version: header.version,
        algorithm: Some(header.algorithm.name()),
        level: header.level,
        original_size: header.original_size,
        compressed_size,
        ratio,
        block_count: header.block_count,
        error: None,
    }
}

fn read_head(path: &Path) -> io::Result<(Vec<u8>, u64)> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    let mut head = Vec::with_capacity(V4_HEADER_LEN);
    file.take(V4_HEADER_LEN as u64).read_to_end(&mut head)?;
    Ok((head, size))
}

/// Analyze one file. I/O failures are reported as an `Invalid` result.
pub fn analyze_file(path: &Path) -> FileAnalysis {
    match read_head(path) {
        Ok((head, size)) => analyze_bytes(path, &head, size),
        Err(e) => FileAnalysis::invalid(path, 0, e.to_string()),
    }
}

fn is_container(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case(CONTAINER_EXTENSION))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisSummary {
    pub directory: PathBuf,
    pub total:     usize,
    pub valid:     usize,
    pub invalid:   usize,
    pub hardcore:  usize,
    pub blockwise: usize,
    /// More container files were present than [`MAX_ANALYSIS_FILES`].
    pub truncated: bool,
    pub files:     Vec<FileAnalysis>,
}

impl AnalysisSummary {
    pub fn from_analyses(directory: &Path, files: Vec<FileAnalysis>) -> Self {
        let mut s = AnalysisSummary { directory: directory.to_path_buf(), ..Default::default() };
        for f in &files {
            s.total += 1;
            match f.class {
                FileClass::Invalid     => s.invalid += 1,
                FileClass::Hardcore    => { s.valid += 1; s.hardcore += 1 }
                FileClass::Blockwise   => { s.valid += 1; s.blockwise += 1 }
                FileClass::SingleBlock => s.valid += 1,
            }
        }
        s.files = files;
        s
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn recommendations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.invalid > 0 {
            out.push(format!("{} file(s) have invalid headers; try `comp recover`", self.invalid));
        }
        if self.hardcore > 0 {
            out.push(format!(
                "{} Hardcore container(s) need an external Hardcore codec to decode",
                self.hardcore
            ));
        }
        if self.blockwise > 0 {
            out.push(format!("{} file(s) use blockwise compression", self.blockwise));
        }
        if self.truncated {
            out.push(format!("only the first {MAX_ANALYSIS_FILES} files were analyzed"));
        }
        out.push("use `comp decompress --auto-repair` for containers with overstated sizes".into());
        out
    }

    /// Plain-text report: summary counts, one row per file, recommendations.
    pub fn render_report(&self) -> String {
        use std::fmt::Write as _;

        let mut r = String::new();
        let _ = writeln!(r, "COMP Container Analysis Report");
        let _ = writeln!(r, "==============================");
        let _ = writeln!(r, "Directory: {}", self.directory.display());
        let _ = writeln!(r, "Generated: {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(r);
        let _ = writeln!(r, "{:<26} {:>12}", "Total files", self.total);
        let _ = writeln!(r, "{:<26} {:>12}", "Valid headers", self.valid);
        let _ = writeln!(r, "{:<26} {:>12}", "Invalid headers", self.invalid);
        let _ = writeln!(r, "{:<26} {:>12}", "Hardcore containers", self.hardcore);
        let _ = writeln!(r, "{:<26} {:>12}", "Blockwise files", self.blockwise);
        let _ = writeln!(r);
        let _ = writeln!(
            r,
            "{:<32} {:<9} {:>3} {:<16} {:>3} {:>12} {:>12} {:>6}",
            "File", "Class", "Ver", "Algorithm", "Lvl", "Original", "Compressed", "Blocks"
        );
        let _ = writeln!(r, "{}", "-".repeat(100));
        for f in &self.files {
            let name = f.path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            let _ = writeln!(
                r,
                "{:<32} {:<9} {:>3} {:<16} {:>3} {:>12} {:>12} {:>6}",
                name,
                f.class.label(),
                f.version,
                f.algorithm.unwrap_or("-"),
                f.level,
                f.original_size,
                f.compressed_size,
                f.block_count,
            );
            if let Some(e) = &f.error {
                let _ = writeln!(r, "    error: {e}");
            }
        }
        let _ = writeln!(r);
        let _ = writeln!(r, "Recommendations");
        let _ = writeln!(r, "---------------");
        for rec in self.recommendations() {
            let _ = writeln!(r, "- {rec}");
        }
        r
    }

    pub fn write_report(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.render_report())
    }
}

/// Analyze every `.comp` file directly inside `dir`, in name order.
pub fn analyze_directory(dir: &Path) -> io::Result<AnalysisSummary> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_container(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let truncated = paths.len() > MAX_ANALYSIS_FILES;
    if truncated {
        log::warn!(
            "{}: {} container files, analyzing the first {MAX_ANALYSIS_FILES}",
            dir.display(),
            paths.len()
        );
        paths.truncate(MAX_ANALYSIS_FILES);
    }

    #[cfg(feature = "parallel")]
    let analyses: Vec<FileAnalysis> = {
        use rayon::prelude::*;
        paths.par_iter().map(|p| analyze_file(p)).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let analyses: Vec<FileAnalysis> = paths.iter().map(|p| analyze_file(p)).collect();

    for a in analyses.iter().filter(|a| !a.is_valid()) {
        log::info!("{}: {}", a.path.display(), a.error.as_deref().unwrap_or("invalid"));
    }

    let mut summary = AnalysisSummary::from_analyses(dir, analyses);
    summary.truncated = truncated;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AlgorithmId;
    use crate::dispatch::Dispatcher;

    #[test]
    fn classifies_headers() {
        let d = Dispatcher::default();
        let single = d.compress_container(b"single block single block", AlgorithmId::Lz77, 2).unwrap();
        let a = analyze_bytes(Path::new("s.comp"), &single, single.len() as u64);
        assert_eq!(a.class, FileClass::SingleBlock);
        assert_eq!(a.algorithm, Some("LZ77"));
        assert_eq!(a.level, 2);
        assert_eq!(a.original_size, 25);

        let blocks = d.compress_blockwise(&[9u8; 5000], 1000, 0).unwrap();
        let a = analyze_bytes(Path::new("b.comp"), &blocks[..64], blocks.len() as u64);
        assert_eq!(a.class, FileClass::Blockwise);
        assert_eq!(a.block_count, 5);

        let mut hc = vec![0xAD, 0xEF, 0x01, 0x00, 100, 0, 0, 0];
        hc.extend_from_slice(&[0u8; 40]);
        let a = analyze_bytes(Path::new("h.comp"), &hc, hc.len() as u64);
        assert_eq!(a.class, FileClass::Hardcore);
        assert_eq!(a.original_size, 100);
        assert_eq!(a.compressed_size, 40);
    }

    #[test]
    fn invalid_headers_keep_the_error() {
        let a = analyze_bytes(Path::new("x.comp"), b"tiny", 4);
        assert_eq!(a.class, FileClass::Invalid);
        assert!(a.error.unwrap().contains("too small"));

        let a = analyze_bytes(Path::new("y.comp"), &[0x55; 32], 32);
        assert_eq!(a.class, FileClass::Invalid);
        assert!(a.error.unwrap().contains("55555555"));
    }

    #[test]
    fn single_block_table_is_not_blockwise() {
        let d = Dispatcher::default();
        let one = d.compress_blockwise(&[1u8; 100], 1000, 0).unwrap();
        let a = analyze_bytes(Path::new("one.comp"), &one, one.len() as u64);
        assert_eq!(a.class, FileClass::SingleBlock);
    }

    #[test]
    fn directory_report() {
        let dir = tempfile::tempdir().unwrap();
        let d = Dispatcher::default();
        fs::write(dir.path().join("a.comp"), d.compress_container(b"aaaa aaaa aaaa", AlgorithmId::Lz77, 0).unwrap()).unwrap();
        fs::write(dir.path().join("B.COMP"), d.compress_blockwise(&[3u8; 3000], 1000, 0).unwrap()).unwrap();
        fs::write(dir.path().join("c.comp"), [0u8; 8]).unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let s = analyze_directory(dir.path()).unwrap();
        assert_eq!((s.total, s.valid, s.invalid, s.blockwise, s.hardcore), (3, 2, 1, 1, 0));
        assert!(!s.truncated);

        let report = s.render_report();
        assert!(report.contains("Generated: "));
        assert!(report.contains("blockwise"));
        assert!(report.contains("1 file(s) have invalid headers"));
        assert!(!report.contains("notes.txt"));

        let json: serde_json::Value = serde_json::from_str(&s.to_json().unwrap()).unwrap();
        assert_eq!(json["total"], 3);
        assert_eq!(json["files"][0]["class"], "Blockwise");

        let out = dir.path().join("report.txt");
        s.write_report(&out).unwrap();
        assert!(fs::read_to_string(out).unwrap().starts_with("COMP Container Analysis Report"));
    }
}
