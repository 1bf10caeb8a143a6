//! Directory-wide recovery.
//!
//! Every regular file directly inside the input directory is run through
//! [`decompress_with_recovery`]. Output names tell exact and salvaged data
//! apart:
//!
//! | Outcome | Output file |
//! |---------|-------------|
//! | decoded, or recovered by `Normal` | `<file name>.out` |
//! | recovered by `PartialExtract` | `<file name>.partial.txt` |
//! | failed | none |
//!
//! Output names keep the full input file name, so two inputs that share a
//! stem never write to the same output.
//!
//! Corrupt input never aborts the batch. Only I/O errors on the directories
//! themselves propagate.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{decompress_with_recovery, RecoveryOptions, RecoveryOutcome, RecoveryStrategy};
use crate::dispatch::Dispatcher;
use crate::error::Status;

#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub input:     PathBuf,
    pub output:    Option<PathBuf>,
    pub status:    Status,
    pub strategy:  Option<RecoveryStrategy>,
    pub bytes_out: u64,
    pub message:   String,
}

#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub decoded:   usize,
    pub recovered: usize,
    pub partial:   usize,
    pub failed:    usize,
    pub entries:   Vec<BatchEntry>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} file(s): {} decoded, {} recovered, {} partial, {} failed",
            self.total(),
            self.decoded,
            self.recovered,
            self.partial,
            self.failed,
        )
    }
}

fn output_name(input: &Path, partial: bool) -> PathBuf {
    let name = input
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recovered".into());
    let suffix = if partial { "partial.txt" } else { "out" };
    PathBuf::from(format!("{name}.{suffix}"))
}

fn recover_one(
    dispatcher: &Dispatcher,
    input:      &Path,
    out_dir:    &Path,
    options:    &RecoveryOptions,
) -> io::Result<BatchEntry> {
    let mut entry = BatchEntry {
        input:     input.to_path_buf(),
        output:    None,
        status:    Status::Success,
        strategy:  None,
        bytes_out: 0,
        message:   String::new(),
    };

    let data = match fs::read(input) {
        Ok(d) => d,
        Err(e) => {
            entry.status = Status::IoError;
            entry.message = e.to_string();
            return Ok(entry);
        }
    };

    let outcome = match decompress_with_recovery(dispatcher, &data, options.clone()) {
        Ok(o) => o,
        Err(e) => {
            entry.status = e.status();
            entry.message = e.to_string();
            return Ok(entry);
        }
    };

    let (bytes, partial) = match &outcome {
        RecoveryOutcome::Decoded(d) => {
            entry.message = "decoded".into();
            (&d.data, false)
        }
        RecoveryOutcome::Recovered { data, strategy, report } => {
            entry.strategy = Some(*strategy);
            entry.message = report.summary();
            (data, *strategy != RecoveryStrategy::Normal)
        }
        RecoveryOutcome::Failed(report) => {
            entry.status = report
                .attempts
                .first()
                .map_or(Status::DecompressionError, |a| a.status);
            entry.message = report.summary();
            return Ok(entry);
        }
    };

    let out = out_dir.join(output_name(input, partial));
    fs::write(&out, bytes)?;
    entry.bytes_out = bytes.len() as u64;
    entry.output = Some(out);
    Ok(entry)
}

/// Recover every regular file in `dir` into `out_dir`, in name order.
///
/// `progress` is called after each file with `(done, total)`.
pub fn recover_directory<F>(
    dispatcher:   &Dispatcher,
    dir:          &Path,
    out_dir:      &Path,
    options:      &RecoveryOptions,
    mut progress: Option<&mut F>,
) -> io::Result<BatchReport>
where
    F: FnMut(usize, usize),
{
    let mut inputs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            inputs.push(entry.path());
        }
    }
    inputs.sort();
    fs::create_dir_all(out_dir)?;

    let mut report = BatchReport::default();
    let total = inputs.len();
    for (i, input) in inputs.iter().enumerate() {
        let entry = recover_one(dispatcher, input, out_dir, options)?;
        match entry.strategy {
            _ if entry.output.is_none()         => report.failed += 1,
            None                                => report.decoded += 1,
            Some(RecoveryStrategy::Normal)      => report.recovered += 1,
            Some(_)                             => report.partial += 1,
        }
        log::info!("{}: {}", input.display(), entry.message);
        report.entries.push(entry);
        if let Some(cb) = progress.as_mut() {
            cb(i + 1, total);
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AlgorithmId;

    #[test]
    fn mixed_directory() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let d = Dispatcher::default();

        let good = d.compress_container(b"good data good data good data", AlgorithmId::Lz77, 0).unwrap();
        fs::write(input.path().join("a.comp"), &good).unwrap();

        let mut text = vec![0xEEu8; 64];
        text.extend_from_slice(&b"salvageable text, line by line.\n".repeat(4));
        fs::write(input.path().join("b.comp"), &text).unwrap();

        fs::write(input.path().join("c.comp"), [0u8; 200]).unwrap();
        fs::create_dir(input.path().join("nested")).unwrap();

        let mut calls = Vec::new();
        let mut cb = |done: usize, total: usize| calls.push((done, total));
        let report = recover_directory(&d, input.path(), output.path(), &RecoveryOptions::default(), Some(&mut cb)).unwrap();

        assert_eq!(report.total(), 3);
        assert_eq!((report.decoded, report.recovered, report.partial, report.failed), (1, 0, 1, 1));
        assert_eq!(calls, vec![(1, 3), (2, 3), (3, 3)]);

        assert_eq!(fs::read(output.path().join("a.comp.out")).unwrap(), b"good data good data good data");
        let partial = fs::read(output.path().join("b.comp.partial.txt")).unwrap();
        assert!(partial.starts_with(b"salvageable text"));
        assert!(!output.path().join("c.comp.out").exists());
        assert_eq!(report.entries[2].status, Status::InvalidMagic);
        assert!(report.summary().starts_with("3 file(s)"));
    }

    #[test]
    fn shared_stems_get_distinct_outputs() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let d = Dispatcher::default();
        fs::write(input.path().join("report.comp"), d.compress_container(b"first first first", AlgorithmId::Lz77, 0).unwrap()).unwrap();
        fs::write(input.path().join("report.v2"), d.compress_container(b"second second second", AlgorithmId::Lz77, 0).unwrap()).unwrap();

        let report = recover_directory::<fn(usize, usize)>(&d, input.path(), output.path(), &RecoveryOptions::default(), None).unwrap();
        assert_eq!(report.decoded, 2);

        let mut written: Vec<_> = fs::read_dir(output.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        written.sort();
        assert_eq!(written, vec!["report.comp.out", "report.v2.out"]);
        assert_eq!(fs::read(output.path().join("report.comp.out")).unwrap(), b"first first first");
        assert_eq!(fs::read(output.path().join("report.v2.out")).unwrap(), b"second second second");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let out = tempfile::tempdir().unwrap();
        let missing = out.path().join("nope");
        let r = recover_directory::<fn(usize, usize)>(&Dispatcher::default(), &missing, out.path(), &RecoveryOptions::default(), None);
        assert!(r.is_err());
    }
}
