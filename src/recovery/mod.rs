//! Tiered recovery for containers that fail to decode.
//!
//! Strategies run in a fixed order, cheapest first, until one succeeds:
//!
//! | Order | Strategy | Result |
//! |-------|----------|--------|
//! | 1 | `Normal` | full decode with header repair enabled |
//! | 2 | `RawCopy` | always fails; copying undecoded bytes would hide data loss |
//! | 3 | `PartialExtract` | printable ASCII salvaged from the payload |
//!
//! `HeaderRepair` and `ForceAlgorithm` exist so that reports can name them,
//! but the pipeline does not run them. Header repair happens inside `Normal`.
//!
//! Output from `PartialExtract` is not the original file. It is always
//! returned together with the strategy that produced it.

pub mod batch;

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::dispatch::{DecompressOptions, Decoded, Dispatcher};
use crate::error::{CompError, Status};

pub const RAW_COPY_DISABLED: &str = "raw copy fallback is disabled to prevent silent data loss";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecoveryStrategy {
    Normal,
    HeaderRepair,
    RawCopy,
    PartialExtract,
    ForceAlgorithm,
}

impl RecoveryStrategy {
    pub fn description(self) -> &'static str {
        match self {
            RecoveryStrategy::Normal         => "Normal decompression with auto-repair",
            RecoveryStrategy::HeaderRepair   => "Header reconstruction",
            RecoveryStrategy::RawCopy        => "Raw data copy (disabled, decode-only)",
            RecoveryStrategy::PartialExtract => "Partial text extraction",
            RecoveryStrategy::ForceAlgorithm => "Forced algorithm",
        }
    }
}

/// Strategies the pipeline runs, in order.
pub const STRATEGY_ORDER: [RecoveryStrategy; 3] = [
    RecoveryStrategy::Normal,
    RecoveryStrategy::RawCopy,
    RecoveryStrategy::PartialExtract,
];

#[derive(Debug, Clone)]
pub struct RecoveryOptions {
    /// Bytes skipped before partial extraction (the assumed header).
    pub partial_skip:  usize,
    pub partial_chunk: usize,
    /// Extraction stops once this many bytes are collected.
    pub partial_limit: usize,
    /// Extraction succeeds only above this many bytes.
    pub partial_min:   usize,
    pub max_attempts:  usize,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            partial_skip:  64,
            partial_chunk: 8192,
            partial_limit: 10_000,
            partial_min:   50,
            max_attempts:  5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryAttempt {
    pub strategy:   RecoveryStrategy,
    pub status:     Status,
    pub bytes_in:   u64,
    pub bytes_out:  u64,
    pub diagnostic: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    pub input_bytes:     u64,
    pub attempts:        Vec<RecoveryAttempt>,
    pub succeeded:       Option<RecoveryStrategy>,
    pub recovered_bytes: u64,
}

impl RecoveryReport {
    pub fn is_success(&self) -> bool {
        self.succeeded.is_some()
    }

    pub fn summary(&self) -> String {
        match self.succeeded {
            Some(s) => format!(
                "recovered {} of {} bytes via {:?} after {} attempt(s)",
                self.recovered_bytes,
                self.input_bytes,
                s,
                self.attempts.len(),
            ),
            None => format!("all {} recovery attempt(s) failed", self.attempts.len()),
        }
    }
}

#[derive(Debug)]
pub enum RecoveryOutcome {
    /// The container decoded normally; no recovery was needed.
    Decoded(Decoded),
    Recovered {
        data:     Vec<u8>,
        strategy: RecoveryStrategy,
        report:   RecoveryReport,
    },
    Failed(RecoveryReport),
}

impl RecoveryOutcome {
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            RecoveryOutcome::Decoded(d) => Some(&d.data),
            RecoveryOutcome::Recovered { data, .. } => Some(data),
            RecoveryOutcome::Failed(_) => None,
        }
    }

    /// True when the output is the complete original payload.
    pub fn is_exact(&self) -> bool {
        matches!(
            self,
            RecoveryOutcome::Decoded(_)
                | RecoveryOutcome::Recovered { strategy: RecoveryStrategy::Normal, .. }
        )
    }
}

#[inline]
fn is_printable(b: u8) -> bool {
    (32..=126).contains(&b) || matches!(b, b'\n' | b'\r' | b'\t')
}

/// Printable ASCII from `data` after the first `partial_skip` bytes, up to
/// `partial_limit` bytes.
pub fn extract_printable(data: &[u8], options: &RecoveryOptions) -> Vec<u8> {
    let body = data.get(options.partial_skip..).unwrap_or(&[]);
    let mut out = Vec::new();
    for chunk in body.chunks(options.partial_chunk.max(1)) {
        for &b in chunk.iter().filter(|&&b| is_printable(b)) {
            out.push(b);
            if out.len() >= options.partial_limit {
                return out;
            }
        }
    }
    out
}

pub struct RecoveryPipeline<'a> {
    dispatcher: &'a Dispatcher,
    options:    RecoveryOptions,
}

impl<'a> RecoveryPipeline<'a> {
    pub fn new(dispatcher: &'a Dispatcher, options: RecoveryOptions) -> Self {
        Self { dispatcher, options }
    }

    /// Run the strategies in [`STRATEGY_ORDER`] until one succeeds.
    pub fn run(&self, data: &[u8]) -> RecoveryOutcome {
        let mut report = RecoveryReport { input_bytes: data.len() as u64, ..Default::default() };

        for strategy in STRATEGY_ORDER.into_iter().take(self.options.max_attempts) {
            let (result, attempt) = self.attempt(strategy, data);
            log::info!(
                "recovery {:?}: {} ({})",
                strategy,
                attempt.status.name(),
                attempt.diagnostic
            );
            report.attempts.push(attempt);
            if let Some(out) = result {
                report.succeeded = Some(strategy);
                report.recovered_bytes = out.len() as u64;
                return RecoveryOutcome::Recovered { data: out, strategy, report };
            }
        }
        RecoveryOutcome::Failed(report)
    }

    fn attempt(&self, strategy: RecoveryStrategy, data: &[u8]) -> (Option<Vec<u8>>, RecoveryAttempt) {
        let mut attempt = RecoveryAttempt {
            strategy,
            status:     Status::DecompressionError,
            bytes_in:   data.len() as u64,
            bytes_out:  0,
            diagnostic: String::new(),
        };

        let result = match strategy {
            RecoveryStrategy::Normal => {
                let repairing = self.dispatcher.with_options(DecompressOptions {
                    auto_repair: true,
                    ..self.dispatcher.options().clone()
                });
                match repairing.decompress_container(data) {
                    Ok(decoded) if !decoded.data.is_empty() => {
                        attempt.diagnostic = if decoded.repaired {
                            "decoded after header repair".into()
                        } else {
                            "decoded".into()
                        };
                        Some(decoded.data)
                    }
                    Ok(_) => {
                        attempt.diagnostic = "decoder produced no output".into();
                        None
                    }
                    Err(e) => {
                        attempt.status = e.status();
                        attempt.diagnostic = e.to_string();
                        None
                    }
                }
            }
            RecoveryStrategy::RawCopy => {
                attempt.diagnostic = RAW_COPY_DISABLED.into();
                None
            }
            RecoveryStrategy::PartialExtract => {
                let text = extract_printable(data, &self.options);
                if text.len() > self.options.partial_min {
                    attempt.diagnostic = format!("extracted {} printable bytes", text.len());
                    Some(text)
                } else {
                    attempt.diagnostic = "no extractable data found".into();
                    None
                }
            }
            RecoveryStrategy::HeaderRepair | RecoveryStrategy::ForceAlgorithm => {
                attempt.diagnostic = "not run by this pipeline".into();
                None
            }
        };

        if let Some(out) = &result {
            attempt.status = Status::Success;
            attempt.bytes_out = out.len() as u64;
        }
        (result, attempt)
    }
}

/// Decode `data`, escalating to the recovery pipeline only for errors that
/// [`CompError::is_recoverable`] allows. Other errors are returned as-is.
pub fn decompress_with_recovery(
    dispatcher: &Dispatcher,
    data:       &[u8],
    options:    RecoveryOptions,
) -> Result<RecoveryOutcome, CompError> {
    match dispatcher.decompress_container(data) {
        Ok(decoded) => Ok(RecoveryOutcome::Decoded(decoded)),
        Err(e) if e.is_recoverable() => {
            log::info!("decode failed ({e}); trying recovery");
            Ok(RecoveryPipeline::new(dispatcher, options).run(data))
        }
        Err(e) => Err(e),
    }
}

/// File wrapper around [`decompress_with_recovery`]. `output` is written only
/// when some data was decoded or recovered.
pub fn recover_file(
    dispatcher: &Dispatcher,
    input:      &Path,
    output:     &Path,
    options:    RecoveryOptions,
) -> Result<RecoveryOutcome, CompError> {
    let data = fs::read(input)?;
    let outcome = decompress_with_recovery(dispatcher, &data, options)?;
    if let Some(bytes) = outcome.data() {
        fs::write(output, bytes)?;
    }
    Ok(outcome)
}
