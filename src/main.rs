use clap::{ArgAction, Parser, Subcommand};
use compcore::analyzer;
use compcore::codec::AlgorithmId;
use compcore::dispatch::{DecompressOptions, Dispatcher};
use compcore::integrity;
use compcore::recovery::{self, batch, RecoveryOptions, RecoveryOutcome};
use log::LevelFilter;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "comp", about = "COMP container decoder, analyzer and recovery tool")]
struct Cli {
    /// -v for info, -vv for debug
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a V4 container
    Compress {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Algorithm name (only lz77 has a built-in encoder)
        #[arg(short, long, default_value = "lz77")]
        algorithm: String,
        #[arg(short, long, default_value = "0")]
        level: u8,
        /// Write a blockwise container with blocks of this many KiB
        #[arg(long)]
        block_size: Option<usize>,
    },
    /// Decompress a COMP or Hardcore container
    Decompress {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Decode over the bytes present when the header overstates the size
        #[arg(long)]
        auto_repair: bool,
        /// Skip the size and checksum checks
        #[arg(long)]
        no_verify: bool,
        /// Fall back to the recovery pipeline on recoverable errors
        #[arg(long)]
        recover: bool,
    },
    /// Inspect container headers without decoding
    Analyze {
        path: PathBuf,
        /// Write the text report to this file
        #[arg(long)]
        report: Option<PathBuf>,
        /// Print the analysis as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the recovery pipeline over a file or every file in a directory
    Recover {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print the CRC32 of a file
    Crc {
        input: PathBuf,
    },
    /// Run the built-in self-tests
    SelfTest,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.parse_default_env();
    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(buf, "[{}] {}", record.level(), record.args())
    });
    let _ = builder.try_init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {

        // ── Compress ─────────────────────────────────────────────────────────
        Commands::Compress { input, output, algorithm, level, block_size } => {
            let algorithm = AlgorithmId::from_name(&algorithm)
                .ok_or_else(|| format!("unknown algorithm '{algorithm}'"))?;
            let data = std::fs::read(&input)?;
            let dispatcher = Dispatcher::default();
            let packed = match block_size {
                Some(kib) => {
                    if algorithm != AlgorithmId::Lz77 {
                        return Err("blockwise containers are LZ77 only".into());
                    }
                    dispatcher.compress_blockwise(&data, kib * 1024, level)?
                }
                None => dispatcher.compress_container(&data, algorithm, level)?,
            };
            std::fs::write(&output, &packed)?;
            println!(
                "{} -> {} ({} -> {} bytes, {:.1}%)",
                input.display(),
                output.display(),
                data.len(),
                packed.len(),
                packed.len() as f64 / data.len() as f64 * 100.0,
            );
        }

        // ── Decompress ───────────────────────────────────────────────────────
        Commands::Decompress { input, output, auto_repair, no_verify, recover } => {
            let options = DecompressOptions {
                auto_repair,
                verify_integrity: !no_verify,
                ..Default::default()
            };
            let mut dispatcher = Dispatcher::new(options);
            if recover {
                let outcome = recovery::recover_file(&dispatcher, &input, &output, RecoveryOptions::default())?;
                print_outcome(&input, &output, &outcome);
                if matches!(outcome, RecoveryOutcome::Failed(_)) {
                    return Err("recovery failed".into());
                }
            } else {
                let decoded = dispatcher.decompress_file(&input, &output)?;
                println!(
                    "{} -> {} ({}, {} bytes{})",
                    input.display(),
                    output.display(),
                    decoded.algorithm.name(),
                    decoded.data.len(),
                    if decoded.repaired { ", header repaired" } else { "" },
                );
            }
        }

        // ── Analyze ──────────────────────────────────────────────────────────
        Commands::Analyze { path, report, json } => {
            if path.is_dir() {
                let summary = analyzer::analyze_directory(&path)?;
                if json {
                    println!("{}", summary.to_json()?);
                } else {
                    print!("{}", summary.render_report());
                }
                if let Some(report) = report {
                    summary.write_report(&report)?;
                    println!("Report written to {}", report.display());
                }
            } else {
                let a = analyzer::analyze_file(&path);
                if json {
                    println!("{}", serde_json::to_string_pretty(&a)?);
                } else {
                    println!("── {} ─────────────────────────────────────", path.display());
                    println!("  Class           {}", a.class.label());
                    println!("  File size       {} B", a.file_size);
                    if let Some(err) = &a.error {
                        println!("  Error           {err}");
                    } else {
                        println!("  Version         {}", a.version);
                        println!("  Algorithm       {}", a.algorithm.unwrap_or("-"));
                        println!("  Level           {}", a.level);
                        println!("  Original        {} B", a.original_size);
                        println!("  Compressed      {} B", a.compressed_size);
                        println!("  Ratio           {:.3}", a.ratio);
                        println!("  Blocks          {}", a.block_count);
                    }
                }
            }
        }

        // ── Recover ──────────────────────────────────────────────────────────
        Commands::Recover { input, output } => {
            let dispatcher = Dispatcher::default();
            let options = RecoveryOptions::default();
            if input.is_dir() {
                let mut progress = |done: usize, total: usize| {
                    log::info!("[{done}/{total}]");
                };
                let report = batch::recover_directory(&dispatcher, &input, &output, &options, Some(&mut progress))?;
                for e in &report.entries {
                    let name = e.input.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                    println!("  {:<32} {:<20} {}", name, e.status.name(), e.message);
                }
                println!("{}", report.summary());
            } else {
                let outcome = recovery::recover_file(&dispatcher, &input, &output, options)?;
                print_outcome(&input, &output, &outcome);
                if matches!(outcome, RecoveryOutcome::Failed(_)) {
                    return Err("recovery failed".into());
                }
            }
        }

        // ── CRC ──────────────────────────────────────────────────────────────
        Commands::Crc { input } => {
            println!("{:08x}  {}", integrity::calculate_file(&input)?, input.display());
        }

        // ── Self-test ────────────────────────────────────────────────────────
        Commands::SelfTest => {
            let results = compcore::self_test();
            for (name, ok) in &results {
                println!("  {:<8} {}", name, if *ok { "ok" } else { "FAILED" });
            }
            if results.iter().any(|(_, ok)| !ok) {
                return Err("self-test failed".into());
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn print_outcome(input: &Path, output: &Path, outcome: &RecoveryOutcome) {
    match outcome {
        RecoveryOutcome::Decoded(d) => {
            println!("{} -> {} (decoded, {} bytes)", input.display(), output.display(), d.data.len());
        }
        RecoveryOutcome::Recovered { strategy, report, .. } => {
            println!("{} -> {} ({})", input.display(), output.display(), strategy.description());
            println!("  {}", report.summary());
        }
        RecoveryOutcome::Failed(report) => {
            println!("{}: {}", input.display(), report.summary());
            for a in &report.attempts {
                println!("  {:<16} {:<20} {}", format!("{:?}", a.strategy), a.status.name(), a.diagnostic);
            }
        }
    }
}
