//! Parses a single LSML document and reports every recoverable parse error
//! found, writing the canonical re-serialization to stdout.
//!
//! Grounded on `original_source/c/lsml_check.c`'s `main`: one file (or
//! stdin), an optional explicit memory capacity, and an exit code equal to
//! the most recent parse error encountered (`0` if the parse was clean).

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lsml::io::{from_io, to_io};
use lsml::{parser, Abort, Data, LsmlError};

/// Parse an LSML document and report every recoverable error found.
#[derive(Parser, Debug)]
#[command(name = "lsml-check", author, version, about, long_about = None)]
struct Args {
    /// File to read. Omit to read from stdin.
    file: Option<PathBuf>,

    /// Arena capacity in bytes (default: 16 MiB).
    mem_cap: Option<u64>,

    /// Escape every non-ASCII byte in the output as `\uHHHH`/`\UHHHHHHHH`.
    #[arg(long)]
    ascii: bool,

    /// Enable debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

const DEFAULT_MEM_CAP: u64 = 16 * 1024 * 1024;

fn init_logging(verbose: bool) {
    let filter = EnvFilter::new(if verbose { "debug" } else { "info" });
    let subscriber = fmt::layer().with_target(false);
    let _ = tracing_subscriber::registry().with(filter).with(subscriber).try_init();
}

/// A stable exit-status mapping for this binary. Not the original's raw
/// `lsml_err_t` integer values (never observed in `original_source/`, which
/// only carries `.c`/`.h` files, not a generated ABI dump) — just a fixed
/// enumeration over `LsmlError`'s variants, in the order they're declared.
fn exit_code(err: LsmlError) -> i32 {
    use LsmlError::*;
    match err {
        OutOfMemory => 1,
        ParseAborted => 2,
        NotFound => 3,
        InvalidData => 4,
        InvalidKey => 5,
        InvalidSection => 6,
        SectionType => 7,
        ValueNull => 8,
        ValueFormat => 9,
        ValueRange => 10,
        MissingEndQuote => 11,
        TextInvalidEscape => 12,
        TextOutsideSection => 13,
        TextAfterEndQuote => 14,
        TextAfterSectionHeader => 15,
        SectionHeaderUnclosed => 16,
        SectionNameEmpty => 17,
        SectionNameReused => 18,
        TableKeyReused => 19,
        TableEntryMissingEquals => 20,
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mem_cap = args.mem_cap.unwrap_or(DEFAULT_MEM_CAP) as usize;
    let data = Data::new(mem_cap);

    let mut most_recent_err: Option<LsmlError> = None;
    let mut log_err = |err: LsmlError, line: lsml::LineNo| -> Abort {
        error!(line, "LSML parse error: {err}");
        most_recent_err = Some(err);
        Abort::No
    };

    match &args.file {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
            let mut reader = from_io(BufReader::new(file));
            parser::parse(&data, &mut reader, &mut parser::ParseOptions::new(), &mut log_err)
                .with_context(|| format!("parsing {}", path.display()))?;
        }
        None => {
            let stdin = std::io::stdin();
            let mut reader = from_io(stdin.lock());
            parser::parse(&data, &mut reader, &mut parser::ParseOptions::new(), &mut log_err)
                .context("parsing stdin")?;
        }
    }

    let stdout = std::io::stdout();
    let mut writer = to_io(stdout.lock());
    lsml::writer::write_data(&mut writer, &data, args.ascii).context("writing output")?;

    if let Some(err) = most_recent_err {
        std::process::exit(exit_code(err));
    }
    Ok(())
}
