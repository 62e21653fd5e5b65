//! Concatenates one or more LSML documents into a single canonical document
//! on stdout, merging later files' sections/entries into the first.
//!
//! Grounded on `original_source/c/lsml_cat.c`'s `main`: estimate a memory
//! capacity from the input files' total size, parse every file into one
//! `Data`, skipping files that fail to open (logged, not fatal), then write
//! the merged result.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lsml::io::{from_io, to_io};
use lsml::{parser, Abort, Data};

/// Concatenate LSML documents into one canonical document on stdout.
#[derive(Parser, Debug)]
#[command(name = "lsml-cat", author, version, about, long_about = None)]
struct Args {
    /// Files to read. With none given, reads a single document from stdin.
    files: Vec<PathBuf>,

    /// Escape every non-ASCII byte in the output as `\uHHHH`/`\UHHHHHHHH`
    /// rather than passing UTF-8 through verbatim.
    #[arg(long)]
    ascii: bool,

    /// Enable debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::new(if verbose { "debug" } else { "info" });
    let subscriber = fmt::layer().with_target(false);
    let _ = tracing_subscriber::registry().with(filter).with(subscriber).try_init();
}

/// `lsml_cat.c`'s `default_mem_cap`: a conservative fallback capacity for
/// the (unseekable-input, i.e. stdin) case, scaled by pointer width.
fn default_mem_cap() -> usize {
    if cfg!(target_pointer_width = "64") {
        1024 * 1024 * 1024
    } else if cfg!(target_pointer_width = "32") {
        128 * 1024 * 1024
    } else {
        16 * 1024 * 1024
    }
}

/// Estimates a memory capacity generous enough to hold every section/table
/// map/string this input could produce, scaling with each file's byte size
/// the way the original does (`mem_cap += 32 * sizeof(void*) * bytes`).
fn estimate_mem_cap(files: &[PathBuf]) -> usize {
    let mut mem_cap: usize = 4096;
    let per_byte_overhead: usize = 32 * std::mem::size_of::<usize>();
    for path in files {
        match std::fs::metadata(path) {
            Ok(meta) => {
                mem_cap = mem_cap.saturating_add(per_byte_overhead.saturating_mul(meta.len() as usize));
            }
            Err(_) => return default_mem_cap(),
        }
    }
    mem_cap
}

fn log_parse_error(err: lsml::LsmlError, line: lsml::LineNo) -> Abort {
    error!(line, "LSML parse error: {err}");
    Abort::No
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mem_cap = if args.files.is_empty() {
        default_mem_cap()
    } else {
        estimate_mem_cap(&args.files)
    };
    let data = Data::new(mem_cap);
    let mut options = parser::ParseOptions::new();

    if args.files.is_empty() {
        let stdin = std::io::stdin();
        let mut reader = from_io(stdin.lock());
        parser::parse(&data, &mut reader, &mut options, log_parse_error)
            .context("parsing stdin")?;
    } else {
        for path in &args.files {
            let bytes_reader = match File::open(path) {
                Ok(f) => BufReader::new(f),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let mut reader = from_io(bytes_reader);
            parser::parse(&data, &mut reader, &mut options, log_parse_error)
                .with_context(|| format!("parsing {}", path.display()))?;
        }
    }

    let stdout = std::io::stdout();
    let mut writer = to_io(stdout.lock());
    lsml::writer::write_data(&mut writer, &data, args.ascii).context("writing output")?;

    Ok(())
}
