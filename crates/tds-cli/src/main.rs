/// `tds`: decode byte streams to UTF-8 text through the streaming decoder.
///
/// # Command overview
///
/// ```text
/// tds <COMMAND> [OPTIONS]
///
/// Commands:
///   decode     Stream a file (or stdin) through the decoder, write UTF-8 text
///   resolve    Show how an encoding label and options are resolved
///   help       Print help information
///
/// Global options:
///   -v, --verbose    Log decoder lifecycle events to stderr
///   -h, --help       Print help
///   -V, --version    Print version
/// ```
///
/// # Logging
///
/// Log output goes to stderr. `TDS_LOG` takes an `EnvFilter` directive
/// (e.g. `TDS_LOG=tds_pipe=trace`) and overrides `--verbose`.
///
/// # Exit codes
///
/// | Code | Meaning                                            |
/// |------|----------------------------------------------------|
/// | 0    | Success                                            |
/// | 1    | Error (I/O failure, unknown label, invalid data)   |
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cmd_decode;
mod cmd_resolve;

// ── CLI root ──────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "tds", version, about = "Streaming text decoder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log decoder lifecycle events (debug level) to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
}

// ── Sub-commands ──────────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum Commands {
    /// Decode a file or stdin to UTF-8 text.
    Decode(DecodeArgs),
    /// Show the resolved encoding name and options for a label.
    Resolve(ResolveArgs),
}

// ── Argument structs ──────────────────────────────────────────────────────────

/// Arguments for `tds decode`.
///
/// ```text
/// ┌───────────────────┬──────────────────────────────────────────────────┐
/// │ Flag              │ Values / default                                 │
/// ├───────────────────┼──────────────────────────────────────────────────┤
/// │ -e / --encoding   │ any Encoding Standard label (default utf-8)      │
/// │ --fatal           │ fail on malformed input instead of U+FFFD        │
/// │ --ignore-bom      │ keep a leading byte-order mark                   │
/// │ --chunk-size      │ bytes per input chunk (default 8192)             │
/// │ --high-water-mark │ unread output chunks before writes wait (1)      │
/// │ --whole           │ decode in a single call instead of streaming     │
/// │ -o / --output     │ write to file instead of stdout                  │
/// └───────────────────┴──────────────────────────────────────────────────┘
/// ```
#[derive(clap::Args)]
pub struct DecodeArgs {
    /// Input file, or `-` for stdin.
    pub file: PathBuf,

    /// Encoding label of the input.
    #[arg(short, long, default_value = tds_decoder::DEFAULT_LABEL)]
    pub encoding: String,

    /// Fail on the first malformed sequence.
    #[arg(long)]
    pub fatal: bool,

    /// Keep a leading byte-order mark in the output.
    #[arg(long)]
    pub ignore_bom: bool,

    /// Size of each chunk read from the input, in bytes.
    #[arg(long, default_value_t = 8192)]
    pub chunk_size: usize,

    /// Output chunks that may sit unwritten before reading pauses.
    #[arg(long, default_value_t = 1)]
    pub high_water_mark: usize,

    /// Read the whole input and decode it in one call.
    #[arg(long)]
    pub whole: bool,

    /// Write decoded text to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for `tds resolve`.
#[derive(clap::Args)]
pub struct ResolveArgs {
    /// Encoding label to resolve.
    pub label: String,

    /// Reflect `fatal: true`.
    #[arg(long)]
    pub fatal: bool,

    /// Reflect `ignoreBOM: true`.
    #[arg(long)]
    pub ignore_bom: bool,

    /// Print JSON instead of aligned text.
    #[arg(long)]
    pub json: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("TDS_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Decode(args) => cmd_decode::run(&args).await,
        Commands::Resolve(args) => cmd_resolve::run(&args),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}
