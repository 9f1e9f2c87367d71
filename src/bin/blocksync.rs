//! blocksync CLI - backup large files to slow media.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use blocksync::{human_duration, human_size, BlockEvent, BlockStatus, SyncBuilder, SyncStats};

/// Block size forced by the `_` token; small enough to exercise multi-block
/// behavior on tiny files in the acceptance tests.
const TEST_BLOCK_SIZE: usize = 100_000;

/// Suffix appended to the destination path for the default ledger location.
const LEDGER_SUFFIX: &str = ".blocksync";

/// Backup large files to slow media.
///
/// Reads the source file in blocks, calculating a checksum for each one,
/// compares them with the values stored on the previous run, and overwrites
/// only the changed blocks in the destination.
#[derive(Parser)]
#[command(name = "blocksync", version, about)]
struct Cli {
    /// Source file name to be read
    #[arg(short, long)]
    source: PathBuf,

    /// Destination file name or directory (a directory gets a file with the
    /// source's name in it)
    #[arg(short, long)]
    dest: PathBuf,

    /// Block size in MB ("_" forces a small test-only size)
    #[arg(short, long, default_value = "15", value_parser = parse_block_size)]
    blocksize: usize,

    /// Make the destination file sparse (man dd)
    #[arg(short = 'S', long)]
    sparse: bool,

    /// Only create the checksum ledger, do not actually copy data
    #[arg(short, long)]
    rebuild: bool,

    /// Do not truncate the destination file
    #[arg(short = 't', long)]
    notruncate: bool,

    /// File name to use as the checksum ledger (default "<DEST>.blocksync")
    #[arg(short, long)]
    checksum: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show errors
    #[arg(short, long)]
    quiet: bool,

    /// Report the source size as unknown (testing only)
    #[arg(long, hide = true)]
    zero: bool,
}

fn parse_block_size(raw: &str) -> Result<usize, String> {
    if raw == "_" {
        return Ok(TEST_BLOCK_SIZE);
    }
    let megabytes: usize = raw
        .parse()
        .map_err(|_| format!("invalid block size: {raw}"))?;
    if megabytes == 0 {
        return Err("block size must be at least 1 MB".to_string());
    }
    Ok(megabytes * 1024 * 1024)
}

/// `<dir>/<basename(source)>` when the destination names a directory,
/// otherwise the destination as given.
fn resolve_dest(dest: &Path, source: &Path) -> PathBuf {
    let is_dir = std::fs::metadata(dest).map(|m| m.is_dir()).unwrap_or(false);
    if is_dir {
        if let Some(name) = source.file_name() {
            return dest.join(name);
        }
    }
    dest.to_path_buf()
}

fn default_ledger_path(dest: &Path) -> PathBuf {
    let mut path = dest.as_os_str().to_os_string();
    path.push(LEDGER_SUFFIX);
    PathBuf::from(path)
}

fn print_progress_bar(position: u64, total: u64) {
    if total == 0 {
        print!("\rSyncing {} out of unknown size  ", human_size(position));
    } else {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = (position as f64 / total as f64 * 100.0) as u64;
        let cells = usize::try_from(percent / 2).unwrap_or(50).min(50);
        print!(
            "\r {percent:3}% [{}{}] 100%",
            "=".repeat(cells),
            " ".repeat(50 - cells)
        );
    }
    let _ = std::io::stdout().flush();
}

fn print_verbose_line(event: &BlockEvent, total: u64) {
    let position = human_size(event.position);
    let total = human_size(total);
    match event.status {
        BlockStatus::Same => println!("{position}/{total} {} -> same", event.digest),
        BlockStatus::Different => {
            if let Some(stored) = event.stored {
                println!("{position}/{total} {} -> {stored}", event.digest);
            }
        }
        BlockStatus::New => println!("{position}/{total} {} -> added", event.digest),
    }
}

fn print_grand_total(stats: &SyncStats, elapsed_seconds: u64) {
    println!("Total read = {}", human_size(stats.bytes_read));
    println!("Total write = {}", human_size(stats.bytes_written));
    println!("Total blocks changed = {}", stats.blocks_changed);
    println!("Elapsed {}", human_duration(elapsed_seconds));
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "blocksync=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> blocksync::Result<SyncStats> {
    let dest = resolve_dest(&cli.dest, &cli.source);
    let ledger = cli
        .checksum
        .clone()
        .unwrap_or_else(|| default_ledger_path(&dest));

    let source_size = if cli.zero {
        0
    } else {
        std::fs::metadata(&cli.source).map(|m| m.len()).unwrap_or(0)
    };

    if cli.verbose {
        println!(
            "{} -> {}, {}, block size = {}",
            cli.source.display(),
            dest.display(),
            human_size(source_size),
            human_size(cli.blocksize as u64)
        );
    }
    if cli.rebuild && !cli.quiet {
        println!("Note: only rebuilding checksum file");
    }

    let sync = SyncBuilder::new()
        .block_size(cli.blocksize)
        .sparse(cli.sparse)
        .rebuild_only(cli.rebuild)
        .truncate(!cli.notruncate)
        .build();

    let stats = if cli.quiet {
        sync.sync(&cli.source, &dest, &ledger)?
    } else if cli.verbose {
        sync.sync_with_progress(&cli.source, &dest, &ledger, |event| {
            print_verbose_line(event, source_size);
        })?
    } else {
        let stats = sync.sync_with_progress(&cli.source, &dest, &ledger, |event| {
            print_progress_bar(event.position, source_size);
        })?;
        println!();
        stats
    };

    Ok(stats)
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let shown_on_request =
                matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
            let _ = err.print();
            return if shown_on_request {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
        }
    };

    init_tracing(&cli);
    let started = Instant::now();

    match run(&cli) {
        Ok(stats) => {
            if cli.verbose {
                print_grand_total(&stats, started.elapsed().as_secs());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
