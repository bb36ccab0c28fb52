use anyhow::Result;
use clap::{ArgAction, Parser};
use large_file_scanner::config::{settings, AppConfig};
use large_file_scanner::core::FileRemover;
use large_file_scanner::utils::format::{
    clock_duration, human_size, local_timestamp, mib_to_bytes,
};
use large_file_scanner::{
    digest_file, start_scan_with, FileDescriptor, FsRemover, ScanEvent, ScanOutcome, ScanProgress,
    ScanRequest,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lfscan", version, about = "Find large files under a directory")]
struct Args {
    /// Directory to scan (defaults to the last scanned directory)
    root: Option<PathBuf>,

    /// Minimum size in MiB (defaults to the configured value)
    #[arg(long, conflicts_with = "min_bytes")]
    min_mb: Option<u64>,

    /// Minimum size in bytes
    #[arg(long, allow_negative_numbers = true)]
    min_bytes: Option<i64>,

    /// Include hidden files and directories
    #[arg(long)]
    hidden: bool,

    /// Count entries first so progress shows a percentage and ETA
    #[arg(long)]
    count: bool,

    /// Print the SHA-256 of every reported file
    #[arg(long)]
    digest: bool,

    /// Offer to delete the reported files once the scan finishes
    #[arg(long)]
    delete: bool,

    /// Do not ask before deleting
    #[arg(short, long, requires = "delete")]
    yes: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(args: Args) -> Result<ExitCode> {
    let mut config = AppConfig::load(None).unwrap_or_else(|e| {
        tracing::warn!("Could not load config, using defaults: {}", e);
        AppConfig::default()
    });

    let root = args
        .root
        .clone()
        .or_else(|| config.last_directory.clone())
        .ok_or_else(|| {
            anyhow::anyhow!("No directory given and none remembered from a previous run")
        })?;
    let include_hidden = args.hidden || config.include_hidden;

    let request = match (args.min_bytes, args.min_mb) {
        (Some(bytes), _) => ScanRequest::new(&root, bytes, include_hidden)?,
        (None, Some(mb)) => ScanRequest::at_least(&root, mib_to_bytes(mb), include_hidden),
        (None, None) => ScanRequest::at_least(&root, config.threshold_bytes(), include_hidden),
    };
    let threshold = request.threshold_bytes();

    let mut options = config.session_options();
    options.count_entries |= args.count;
    let mut handle = start_scan_with(request, options)?;

    config.last_directory = Some(handle.root().to_path_buf());
    if let Some(mb) = args.min_mb {
        config.min_size_mb = mb;
    }
    if let Err(e) = settings::save_config(&config, None) {
        tracing::warn!("Failed to save config: {}", e);
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let canceller = handle.cancel_handle();
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::Relaxed);
                canceller.cancel();
            }
        });
    }

    println!("Scanning {} for files >= {}", handle.root().display(), human_size(threshold));

    let mut reported: Vec<FileDescriptor> = Vec::new();
    let mut outcome = None;
    while let Some(event) = handle.next_event().await {
        match event {
            ScanEvent::File(file) => {
                print_row(&file);
                if args.digest {
                    print_digest(&file, config.chunk_size, interrupted.clone()).await;
                }
                if args.delete {
                    reported.push(file);
                }
            }
            ScanEvent::Progress(progress) => log_progress(&progress),
            ScanEvent::Finished(o) => outcome = Some(o),
        }
    }

    let code = match outcome {
        Some(ScanOutcome::Completed {
            total_qualifying,
            entry_errors,
        }) => {
            if entry_errors > 0 {
                println!(
                    "Done: {} file(s) found, {} entries skipped (run with -v for details)",
                    total_qualifying, entry_errors
                );
                for error in handle.progress().recent_errors {
                    tracing::info!("skipped {}: {}", error.path.display(), error.message);
                }
            } else {
                println!("Done: {} file(s) found", total_qualifying);
            }
            ExitCode::SUCCESS
        }
        Some(ScanOutcome::Cancelled { qualifying_found }) => {
            println!("Scan cancelled after {} file(s)", qualifying_found);
            ExitCode::from(130)
        }
        Some(ScanOutcome::Failed { cause }) => {
            eprintln!("Scan could not run: {}", cause);
            return Ok(ExitCode::FAILURE);
        }
        None => {
            handle.wait().await?;
            anyhow::bail!("Scan ended without an outcome");
        }
    };

    if args.delete && !reported.is_empty() {
        delete_reported(&reported, args.yes, &FsRemover)?;
    }

    Ok(code)
}

fn log_progress(progress: &ScanProgress) {
    let position = match (progress.percent(), progress.total_entries) {
        (Some(percent), Some(total)) => {
            format!("{:.0}% ({}/{})", percent, progress.entries_visited, total)
        }
        _ => format!("{} entries", progress.entries_visited),
    };
    tracing::info!(
        "{} visited at {:.0}/s, {} elapsed, ETA {}; {} qualifying, {} skipped ({})",
        position,
        progress.entries_per_sec,
        clock_duration(Some(Duration::from_millis(progress.elapsed_ms))),
        clock_duration(progress.eta()),
        progress.qualifying_found,
        progress.entry_errors,
        progress.current_path
    );
}

fn print_row(file: &FileDescriptor) {
    println!(
        "{:>10}  {}  {}",
        human_size(file.size_bytes),
        local_timestamp(&file.modified_at),
        file.path.display()
    );
}

async fn print_digest(file: &FileDescriptor, chunk_size: usize, cancel: Arc<AtomicBool>) {
    let path = file.path.clone();
    let result = tokio::task::spawn_blocking(move || digest_file(&path, chunk_size, &cancel)).await;
    match result {
        Ok(Ok(Some(hex))) => println!("{:>10}  sha256 {}", "", hex),
        Ok(Ok(None)) => {}
        Ok(Err(e)) => tracing::warn!("{}", e),
        Err(e) => tracing::warn!("Digest task failed: {}", e),
    }
}

fn delete_reported(
    files: &[FileDescriptor],
    assume_yes: bool,
    remover: &dyn FileRemover,
) -> Result<()> {
    let total: u64 = files.iter().map(|f| f.size_bytes).sum();
    if !assume_yes {
        print!(
            "Delete {} file(s), {} in total? [y/N] ",
            files.len(),
            human_size(total)
        );
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("Nothing deleted.");
            return Ok(());
        }
    }

    let mut freed = 0u64;
    let mut removed = 0usize;
    for file in files {
        match remover.remove(&file.path) {
            Ok(()) => {
                freed += file.size_bytes;
                removed += 1;
            }
            Err(e) => eprintln!("{}", e),
        }
    }
    println!("Deleted {} file(s), freed {}", removed, human_size(freed));
    Ok(())
}
