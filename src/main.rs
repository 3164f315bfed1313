//! forkstat: export repository statistics to CSV.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use forkstat::license::LicenseSearch;
use forkstat::{
    CancelToken, ExportConfig, ForkCounting, GitTransactioner, LicenseCatalog, LicenseError,
    ManifestStore, Pipeline,
};

#[derive(Parser)]
#[command(name = "forkstat")]
#[command(about = "Extract repository statistics from shared rooted storage")]
#[command(version)]
struct Cli {
    /// Log debug messages
    #[arg(long, global = true)]
    debug: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    logfile: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export statistics of every fetched repository
    Export(ExportArgs),

    /// Classify a license file, or the license file of a directory
    License {
        /// License file or directory to search
        path: PathBuf,
    },
}

#[derive(Args)]
struct ExportArgs {
    /// CSV file with the results, replaced if it exists
    #[arg(short, long, default_value = "result.csv")]
    output: PathBuf,

    /// JSON manifest with the repository records
    #[arg(long)]
    manifest: PathBuf,

    /// Directory with one git repository per storage root
    #[arg(long)]
    roots: PathBuf,

    /// Number of workers, defaults to the available parallelism
    #[arg(short, long)]
    workers: Option<usize>,

    /// Repositories queued beyond the running ones before submission blocks
    #[arg(long, default_value = "0")]
    queue_depth: usize,

    /// Export at most this many repositories
    #[arg(long)]
    limit: Option<usize>,

    /// Skip this many repositories
    #[arg(long)]
    offset: Option<usize>,

    /// When to compute fork counts
    #[arg(long, value_enum, default_value_t = ForkCounting::Deferred)]
    fork_counting: ForkCounting,
}

fn init_logging(debug: bool, logfile: Option<&Path>) -> Result<()> {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match logfile {
        Some(path) => {
            if path.exists() {
                fs::remove_file(path)
                    .with_context(|| format!("unable to remove log file {}", path.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("unable to create log file {}", path.display()))?;
            builder.with_writer(Mutex::new(file)).with_ansi(false).init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}

fn run_export(args: ExportArgs) -> Result<()> {
    let store = ManifestStore::open(&args.manifest)
        .with_context(|| format!("unable to open manifest {}", args.manifest.display()))?;
    let txer = GitTransactioner::new(&args.roots);

    let defaults = ExportConfig::default();
    let config = ExportConfig {
        workers: args.workers.unwrap_or(defaults.workers),
        queue_depth: args.queue_depth,
        limit: args.limit,
        offset: args.offset,
        fork_counting: args.fork_counting,
        ..defaults
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        info!("interrupted, stopping export");
        handler_token.cancel();
    })
    .context("unable to install interrupt handler")?;

    let summary = Pipeline::new(Arc::new(store), Arc::new(txer), config)
        .with_cancel_token(cancel)
        .run_to_file(&args.output)
        .with_context(|| format!("export to {} failed", args.output.display()))?;

    if summary.cancelled {
        warn!(
            written = summary.written,
            expected = summary.expected,
            "export interrupted, output is partial"
        );
    }
    Ok(())
}

fn print_license(catalog: &LicenseCatalog, path: &Path) -> Result<()> {
    match catalog.license_from_file(path) {
        Ok(license) => println!("{}: {}", path.display(), license.family),
        Err(LicenseError::Unrecognized) => println!("{}: unrecognized", path.display()),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

fn run_license(path: &Path) -> Result<()> {
    let catalog = LicenseCatalog::new();
    if !path.is_dir() {
        return print_license(&catalog, path);
    }

    match catalog.search_dir(path)? {
        LicenseSearch::None => println!("{}: no license file found", path.display()),
        LicenseSearch::Single(file) => print_license(&catalog, &file)?,
        LicenseSearch::Ambiguous(files) => {
            println!("{}: multiple license files found", path.display());
            for file in files {
                println!("  {}", file.display());
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.logfile.as_deref())?;

    match cli.command {
        Commands::Export(args) => run_export(args),
        Commands::License { path } => run_license(&path),
    }
}
