mod cli;

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use cli::{Cli, Commands};
use stockwin_rs::{list_symbols, prepare_dataset};
use tracing_appender::non_blocking;
use tracing_subscriber::{EnvFilter, prelude::*};

const LOG_FILE: &str = "stockwin.log";

fn init_tracing(log_file: Option<PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| anyhow!("failed to create log directory {parent:?}: {err}"))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| anyhow!("failed to open log file {path:?}: {err}"))?;
        let (non_blocking_writer, guard) = non_blocking(file);
        // The writer flushes only while its guard is alive.
        let _guard = Box::leak(Box::new(guard));
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking_writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .try_init()
            .map_err(|err| anyhow!("failed to initialize tracing: {err}"))
    }
}

fn log_invocation(log_file: Option<&PathBuf>) {
    let cwd = std::env::current_dir().ok();
    let argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    tracing::info!("==================== new stockwin run ====================");
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        cwd = ?cwd,
        log_file = ?log_file,
        argv = ?argv,
        "stockwin invoked"
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Commands::Prepare(args) if !args.no_file_log && !args.dry_run => {
            Some(args.output_dir.join(LOG_FILE))
        }
        _ => None,
    };

    init_tracing(log_file.clone())?;

    match cli.command {
        Commands::Prepare(args) => {
            log_invocation(log_file.as_ref());
            let config = args.into_config()?;
            let summary = prepare_dataset(&config)?;
            for skipped in &summary.skipped {
                tracing::warn!(symbol = %skipped.symbol, reason = %skipped.reason, "Symbol skipped");
            }
            if let Some(manifest) = &summary.manifest_path {
                tracing::info!(manifest = %manifest.display(), "Manifest written");
            }
            Ok(())
        }
        Commands::Symbols(args) => {
            for symbol in list_symbols(&args.data_dir, &args.suffix)? {
                println!("{symbol}");
            }
            Ok(())
        }
    }
}
