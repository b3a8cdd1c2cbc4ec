use casino_ledger::application::lifecycle::SessionManager;
use casino_ledger::config::LedgerConfig;
use casino_ledger::domain::ports::LedgerStoreRef;
use casino_ledger::infrastructure::in_memory::InMemoryLedgerStore;
#[cfg(feature = "storage-rocksdb")]
use casino_ledger::infrastructure::rocksdb::RocksDbLedgerStore;
use casino_ledger::interfaces::csv::command_reader::CommandReader;
use casino_ledger::interfaces::csv::summary_writer::SummaryWriter;
use casino_ledger::interfaces::simulator::Simulator;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input player commands CSV file
    input: PathBuf,

    /// Ledger configuration (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn open_store(db_path: Option<PathBuf>, config: &LedgerConfig) -> Result<LedgerStoreRef> {
    let in_memory = || -> LedgerStoreRef {
        Arc::new(InMemoryLedgerStore::with_lock_timeout(config.lock_timeout()))
    };
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = RocksDbLedgerStore::open(&path, config.lock_timeout()).into_diagnostic()?;
            info!(path = %path.display(), "using RocksDB storage");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(path) => {
            warn!(
                path = %path.display(),
                "persistent storage requested via --db-path, but the 'storage-rocksdb' feature is not enabled; falling back to in-memory storage"
            );
            Ok(in_memory())
        }
        None => Ok(in_memory()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let config = match &cli.config {
        Some(path) => LedgerConfig::from_path(path).into_diagnostic()?,
        None => LedgerConfig::default(),
    };
    if config.uses_default_key() {
        warn!("internal_api_key is the development default; set a real secret");
    }

    let store = open_store(cli.db_path, &config)?;
    let mut simulator = Simulator::new(SessionManager::new(store, config));

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for (line, command) in reader.commands().enumerate() {
        let line = line + 2;
        match command {
            Ok(command) => {
                if let Err(e) = simulator.apply(command).await {
                    warn!(line, error = %e, "command rejected");
                }
            }
            Err(e) => warn!(line, error = %e, "unreadable command"),
        }
    }

    let summaries = simulator.summaries().await.into_diagnostic()?;
    info!(players = summaries.len(), "simulation finished");
    let stdout = io::stdout();
    let mut writer = SummaryWriter::new(stdout.lock());
    writer.write_summaries(summaries).into_diagnostic()?;

    Ok(())
}
