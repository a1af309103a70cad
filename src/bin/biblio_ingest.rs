//! Batch ingestion CLI: parse a mnemonic-format record file, normalize
//! every record, and index it into the store (spec §4.1-§4.2, §6).

use std::path::PathBuf;

use biblio_engine::config::EngineConfig;
use biblio_engine::marc::read_records_str;
use biblio_engine::normalize::{normalize_record, AliasTables};
use biblio_engine::store::indexer::index_record;
use biblio_engine::store::EngineStore;
use clap::Parser;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "biblio-ingest", about = "Parse and index bibliographic records")]
struct Args {
    /// Path to a mnemonic-format record file
    file: PathBuf,

    /// Run migrations before ingesting
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = EngineConfig::from_env()?;

    let store = EngineStore::new(&config.database).await?;
    if args.migrate {
        store.run_migrations().await?;
    }

    let text = std::fs::read_to_string(&args.file)?;
    let alias_tables = AliasTables::default();

    let mut indexed = 0usize;
    let mut failed = 0usize;

    for parsed in read_records_str(&text) {
        let raw = match parsed {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "skipping a record that could not be tokenized");
                failed += 1;
                continue;
            }
        };

        let mut record = match biblio_engine::marc::parse(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "skipping a record that failed to parse");
                failed += 1;
                continue;
            }
        };

        normalize_record(&mut record, &alias_tables);

        if let Err(e) = index_record(store.pool(), &record).await {
            error!(record_id = %record.record_id, error = %e, "failed to index record");
            failed += 1;
            continue;
        }

        indexed += 1;
    }

    info!(indexed, failed, "ingestion complete");
    store.close().await;
    Ok(())
}
