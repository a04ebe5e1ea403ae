//! pmtextd - help text collector daemon.
//!
//! Serves one-line and help text from a JSON catalogue over the PDU
//! protocol until interrupted.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use pmapi_core::collector::Collector;
use pmapi_core::types::CollectorConfig;
use pmapi_core::HelpCatalogue;

#[derive(Debug, Parser)]
#[command(name = "pmtextd", version, about = "Help text collector daemon")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "PMTEXTD_LISTEN", default_value = "127.0.0.1:44321")]
    listen: String,

    /// JSON catalogue of help text entries.
    #[arg(long, env = "PMTEXTD_CATALOGUE")]
    catalogue: PathBuf,

    /// Maximum concurrent client connections.
    #[arg(long, default_value_t = 256)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    pmapi_core::observability::init_tracing();

    let catalogue = HelpCatalogue::from_file(&args.catalogue).map_err(|e| {
        tracing::error!("cannot load catalogue {}: {}", args.catalogue.display(), e);
        e
    })?;
    tracing::info!("loaded {} help entries from {}", catalogue.len(), args.catalogue.display());

    let config = CollectorConfig {
        listen_addr: args.listen,
        max_connections: args.max_connections,
        ..CollectorConfig::default()
    };
    let collector = Arc::new(Collector::new(Arc::new(catalogue), config));

    let server = Arc::clone(&collector);
    let serving = tokio::spawn(async move { server.serve().await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received, shutting down");
    collector.shutdown();
    serving.await??;
    tracing::info!("served {} text requests", collector.requests_served());
    Ok(())
}
