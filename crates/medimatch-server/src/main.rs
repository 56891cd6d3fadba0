//! medimatch server binary.
//!
//! Reads `medimatch.toml` (or the path given with `--config`) plus
//! `MEDIMATCH_*` environment variables, opens the SQLite catalog and either
//! serves the JSON API, bulk-imports the Decagon source files, or prints the
//! most recent audit records.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use medimatch_api::AppState;
use medimatch_engine::{
  AuditLogger, CorrelationBuilder, DelimitedTermExtractor, IndexHandle, QueryService,
};
use medimatch_server::{
  ServerConfig,
  import::{self, ImportSources},
};
use medimatch_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "medimatch", author, version, about = "Drug / side effect / protein target correlation service")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "medimatch.toml", global = true)]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API.
  Serve,

  /// Bulk-import Decagon / STITCH source files into the catalog.
  Import {
    /// Tab-separated drug names (no header).
    #[arg(long, value_name = "FILE")]
    drugs:      Option<PathBuf>,
    /// Mono side effects CSV.
    #[arg(long, value_name = "FILE")]
    mono:       Option<PathBuf>,
    /// Combination side effects CSV.
    #[arg(long, value_name = "FILE")]
    combo:      Option<PathBuf>,
    /// Drug → protein targets CSV.
    #[arg(long, value_name = "FILE")]
    targets:    Option<PathBuf>,
    /// Rows per transaction; overrides `import_batch_size`.
    #[arg(long)]
    batch_size: Option<usize>,
  },

  /// Print the most recent audit records as JSON lines.
  Audit {
    #[arg(long, default_value_t = 20)]
    limit: usize,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;

  let store_path = cfg.resolved_store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);

  match cli.command {
    Command::Serve => serve(cfg, store).await,
    Command::Import { drugs, mono, combo, targets, batch_size } => {
      let sources = ImportSources { drugs, mono, combo, targets };
      if sources.drugs.is_none()
        && sources.mono.is_none()
        && sources.combo.is_none()
        && sources.targets.is_none()
      {
        anyhow::bail!("nothing to import: pass at least one of --drugs, --mono, --combo, --targets");
      }

      let batch_size = batch_size.unwrap_or(cfg.import_batch_size);
      let summary = import::run(store.as_ref(), &sources, batch_size)
        .await
        .context("import failed")?;
      println!("{}", serde_json::to_string_pretty(&summary)?);
      Ok(())
    }
    Command::Audit { limit } => {
      let records = store
        .recent_audit_records(limit)
        .await
        .context("failed to read audit log")?;
      for record in records {
        println!("{}", serde_json::to_string(&record)?);
      }
      Ok(())
    }
  }
}

async fn serve(cfg: ServerConfig, store: Arc<SqliteStore>) -> anyhow::Result<()> {
  let index = IndexHandle::new();
  let audit = AuditLogger::spawn(Arc::clone(&store), &cfg.audit);
  let service = QueryService::new(Arc::clone(&store), index.clone(), audit.clone());
  let builder = CorrelationBuilder::new(Arc::clone(&store), index);

  if cfg.rebuild_on_start {
    let builder = builder.clone();
    tokio::spawn(async move {
      if let Err(e) = builder.rebuild().await {
        tracing::error!(error = %e, "initial correlation build failed");
      }
    });
  }

  let app = medimatch_server::router(AppState {
    service,
    builder,
    extractor: Arc::new(DelimitedTermExtractor),
    limits: cfg.limits,
  });
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  audit.shutdown().await;
  tracing::info!(stats = ?audit.stats(), "audit log drained");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
}
