//! bmo: bulk-load a stream of JSON values from stdin into a table store.
//!
//! Exit status: 0 when the input is exhausted and every batch is written,
//! 1 on any parse or store failure, 2 on invalid arguments.

mod cli;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::{error, info};

use bmo_core::config::load_dotenv;
use bmo_core::Config;
use bmo_ingest::{IngestError, IngestReport, Pipeline};
use bmo_store::{PgTableStore, StoreConnector};

use crate::cli::{validate, CliArgs};

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout stays free for pipelines.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();

    let mut config = Config::from_env();
    args.apply(&mut config);

    if let Err(message) = validate(&config) {
        error!("{message}");
        eprintln!();
        eprintln!("{}", CliArgs::command().render_help());
        return ExitCode::from(2);
    }

    config.log_summary();

    match run(&config).await {
        Ok(report) => {
            info!(
                objects = report.envelopes,
                batches = report.batches,
                "all batches written"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<IngestError>() {
                Some(failure) => error!(kind = failure.kind(), "{e:#}"),
                None => error!(kind = "connection", "{e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config) -> Result<IngestReport> {
    let max_connections = u32::try_from(config.pipeline.pool_size).unwrap_or(u32::MAX);
    let store = Arc::new(
        PgTableStore::connect(&config.store, max_connections)
            .await
            .context("failed to connect to store")?,
    );
    info!(node = store.node(), "session established");

    let connector = Arc::new(
        StoreConnector::new(store.clone(), config.store.table.clone())
            .with_insert_mode(config.pipeline.insert_mode),
    );
    let pipeline = Pipeline::new(connector, &config.pipeline);

    let result = pipeline.run(std::io::stdin()).await;
    store.close().await;
    Ok(result?)
}
