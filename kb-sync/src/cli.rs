//! # kb-sync CLI interface (module)
//!
//! This module implements the CLI interface for kb-sync: argument parsing, config
//! bootstrapping, and the async entrypoint shared by `main` and the integration tests.
//!
//! All synchronisation logic lives in the [`kb-sync-core`] crate. This module is
//! strictly CLI glue: it builds the HTTP client, threads the explicit configuration
//! into the core, and prints the report.
//!
//! ## Exit behaviour
//! - Missing config: a blank template is written and the run ends successfully.
//! - Fatal transport faults (service unreachable, credentials rejected): error exit.
//! - Per-file failures and knowledge base errors are printed in the report; with
//!   `--strict` they also produce an error exit.
//!
//! [`kb-sync-core`]: ../../kb-sync-core/
use crate::client::KbClient;
use crate::load_config::{load_config, ConfigState, DEFAULT_CONFIG_FILE};
use anyhow::Result;
use clap::Parser;
use kb_sync_core::synchronise::synchronise;
use std::path::PathBuf;

/// CLI for kb-sync: upload files and register them with a knowledge base.
#[derive(Debug, Parser)]
#[clap(
    name = "kb-sync",
    version,
    about = "Upload local files and add them to a knowledge base's file data source"
)]
pub struct Cli {
    /// Files to upload, resolved against the folder
    pub files: Vec<PathBuf>,

    /// Path to the configuration file (JSON, or YAML by extension)
    #[clap(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Folder the files are resolved against (overrides the config file)
    #[clap(long)]
    pub folder: Option<PathBuf>,

    /// Maximum number of files uploaded at once (overrides the config file)
    #[clap(long)]
    pub concurrency: Option<usize>,

    /// Exit with an error if any file failed or the knowledge base could not be updated
    #[clap(long)]
    pub strict: bool,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let config = match load_config(&cli.config)? {
        ConfigState::Loaded(config) => config,
        ConfigState::TemplateWritten(path) => {
            println!(
                "No configuration file exists. Wrote empty template to {}",
                path.display()
            );
            return Ok(());
        }
    };
    config.validate()?;

    let sync_config = config.sync_config(cli.folder, cli.concurrency);
    sync_config.trace_loaded();
    let client = KbClient::new(&config.url, &config.api_key)?;

    tracing::info!(command = "sync", files = cli.files.len(), "Starting synchronisation");
    let report = match synchronise(&client, &sync_config, &cli.files).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(command = "sync", error = %e, "Synchronisation aborted");
            return Err(anyhow::Error::new(e).context("Synchronisation aborted"));
        }
    };

    println!("{report}");

    if cli.strict && !report.is_clean() {
        anyhow::bail!(
            "Synchronisation finished with errors: {} file(s) failed{}",
            report.uploads.failed(),
            if report.knowledge_base.is_err() {
                ", knowledge base not updated"
            } else {
                ""
            }
        );
    }
    tracing::info!(command = "sync", "Synchronisation complete");
    Ok(())
}
