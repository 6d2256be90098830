use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rosterlink_rs::config::{ConfigOverrides, CredentialOverrides, ReconcileOverrides, RosterConfig};
use rosterlink_rs::export::{read_export_file, write_export_file};
use rosterlink_rs::reconcile::{ReconcileOptions, Reconciler, StopSignal};
use rosterlink_rs::store::{list_all_identities, MemoryCredentialStore, MemoryDocumentStore};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rosterlink", version, about = "Link roster officials to login identities")]
struct Cli {
    /// Path to config file (TOML). Falls back to ROSTERLINK_CONFIG.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Match unlinked roster records to identities and link them
    Reconcile {
        /// Identities as a JSON array
        #[arg(long)]
        identities: PathBuf,
        /// Roster as a JSON object of collection name to records
        #[arg(long)]
        roster: PathBuf,
        /// Seed the handle index from a CSV export instead of listing identities
        #[arg(long)]
        export: Option<PathBuf>,
        /// Match and report without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Also rewrite handles of records that are already linked
        #[arg(long)]
        repair_linked: bool,
    },
    /// Write every identity to a CSV export
    Export {
        /// Identities as a JSON array
        #[arg(long)]
        identities: PathBuf,
        /// Destination CSV file
        #[arg(long)]
        out: PathBuf,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_overrides(export: Option<&Path>, dry_run: bool, repair_linked: bool) -> ConfigOverrides {
    let mut overrides = ConfigOverrides::default();
    if let Some(path) = export {
        overrides.credential = Some(CredentialOverrides {
            export_path: Some(path.to_path_buf()),
            ..Default::default()
        });
    }
    if dry_run || repair_linked {
        overrides.reconcile = Some(ReconcileOverrides {
            dry_run: dry_run.then_some(true),
            repair_linked_handles: repair_linked.then_some(true),
        });
    }
    overrides
}

async fn reconcile(
    config: &RosterConfig,
    identities_path: &Path,
    roster_path: &Path,
) -> anyhow::Result<bool> {
    let credentials = MemoryCredentialStore::load_json(identities_path)?;
    let documents = MemoryDocumentStore::load_json(roster_path)?;

    let stop = StopSignal::new();
    stop.stop_on_ctrl_c();
    let reconciler = Reconciler::new(&credentials, &documents, ReconcileOptions::from(config))
        .with_stop_signal(stop);

    let summary = match &config.credential.export_path {
        Some(path) => {
            let export = read_export_file(path)?;
            if export.invalid_rows > 0 {
                warn!(invalid = export.invalid_rows, "Export rows without id or handle were skipped");
            }
            reconciler.run_with_index(&export.index).await?
        }
        None => reconciler.run().await?,
    };
    println!("{}", summary.render());

    if config.reconcile.dry_run {
        info!("Dry run, stores left untouched");
    } else {
        credentials.save_json(identities_path)?;
        documents.save_json(roster_path)?;
        info!(
            identities = %identities_path.display(),
            roster = %roster_path.display(),
            "Saved stores"
        );
    }
    Ok(!summary.interrupted)
}

async fn export(config: &RosterConfig, identities_path: &Path, out: &Path) -> anyhow::Result<()> {
    let credentials = MemoryCredentialStore::load_json(identities_path)?;
    let identities = list_all_identities(&credentials, config.credential.page_size).await?;
    write_export_file(&identities, out)?;
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config_path = cli
        .config
        .or_else(|| std::env::var("ROSTERLINK_CONFIG").ok());

    match cli.command {
        Command::Reconcile {
            identities,
            roster,
            export,
            dry_run,
            repair_linked,
        } => {
            let overrides = build_overrides(export.as_deref(), dry_run, repair_linked);
            let config = RosterConfig::load(config_path.as_deref(), overrides)?;
            reconcile(&config, &identities, &roster).await
        }
        Command::Export { identities, out } => {
            let config = RosterConfig::from_env(config_path.as_deref())?;
            export(&config, &identities, &out).await?;
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(130),
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
