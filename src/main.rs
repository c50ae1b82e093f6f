//! Snapshot dump tool
//!
//! Restores the latest automated snapshot of an RDS instance into a temporary
//! instance, dumps its databases, archives the dumps and tears the instance down.

// snapshotdump/src/main.rs
mod backup;
mod config;
mod errors;
mod rds;
mod utils;

#[cfg(test)]
mod testing;

use std::env;
use std::process::ExitCode;

use tracing::{error, info, warn};

use backup::DumpRequest;
use config::AppConfig;
use errors::Result;

const USAGE: &str = "Usage: snapshotdump <source-db-instance-id> [database ...]";

/// Main entry point for the snapshot dump tool
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(request) = parse_args(&args) else {
        eprintln!("{}", USAGE);
        return ExitCode::FAILURE;
    };

    dotenv::dotenv().ok();
    utils::logging::init_logging();

    match run_app(&request).await {
        Ok(()) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = ?e, "Run failed");
            eprintln!("❌ Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// First argument is the source instance; any further ones are database names.
fn parse_args(args: &[String]) -> Option<DumpRequest> {
    let (source, databases) = args.split_first()?;
    if source.trim().is_empty() {
        return None;
    }
    Some(DumpRequest {
        source_instance_id: source.trim().to_string(),
        databases: databases
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect(),
    })
}

async fn run_app(request: &DumpRequest) -> Result<()> {
    let app_config = AppConfig::load()?;

    info!("🚀 Starting dump of \"{}\" in {}", request.source_instance_id, app_config.region);
    let summary = backup::run_backup_flow(&app_config, request, shutdown_signal()).await?;

    info!(
        snapshot = %summary.snapshot_identifier,
        instance = %summary.temporary_instance_id,
        dumps = summary.dump_files.len(),
        "Archive written to {}",
        summary.archive_path.display()
    );
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not install SIGTERM handler, only Ctrl-C will trigger cleanup");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
