pub(crate) mod archive;
pub(crate) mod cleanup;
pub(crate) mod db_dump;
mod logic;

use std::future::Future;

pub use logic::{DumpRequest, RunSummary};

use tracing::debug;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::rds::client::RdsClient;
use db_dump::ProcessDumper;
use logic::DumpWorkflow;

/// Public entry point: restore the latest snapshot of the requested instance,
/// dump it, archive the dumps and delete the temporary instance.
pub async fn run_backup_flow<S>(app_config: &AppConfig, request: &DumpRequest, shutdown: S) -> Result<RunSummary>
where
    S: Future<Output = ()>,
{
    let rds = RdsClient::new(app_config).await;
    let dumper = ProcessDumper::new(app_config);

    let workflow = DumpWorkflow::new(app_config, &rds, &dumper);
    let result = workflow.run(request, shutdown).await;
    debug!(states = ?workflow.history(), "Workflow finished");
    result
}
