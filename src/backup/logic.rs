// snapshotdump/src/backup/logic.rs
use chrono::{DateTime, Local};
use std::cell::RefCell;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::info;

use super::archive::{archive_file_name, create_tar_gz_archive};
use super::cleanup::with_temporary_instance;
use super::db_dump::{DumpEngine, DumpJob, DumpRunner};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::rds::instance::{apply_security_groups, generate_instance_identifier, restore_instance, wait_until_available};
use crate::rds::snapshot::{find_latest_snapshot, snapshot_name_token};
use crate::rds::{InstanceDescription, RdsOperations, Snapshot};
use crate::utils::retry::{RetryPolicy, with_retry};

/// Phases of one run. `TimedOut`, `Failed` and `Interrupted` are terminal
/// error states; cleanup still follows them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Selecting,
    Restoring,
    WaitingAvailable,
    Available,
    Dumping,
    Archiving,
    Cleanup,
    Done,
    TimedOut,
    Failed,
    Interrupted,
}

/// Command-line request: source instance and optional database names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRequest {
    pub source_instance_id: String,
    pub databases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub snapshot_identifier: String,
    pub temporary_instance_id: String,
    pub dump_files: Vec<PathBuf>,
    pub archive_path: PathBuf,
}

/// Databases to dump: the ones requested, else the configured ones, else the
/// instance's default database.
pub fn resolve_database_names(
    requested: &[String],
    config: &AppConfig,
    instance: &InstanceDescription,
) -> Result<Vec<String>> {
    if !requested.is_empty() {
        return Ok(requested.to_vec());
    }
    if !config.databases.is_empty() {
        return Ok(config.database_names());
    }
    instance
        .db_name
        .clone()
        .filter(|name| !name.is_empty())
        .map(|name| vec![name])
        .ok_or_else(|| AppError::NoDatabases(instance.identifier.clone()))
}

/// Restore-dump-archive-teardown state machine for one source instance.
pub struct DumpWorkflow<'a, R, D> {
    config: &'a AppConfig,
    rds: &'a R,
    dumper: &'a D,
    clock: fn() -> DateTime<Local>,
    history: RefCell<Vec<WorkflowState>>,
}

impl<'a, R, D> DumpWorkflow<'a, R, D>
where
    R: RdsOperations,
    D: DumpRunner,
{
    pub fn new(config: &'a AppConfig, rds: &'a R, dumper: &'a D) -> Self {
        Self {
            config,
            rds,
            dumper,
            clock: Local::now,
            history: RefCell::new(Vec::new()),
        }
    }

    /// Replaces the wall clock used to name the archive.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> DateTime<Local>) -> Self {
        self.clock = clock;
        self
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> Vec<WorkflowState> {
        self.history.borrow().clone()
    }

    fn enter(&self, state: WorkflowState) {
        info!(?state, "➡️ Entering state");
        self.history.borrow_mut().push(state);
    }

    /// Runs the whole cycle. Once the restore phase starts, the temporary
    /// instance is deleted whatever happens, including `shutdown` resolving.
    pub async fn run<S>(&self, request: &DumpRequest, shutdown: S) -> Result<RunSummary>
    where
        S: Future<Output = ()>,
    {
        self.enter(WorkflowState::Selecting);
        let snapshot = match find_latest_snapshot(self.rds, &request.source_instance_id, self.config.retry_policy()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.enter(WorkflowState::Failed);
                return Err(e);
            }
        };
        let snapshot_token = snapshot_name_token(&snapshot.identifier).to_string();
        let instance_id = generate_instance_identifier(&snapshot_token);

        self.enter(WorkflowState::Restoring);
        let body = async {
            let result = self
                .restore_and_dump(request, &snapshot, &snapshot_token, &instance_id)
                .await;
            if let Err(e) = &result {
                self.enter(match e {
                    AppError::AvailabilityTimeout { .. } => WorkflowState::TimedOut,
                    _ => WorkflowState::Failed,
                });
            }
            self.enter(WorkflowState::Cleanup);
            result
        };
        let interrupted = async {
            shutdown.await;
            self.enter(WorkflowState::Interrupted);
            self.enter(WorkflowState::Cleanup);
        };

        let summary = with_temporary_instance(self.rds, self.config, &instance_id, body, interrupted).await?;
        self.enter(WorkflowState::Done);
        Ok(summary)
    }

    async fn restore_and_dump(
        &self,
        request: &DumpRequest,
        snapshot: &Snapshot,
        snapshot_token: &str,
        instance_id: &str,
    ) -> Result<RunSummary> {
        let config = self.config;

        restore_instance(self.rds, config, snapshot, instance_id).await?;

        self.enter(WorkflowState::WaitingAvailable);
        let instance = wait_until_available(self.rds, instance_id, config.poll_interval, config.availability_timeout).await?;

        self.enter(WorkflowState::Available);
        apply_security_groups(self.rds, instance_id, &config.security_group_ids).await;

        info!("Instance engine is \"{}\".", instance.engine);
        let engine = DumpEngine::from_engine_name(&instance.engine)
            .ok_or_else(|| AppError::UnsupportedEngine(instance.engine.clone()))?;
        let databases = resolve_database_names(&request.databases, config, &instance)?;

        self.enter(WorkflowState::Dumping);
        fs::create_dir_all(&config.output_dir)?;

        let mut dump_files = Vec::with_capacity(databases.len());
        for db_name in &databases {
            info!("📦 Dumping \"{}\".", db_name);
            let job = DumpJob::new(engine, &config.output_dir, db_name, snapshot_token);
            with_retry(config.dump_retry_policy(), "dump database", || self.dumper.dump(&job, &instance)).await?;
            dump_files.push(job.output_path);
        }
        info!("✓ Dump completed.");

        self.enter(WorkflowState::Archiving);
        let archive_dest = config
            .output_dir
            .join(archive_file_name((self.clock)(), &request.source_instance_id));
        let archive_path = self.archive(&config.output_dir, &archive_dest).await?;

        Ok(RunSummary {
            snapshot_identifier: snapshot.identifier.clone(),
            temporary_instance_id: instance_id.to_string(),
            dump_files,
            archive_path,
        })
    }

    /// Compresses off the runtime thread so a shutdown signal is still
    /// observed while large dumps are packed. One attempt only: a
    /// half-written archive is not worth retrying.
    async fn archive(&self, source_dir: &Path, dest: &Path) -> Result<PathBuf> {
        with_retry(RetryPolicy::single(), "archive dumps", || {
            let source_dir = source_dir.to_path_buf();
            let dest = dest.to_path_buf();
            async move {
                task::spawn_blocking(move || create_tar_gz_archive(&source_dir, &dest))
                    .await
                    .map_err(|e| AppError::Archive(format!("Archive task did not complete: {}", e)))?
            }
        })
        .await
    }
}
