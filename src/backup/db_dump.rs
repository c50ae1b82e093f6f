// snapshotdump/src/backup/db_dump.rs
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};
use which::which;

use crate::config::AppConfig;
use crate::config::credentials::resolve_credentials;
use crate::errors::{AppError, Result};
use crate::rds::InstanceDescription;

/// Database engines we know how to dump, keyed by the engine name RDS reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpEngine {
    Postgres,
    Mysql,
}

/// Where and as whom the dump process connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl DumpEngine {
    pub fn from_engine_name(engine: &str) -> Option<Self> {
        match engine {
            "postgres" => Some(DumpEngine::Postgres),
            "mysql" => Some(DumpEngine::Mysql),
            _ => None,
        }
    }

    pub fn program(&self) -> &'static str {
        match self {
            DumpEngine::Postgres => "pg_dump",
            DumpEngine::Mysql => "mysqldump",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DumpEngine::Postgres => "dump",
            DumpEngine::Mysql => "sql",
        }
    }

    pub fn args(&self, conn: &ConnectionParams, db_name: &str) -> Vec<String> {
        let port = conn.port.to_string();
        match self {
            // Custom format, never prompt; the password travels in PGPASSWORD.
            DumpEngine::Postgres => vec![
                "-w".to_string(),
                "-Fc".to_string(),
                "-U".to_string(),
                conn.user.clone(),
                "-h".to_string(),
                conn.host.clone(),
                "-p".to_string(),
                port,
                db_name.to_string(),
            ],
            DumpEngine::Mysql => {
                let mut args = vec!["-u".to_string(), conn.user.clone()];
                // A bare `-p` makes mysqldump prompt on the terminal.
                if !conn.password.is_empty() {
                    args.push(format!("-p{}", conn.password));
                }
                args.extend([
                    "-h".to_string(),
                    conn.host.clone(),
                    "-P".to_string(),
                    port,
                    db_name.to_string(),
                ]);
                args
            }
        }
    }

    /// Environment set on the child process only.
    pub fn envs(&self, conn: &ConnectionParams) -> Vec<(&'static str, String)> {
        match self {
            DumpEngine::Postgres => vec![("PGPASSWORD", conn.password.clone())],
            DumpEngine::Mysql => Vec::new(),
        }
    }
}

/// One database to dump into one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpJob {
    pub engine: DumpEngine,
    pub database: String,
    pub output_path: PathBuf,
}

impl DumpJob {
    /// Output file is `<output_dir>/<database>-<snapshot token>.<ext>`.
    pub fn new(engine: DumpEngine, output_dir: &Path, database: &str, snapshot_token: &str) -> Self {
        let file_name = format!("{}-{}.{}", database, snapshot_token, engine.extension());
        Self {
            engine,
            database: database.to_string(),
            output_path: output_dir.join(file_name),
        }
    }
}

/// Runs one dump job against the restored instance.
#[allow(async_fn_in_trait)]
pub trait DumpRunner {
    async fn dump(&self, job: &DumpJob, instance: &InstanceDescription) -> Result<()>;
}

/// Dumps by spawning the engine's client binary with stdout redirected to the job's file.
pub struct ProcessDumper<'a> {
    config: &'a AppConfig,
}

impl<'a> ProcessDumper<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self { config }
    }

    /// Configured credentials, with the instance master user when none is set.
    pub fn connection_params(&self, instance: &InstanceDescription, db_name: &str) -> Result<ConnectionParams> {
        let endpoint = instance.endpoint.as_ref().ok_or_else(|| AppError::InvalidInstance {
            instance_id: instance.identifier.clone(),
            reason: "no endpoint reported".to_string(),
        })?;

        let (mut user, password) = resolve_credentials(self.config, db_name);
        if user.is_empty() {
            user = instance.master_username.clone();
        }

        Ok(ConnectionParams {
            host: endpoint.address.clone(),
            port: endpoint.port,
            user,
            password,
        })
    }
}

fn find_executable(program: &str) -> Result<PathBuf> {
    which(program).map_err(|_| {
        AppError::Config(format!(
            "{} executable not found in PATH. Please ensure the database client tools are installed and in your PATH.",
            program
        ))
    })
}

impl DumpRunner for ProcessDumper<'_> {
    async fn dump(&self, job: &DumpJob, instance: &InstanceDescription) -> Result<()> {
        let conn = self.connection_params(instance, &job.database)?;
        let program = find_executable(job.engine.program())?;

        info!(
            "📦 Dumping {} to {} with {}",
            job.database,
            job.output_path.display(),
            program.display()
        );

        // Each attempt starts from an empty file.
        let outfile = File::create(&job.output_path)?;

        let status = Command::new(&program)
            .args(job.engine.args(&conn, &job.database))
            .envs(job.engine.envs(&conn))
            .stdin(Stdio::null())
            .stdout(Stdio::from(outfile))
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .status()
            .await?;

        if !status.success() {
            return Err(AppError::Command {
                program: job.engine.program().to_string(),
                status: status.to_string(),
            });
        }

        debug!(database = %job.database, "Dump process exited cleanly");
        info!("✓ Dumped {}.", job.database);
        Ok(())
    }
}
