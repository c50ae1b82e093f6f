//! Test fixtures: scripted RDS and dump fakes that count their calls.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use chrono::{TimeZone, Utc};

use crate::backup::db_dump::{DumpJob, DumpRunner};
use crate::config::{AppConfig, RawJsonConfig};
use crate::errors::{AppError, Result};
use crate::rds::{Endpoint, InstanceDescription, RdsOperations, RestoreRequest, Snapshot};

/// Defaults, with no file and an empty environment.
pub fn test_config() -> AppConfig {
    AppConfig::from_sources(RawJsonConfig::default(), &HashMap::new()).unwrap()
}

/// Defaults writing dumps into `output_dir`.
pub fn test_config_in(output_dir: &Path) -> AppConfig {
    let mut config = test_config();
    config.output_dir = output_dir.to_path_buf();
    config
}

pub fn snapshot(identifier: &str, status: &str, day: u32) -> Snapshot {
    Snapshot {
        identifier: identifier.to_string(),
        instance_identifier: "prod-db".to_string(),
        status: status.to_string(),
        created_at: Some(Utc.with_ymd_and_hms(2024, 3, day, 4, 0, 0).unwrap()),
    }
}

pub fn instance_with_status(status: &str) -> InstanceDescription {
    InstanceDescription {
        identifier: "dump-test".to_string(),
        status: status.to_string(),
        engine: "postgres".to_string(),
        endpoint: Some(Endpoint {
            address: "dump-test.abc.us-east-1.rds.amazonaws.com".to_string(),
            port: 5432,
        }),
        master_username: "master".to_string(),
        db_name: Some("app".to_string()),
    }
}

fn api_error(operation: &'static str) -> AppError {
    AppError::Api {
        operation,
        code: Some("InternalFailure".to_string()),
        message: "scripted failure".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeleteBehavior {
    Succeed,
    Fail,
    NotFound,
}

/// In-memory RDS control plane.
pub struct FakeRds {
    snapshots: Vec<Snapshot>,
    snapshot_lookup_failures: u32,
    describe_snapshots_calls: Mutex<u32>,
    statuses: Mutex<VecDeque<Result<InstanceDescription>>>,
    default_status: InstanceDescription,
    fail_restore: bool,
    fail_modify: bool,
    delete_behavior: DeleteBehavior,
    restore_requests: Mutex<Vec<RestoreRequest>>,
    describe_instance_calls: Mutex<u32>,
    modify_calls: Mutex<Vec<Vec<String>>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeRds {
    /// One available snapshot, and an instance that is available on the first poll.
    pub fn new() -> Self {
        Self {
            snapshots: vec![snapshot("rds:prod-db-2024-03-05-04-00", "available", 5)],
            snapshot_lookup_failures: 0,
            describe_snapshots_calls: Mutex::new(0),
            statuses: Mutex::new(VecDeque::new()),
            default_status: instance_with_status("available"),
            fail_restore: false,
            fail_modify: false,
            delete_behavior: DeleteBehavior::Succeed,
            restore_requests: Mutex::new(Vec::new()),
            describe_instance_calls: Mutex::new(0),
            modify_calls: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_snapshots(mut self, snapshots: Vec<Snapshot>) -> Self {
        self.snapshots = snapshots;
        self
    }

    /// The first `failures` describe-snapshots calls fail with a throttling error.
    pub fn failing_snapshot_lookups(mut self, failures: u32) -> Self {
        self.snapshot_lookup_failures = failures;
        self
    }

    /// Scripted describe-instance replies; the default status follows once they run out.
    pub fn with_statuses(self, statuses: Vec<Result<InstanceDescription>>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    pub fn with_default_status(mut self, instance: InstanceDescription) -> Self {
        self.default_status = instance;
        self
    }

    pub fn failing_restore(mut self) -> Self {
        self.fail_restore = true;
        self
    }

    pub fn failing_modify(mut self) -> Self {
        self.fail_modify = true;
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.delete_behavior = DeleteBehavior::Fail;
        self
    }

    pub fn delete_not_found(mut self) -> Self {
        self.delete_behavior = DeleteBehavior::NotFound;
        self
    }

    pub fn restore_requests(&self) -> Vec<RestoreRequest> {
        self.restore_requests.lock().unwrap().clone()
    }

    pub fn describe_snapshots_calls(&self) -> u32 {
        *self.describe_snapshots_calls.lock().unwrap()
    }

    pub fn describe_instance_calls(&self) -> u32 {
        *self.describe_instance_calls.lock().unwrap()
    }

    pub fn modify_calls(&self) -> usize {
        self.modify_calls.lock().unwrap().len()
    }

    pub fn modified_security_groups(&self) -> Vec<Vec<String>> {
        self.modify_calls.lock().unwrap().clone()
    }

    /// Identifiers passed to every delete attempt, including failed ones.
    pub fn delete_calls(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

impl RdsOperations for FakeRds {
    async fn describe_snapshots(&self, _instance_id: &str) -> Result<Vec<Snapshot>> {
        let call = {
            let mut calls = self.describe_snapshots_calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if call <= self.snapshot_lookup_failures {
            return Err(api_error("describe-db-snapshots"));
        }
        Ok(self.snapshots.clone())
    }

    async fn restore_from_snapshot(&self, request: &RestoreRequest) -> Result<()> {
        self.restore_requests.lock().unwrap().push(request.clone());
        if self.fail_restore {
            return Err(api_error("restore-db-instance-from-db-snapshot"));
        }
        Ok(())
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<InstanceDescription> {
        *self.describe_instance_calls.lock().unwrap() += 1;
        let scripted = self.statuses.lock().unwrap().pop_front();
        let mut instance = match scripted {
            Some(reply) => reply?,
            None => self.default_status.clone(),
        };
        instance.identifier = instance_id.to_string();
        Ok(instance)
    }

    async fn modify_security_groups(&self, _instance_id: &str, security_group_ids: &[String]) -> Result<()> {
        self.modify_calls.lock().unwrap().push(security_group_ids.to_vec());
        if self.fail_modify {
            return Err(api_error("modify-db-instance"));
        }
        Ok(())
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(instance_id.to_string());
        match self.delete_behavior {
            DeleteBehavior::Succeed => Ok(()),
            DeleteBehavior::Fail => Err(api_error("delete-db-instance")),
            DeleteBehavior::NotFound => Err(AppError::NotFound {
                operation: "delete-db-instance",
                message: "DBInstance not found".to_string(),
            }),
        }
    }
}

/// Writes a small file per job instead of running a client binary.
pub struct FakeDumper {
    failures_before_success: Option<u32>,
    calls: Mutex<Vec<String>>,
}

impl FakeDumper {
    pub fn new() -> Self {
        Self {
            failures_before_success: Some(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every attempt exits non-zero.
    pub fn always_failing() -> Self {
        Self {
            failures_before_success: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The first `failures` attempts (across all jobs) exit non-zero.
    pub fn failing_first(failures: u32) -> Self {
        Self {
            failures_before_success: Some(failures),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Database name of every attempt, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl DumpRunner for FakeDumper {
    async fn dump(&self, job: &DumpJob, instance: &InstanceDescription) -> Result<()> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(job.database.clone());
            calls.len() as u32
        };

        let fails = match self.failures_before_success {
            None => true,
            Some(n) => attempt <= n,
        };
        if fails {
            return Err(AppError::Command {
                program: job.engine.program().to_string(),
                status: "exit status: 1".to_string(),
            });
        }

        std::fs::write(
            &job.output_path,
            format!("{} from {}", job.database, instance.identifier),
        )?;
        Ok(())
    }
}
