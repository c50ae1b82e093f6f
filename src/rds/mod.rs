//! RDS control-plane access: the operations trait, the SDK-backed client,
//! snapshot selection and temporary instance handling.

pub mod client;
pub mod instance;
pub mod snapshot;

use chrono::{DateTime, Utc};

use crate::errors::Result;

pub const STATUS_AVAILABLE: &str = "available";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub identifier: String,
    pub instance_identifier: String,
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

/// What DescribeDBInstances reports about the temporary instance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceDescription {
    pub identifier: String,
    pub status: String,
    pub engine: String,
    pub endpoint: Option<Endpoint>,
    pub master_username: String,
    pub db_name: Option<String>,
}

impl InstanceDescription {
    pub fn is_available(&self) -> bool {
        self.status == STATUS_AVAILABLE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    pub instance_identifier: String,
    pub snapshot_identifier: String,
    pub instance_class: String,
    pub subnet_group: Option<String>,
    pub publicly_accessible: bool,
}

/// The RDS calls the workflow needs.
///
/// Abstracted so the orchestration can be exercised without AWS.
#[allow(async_fn_in_trait)]
pub trait RdsOperations {
    /// All snapshots of `instance_id`, every page.
    async fn describe_snapshots(&self, instance_id: &str) -> Result<Vec<Snapshot>>;

    async fn restore_from_snapshot(&self, request: &RestoreRequest) -> Result<()>;

    async fn describe_instance(&self, instance_id: &str) -> Result<InstanceDescription>;

    /// Replaces the VPC security groups, applied immediately.
    async fn modify_security_groups(&self, instance_id: &str, security_group_ids: &[String]) -> Result<()>;

    /// Deletes the instance without a final snapshot.
    async fn delete_instance(&self, instance_id: &str) -> Result<()>;
}
