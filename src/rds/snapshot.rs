// snapshotdump/src/rds/snapshot.rs
use tracing::info;

use super::{RdsOperations, STATUS_AVAILABLE, Snapshot};
use crate::errors::{AppError, Result};
use crate::utils::retry::{RetryPolicy, with_retry};

/// Picks the most recently created snapshot in `available` status.
pub fn select_latest_snapshot(snapshots: Vec<Snapshot>, instance_id: &str) -> Result<Snapshot> {
    let mut usable: Vec<Snapshot> = snapshots
        .into_iter()
        .filter(|s| s.status == STATUS_AVAILABLE)
        .collect();

    // Stable sort; snapshots without a timestamp sort first.
    usable.sort_by_key(|s| s.created_at);

    usable
        .pop()
        .ok_or_else(|| AppError::NoSnapshot(instance_id.to_string()))
}

/// Short name of a snapshot: the part after the last `:` (`rds:db-2024-01-01` -> `db-2024-01-01`).
pub fn snapshot_name_token(identifier: &str) -> &str {
    identifier.rsplit(':').next().unwrap_or(identifier)
}

/// Fetches the snapshots of `instance_id` and selects the latest usable one.
pub async fn find_latest_snapshot<R: RdsOperations>(
    rds: &R,
    instance_id: &str,
    policy: RetryPolicy,
) -> Result<Snapshot> {
    info!("🔍 Getting latest available snapshot for instance {}", instance_id);

    let snapshots = with_retry(policy, "describe snapshots", || rds.describe_snapshots(instance_id)).await?;
    let latest = select_latest_snapshot(snapshots, instance_id)?;

    info!("✓ Found snapshot \"{}\".", latest.identifier);
    Ok(latest)
}
