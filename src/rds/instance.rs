// snapshotdump/src/rds/instance.rs
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use super::{InstanceDescription, RdsOperations, RestoreRequest, Snapshot};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::utils::retry::with_retry;

/// RDS limit on DB instance identifiers.
pub const MAX_IDENTIFIER_LEN: usize = 63;
const IDENTIFIER_PREFIX: &str = "dump";
const RANDOM_TOKEN_LEN: usize = 8;
const TOKEN_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// `dump-<8 random chars>-<snapshot token>`, cut to the RDS length limit.
pub fn generate_instance_identifier(snapshot_token: &str) -> String {
    let mut rng = rand::thread_rng();
    let token: String = (0..RANDOM_TOKEN_LEN)
        .map(|_| char::from(TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())]))
        .collect();
    build_instance_identifier(&token, snapshot_token)
}

fn build_instance_identifier(random_token: &str, snapshot_token: &str) -> String {
    let full = format!("{}-{}-{}", IDENTIFIER_PREFIX, random_token, snapshot_token);
    let truncated: String = full.chars().take(MAX_IDENTIFIER_LEN).collect();
    // RDS rejects identifiers that end with a hyphen.
    truncated.trim_end_matches('-').to_string()
}

/// Issues the restore call for `instance_id` from `snapshot`, retried with the global bound.
pub async fn restore_instance<R: RdsOperations>(
    rds: &R,
    config: &AppConfig,
    snapshot: &Snapshot,
    instance_id: &str,
) -> Result<()> {
    let request = RestoreRequest {
        instance_identifier: instance_id.to_string(),
        snapshot_identifier: snapshot.identifier.clone(),
        instance_class: config.instance_class.clone(),
        subnet_group: config.subnet_group.clone(),
        publicly_accessible: config.publicly_accessible,
    };

    info!("🚀 Launching instance \"{}\".", instance_id);
    with_retry(config.retry_policy(), "restore instance", || rds.restore_from_snapshot(&request)).await?;
    info!("✓ Launched instance \"{}\".", instance_id);
    Ok(())
}

/// Polls the instance every `interval` until it reports `available` or the
/// `timeout` budget is spent.
///
/// API errors while polling are logged and skipped; the next tick tries again.
/// Only non-transient errors abort the wait.
pub async fn wait_until_available<R: RdsOperations>(
    rds: &R,
    instance_id: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<InstanceDescription> {
    info!("⏳ Waiting for instance to become available.");
    let mut remaining = timeout;

    while !remaining.is_zero() {
        match rds.describe_instance(instance_id).await {
            Ok(instance) if instance.is_available() => {
                info!("✓ Instance is available.");
                return Ok(instance);
            }
            Ok(instance) => {
                debug!(instance_id, status = %instance.status, "Instance not ready yet");
            }
            Err(e) if e.is_transient() || e.is_not_found() => {
                warn!(instance_id, error = %e, "Status check failed, will retry on next tick");
            }
            Err(e) => return Err(e),
        }

        remaining = remaining.saturating_sub(interval);
        tokio::time::sleep(interval).await;
    }

    Err(AppError::AvailabilityTimeout {
        instance_id: instance_id.to_string(),
        timeout,
    })
}

/// Best effort: a failure is logged and the run continues.
pub async fn apply_security_groups<R: RdsOperations>(rds: &R, instance_id: &str, security_group_ids: &[String]) {
    if security_group_ids.is_empty() {
        return;
    }

    info!("🔐 Changing security groups to {:?}", security_group_ids);
    if let Err(e) = rds.modify_security_groups(instance_id, security_group_ids).await {
        warn!(instance_id, error = %e, "⚠️ Could not apply security groups, continuing");
    }
}
