// snapshotdump/src/backup/cleanup.rs
use std::future::Future;

use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::rds::RdsOperations;
use crate::utils::retry::with_retry;

/// Runs `body` while the temporary instance exists, then deletes the instance.
///
/// The delete runs on every exit path: success, any error from `body`, and
/// `shutdown` resolving first (the body is dropped, which also kills any
/// running dump process). A failed delete takes precedence over the body's
/// result, because it means a billable instance may have been left behind.
pub async fn with_temporary_instance<R, T, B, S>(
    rds: &R,
    config: &AppConfig,
    instance_id: &str,
    body: B,
    shutdown: S,
) -> Result<T>
where
    R: RdsOperations,
    B: Future<Output = Result<T>>,
    S: Future<Output = ()>,
{
    let outcome = tokio::select! {
        result = body => result,
        _ = shutdown => {
            warn!("🛑 Interrupted, cleaning up \"{}\" before exiting", instance_id);
            Err(AppError::Interrupted)
        }
    };

    match delete_temporary_instance(rds, config, instance_id).await {
        Ok(()) => outcome,
        Err(cleanup_err) => {
            if let Err(primary) = &outcome {
                error!(error = %primary, "❌ Run failed before cleanup");
            }
            error!(
                instance_id,
                error = %cleanup_err,
                "❌ Could not delete temporary instance. It may still be running and billable; delete it manually."
            );
            Err(AppError::CleanupFailed {
                instance_id: instance_id.to_string(),
                source: Box::new(cleanup_err),
            })
        }
    }
}

/// Retry-wrapped delete without a final snapshot. An instance that is already
/// gone counts as deleted.
pub async fn delete_temporary_instance<R: RdsOperations>(
    rds: &R,
    config: &AppConfig,
    instance_id: &str,
) -> Result<()> {
    info!("🧹 Deleting temporary instance \"{}\"", instance_id);

    match with_retry(config.retry_policy(), "delete instance", || rds.delete_instance(instance_id)).await {
        Ok(()) => {
            info!("✓ Terminated \"{}\".", instance_id);
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            info!("✓ Instance \"{}\" no longer exists, nothing to delete.", instance_id);
            Ok(())
        }
        Err(e) => Err(e),
    }
}
