// snapshotdump/src/rds/client.rs
use aws_sdk_rds as rds;
use chrono::{DateTime, Utc};
use rds::config::{BehaviorVersion, Credentials, Region};
use tracing::debug;

use super::{Endpoint, InstanceDescription, RdsOperations, RestoreRequest, Snapshot};
use crate::config::AppConfig;
use crate::errors::{AppError, Result, classify_sdk_error};

/// RDS client built from the run's configuration.
pub struct RdsClient {
    client: rds::Client,
}

impl RdsClient {
    /// Static keys from the config are used when both are present, otherwise
    /// the default AWS provider chain.
    pub async fn new(app_config: &AppConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(app_config.region.clone()));

        if let Some(keys) = &app_config.aws_keys {
            loader = loader.credentials_provider(Credentials::new(
                &keys.access_key_id,
                &keys.secret_access_key,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        }

        let sdk_config = loader.load().await;
        Self {
            client: rds::Client::new(&sdk_config),
        }
    }
}

fn to_chrono(time: &rds::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(time.secs(), time.subsec_nanos())
}

fn to_snapshot(snapshot: &rds::types::DbSnapshot) -> Snapshot {
    Snapshot {
        identifier: snapshot.db_snapshot_identifier().unwrap_or_default().to_string(),
        instance_identifier: snapshot.db_instance_identifier().unwrap_or_default().to_string(),
        status: snapshot.status().unwrap_or_default().to_string(),
        created_at: snapshot.snapshot_create_time().and_then(to_chrono),
    }
}

fn to_instance(instance: &rds::types::DbInstance) -> InstanceDescription {
    let endpoint = instance.endpoint().and_then(|ep| {
        let address = ep.address()?;
        let port = u16::try_from(ep.port()?).ok()?;
        Some(Endpoint {
            address: address.to_string(),
            port,
        })
    });

    InstanceDescription {
        identifier: instance.db_instance_identifier().unwrap_or_default().to_string(),
        status: instance.db_instance_status().unwrap_or_default().to_string(),
        engine: instance.engine().unwrap_or_default().to_string(),
        endpoint,
        master_username: instance.master_username().unwrap_or_default().to_string(),
        db_name: instance.db_name().map(str::to_string),
    }
}

impl RdsOperations for RdsClient {
    async fn describe_snapshots(&self, instance_id: &str) -> Result<Vec<Snapshot>> {
        let mut snapshots = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let response = self
                .client
                .describe_db_snapshots()
                .db_instance_identifier(instance_id)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| classify_sdk_error("describe-db-snapshots", e))?;

            snapshots.extend(response.db_snapshots().iter().map(to_snapshot));

            match response.marker() {
                Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        debug!(instance_id, count = snapshots.len(), "Described snapshots");
        Ok(snapshots)
    }

    async fn restore_from_snapshot(&self, request: &RestoreRequest) -> Result<()> {
        self.client
            .restore_db_instance_from_db_snapshot()
            .db_instance_identifier(&request.instance_identifier)
            .db_snapshot_identifier(&request.snapshot_identifier)
            .db_instance_class(&request.instance_class)
            .set_db_subnet_group_name(request.subnet_group.clone())
            .publicly_accessible(request.publicly_accessible)
            .send()
            .await
            .map_err(|e| classify_sdk_error("restore-db-instance-from-db-snapshot", e))?;
        Ok(())
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<InstanceDescription> {
        let response = self
            .client
            .describe_db_instances()
            .db_instance_identifier(instance_id)
            .send()
            .await
            .map_err(|e| classify_sdk_error("describe-db-instances", e))?;

        response
            .db_instances()
            .first()
            .map(to_instance)
            .ok_or_else(|| AppError::NotFound {
                operation: "describe-db-instances",
                message: format!("no instance named \"{}\" in response", instance_id),
            })
    }

    async fn modify_security_groups(&self, instance_id: &str, security_group_ids: &[String]) -> Result<()> {
        self.client
            .modify_db_instance()
            .db_instance_identifier(instance_id)
            .set_vpc_security_group_ids(Some(security_group_ids.to_vec()))
            .apply_immediately(true)
            .send()
            .await
            .map_err(|e| classify_sdk_error("modify-db-instance", e))?;
        Ok(())
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        self.client
            .delete_db_instance()
            .db_instance_identifier(instance_id)
            .skip_final_snapshot(true)
            .send()
            .await
            .map_err(|e| classify_sdk_error("delete-db-instance", e))?;
        Ok(())
    }
}
