use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::error::BackupError;
use crate::gcp::{AlertPublisher, BackupApi};
use crate::types::OperationStatus;

/// Simulated backend for `--dry-run`: no network calls, fabricated operation ids.
#[derive(Debug, Default)]
pub struct DryRunClient {
    never_done: bool,
    initiated: AtomicU32,
}

impl DryRunClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status check reports the backup as still running.
    pub fn never_done() -> Self {
        Self {
            never_done: true,
            ..Self::default()
        }
    }

    pub fn initiated(&self) -> u32 {
        self.initiated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackupApi for DryRunClient {
    async fn initiate_backup(
        &self,
        project_id: &str,
        instance_id: &str,
    ) -> Result<String, BackupError> {
        let n = self.initiated.fetch_add(1, Ordering::SeqCst) + 1;
        let operation_id = format!(
            "dry-run-backup-op-{}-{}",
            chrono::Utc::now().timestamp(),
            n
        );
        info!(project = %project_id, instance_id, operation_id = %operation_id, "[dry-run] backup run created");
        Ok(operation_id)
    }

    async fn get_operation_status(
        &self,
        _project_id: &str,
        operation_id: &str,
        _instance_id: &str,
    ) -> Result<OperationStatus, BackupError> {
        let status = if self.never_done {
            OperationStatus::pending()
        } else {
            OperationStatus::succeeded()
        };
        info!(operation_id, done = status.done, "[dry-run] operation status");
        Ok(status)
    }
}

#[async_trait]
impl AlertPublisher for DryRunClient {
    async fn publish(
        &self,
        project_id: &str,
        topic: &str,
        payload: &[u8],
    ) -> Result<String, BackupError> {
        info!(
            project = %project_id,
            topic,
            payload = %String::from_utf8_lossy(payload),
            "[dry-run] alert not sent"
        );
        Ok(format!("dry-run-message-{}", chrono::Utc::now().timestamp()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_initiations() {
        let client = DryRunClient::new();
        let first = client.initiate_backup("p", "db-1").await.unwrap();
        let second = client.initiate_backup("p", "db-1").await.unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with("dry-run-backup-op-"));
        assert_eq!(client.initiated(), 2);
        assert!(client.get_operation_status("p", &first, "db-1").await.unwrap().done);
    }

    #[tokio::test]
    async fn test_never_done_reports_pending() {
        let client = DryRunClient::never_done();
        let status = client.get_operation_status("p", "op", "db-1").await.unwrap();
        assert_eq!(status, OperationStatus::pending());
    }
}
