use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use tokio::process::Command as AsyncCommand;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::BackupError;
use crate::types::{
    BackupRunRequest, GcpOperationResponse, MetadataToken, OperationStatus, PublishRequest,
    PublishResponse, PubsubMessage,
};

const SQLADMIN_BASE: &str = "https://sqladmin.googleapis.com/v1";
const PUBSUB_BASE: &str = "https://pubsub.googleapis.com/v1";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait BackupApi: Send + Sync {
    /// Starts an on-demand backup run and returns its operation id.
    async fn initiate_backup(&self, project_id: &str, instance_id: &str)
        -> Result<String, BackupError>;

    /// Reads the operation once. Does not wait for it to finish.
    async fn get_operation_status(
        &self,
        project_id: &str,
        operation_id: &str,
        instance_id: &str,
    ) -> Result<OperationStatus, BackupError>;
}

#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait AlertPublisher: Send + Sync {
    /// Publishes `payload` and returns the message id assigned by the channel.
    async fn publish(
        &self,
        project_id: &str,
        topic: &str,
        payload: &[u8],
    ) -> Result<String, BackupError>;
}

/// REST client for Cloud SQL Admin and Pub/Sub.
///
/// Clones share one access token, fetched on first use and kept for the
/// life of the invocation.
#[derive(Clone)]
pub struct GcpClient {
    client: Client,
    token: Arc<OnceCell<String>>,
}

impl Default for GcpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GcpClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            token: Arc::new(OnceCell::new()),
        }
    }

    /// Client that uses `token` instead of asking the metadata server or gcloud.
    pub fn with_access_token(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token: Arc::new(OnceCell::new_with(Some(token.into()))),
        }
    }

    async fn get_access_token(&self) -> Result<String> {
        self.token
            .get_or_try_init(|| self.fetch_access_token())
            .await
            .cloned()
    }

    async fn fetch_access_token(&self) -> Result<String> {
        match self.metadata_token().await {
            Ok(token) => Ok(token),
            Err(err) => {
                debug!(error = %err, "metadata server token unavailable, falling back to gcloud");
                self.gcloud_token().await
            }
        }
    }

    async fn metadata_token(&self) -> Result<String> {
        let response = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .timeout(std::time::Duration::from_secs(2))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("metadata server returned {}", response.status()));
        }

        let token: MetadataToken = response.json().await?;
        Ok(token.access_token)
    }

    async fn gcloud_token(&self) -> Result<String> {
        let output = AsyncCommand::new("gcloud")
            .args(["auth", "print-access-token"])
            .output()
            .await
            .context("failed to run gcloud")?;

        if !output.status.success() {
            return Err(anyhow!("Failed to get access token"));
        }

        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }

    async fn post_backup_run(&self, project_id: &str, instance_id: &str) -> Result<String> {
        let token = self.get_access_token().await?;
        let url = format!(
            "{}/projects/{}/instances/{}/backupRuns",
            SQLADMIN_BASE, project_id, instance_id
        );

        let request_body = BackupRunRequest {
            description: format!("event-triggered backup of {instance_id}"),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("{}: {}", status, error_text));
        }

        let result: GcpOperationResponse = response.json().await?;

        match result.name {
            Some(name) => {
                let operation_id = name.rsplit('/').next().unwrap_or(&name);
                Ok(operation_id.to_string())
            }
            None => Err(anyhow!("No operation ID returned from backup request")),
        }
    }

    async fn fetch_operation(&self, project_id: &str, operation_id: &str) -> Result<OperationStatus> {
        let token = self.get_access_token().await?;
        let url = format!(
            "{}/projects/{}/operations/{}",
            SQLADMIN_BASE, project_id, operation_id
        );

        let response = self.client.get(&url).bearer_auth(&token).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Failed to get operation status: {}",
                response.status()
            ));
        }

        let api_response: GcpOperationResponse = response.json().await?;

        Ok(OperationStatus {
            done: api_response.status.as_deref() == Some("DONE"),
            error: api_response.error.map(|e| e.describe()),
        })
    }

    async fn post_publish(&self, project_id: &str, topic: &str, payload: &[u8]) -> Result<String> {
        let token = self.get_access_token().await?;
        let url = format!("{}/projects/{}/topics/{}:publish", PUBSUB_BASE, project_id, topic);

        let request_body = PublishRequest {
            messages: vec![PubsubMessage {
                data: base64::engine::general_purpose::STANDARD.encode(payload),
            }],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("{}: {}", status, error_text));
        }

        let result: PublishResponse = response.json().await?;
        result
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No message ID returned from publish request"))
    }
}

#[async_trait]
impl BackupApi for GcpClient {
    async fn initiate_backup(
        &self,
        project_id: &str,
        instance_id: &str,
    ) -> Result<String, BackupError> {
        self.post_backup_run(project_id, instance_id)
            .await
            .map_err(|err| BackupError::Initiation {
                instance_id: instance_id.to_string(),
                message: format!("{err:#}"),
            })
    }

    async fn get_operation_status(
        &self,
        project_id: &str,
        operation_id: &str,
        instance_id: &str,
    ) -> Result<OperationStatus, BackupError> {
        self.fetch_operation(project_id, operation_id)
            .await
            .map_err(|err| BackupError::StatusQuery {
                instance_id: instance_id.to_string(),
                operation_id: operation_id.to_string(),
                message: format!("{err:#}"),
            })
    }
}

#[async_trait]
impl AlertPublisher for GcpClient {
    async fn publish(
        &self,
        project_id: &str,
        topic: &str,
        payload: &[u8],
    ) -> Result<String, BackupError> {
        self.post_publish(project_id, topic, payload)
            .await
            .map_err(|err| BackupError::Publish {
                topic: topic.to_string(),
                message: format!("{err:#}"),
            })
    }
}
