use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of an inbound backup event.
#[derive(Debug, Deserialize)]
pub struct BackupEvent {
    pub instance_id: Option<String>,
}

/// Pub/Sub push delivery wrapping a [`BackupEvent`] in base64.
#[derive(Debug, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
}

#[derive(Debug, Deserialize)]
pub struct PushMessage {
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    pub done: bool,
    pub error: Option<String>,
}

impl OperationStatus {
    pub fn pending() -> Self {
        Self {
            done: false,
            error: None,
        }
    }

    pub fn succeeded() -> Self {
        Self {
            done: true,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub instance_id: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertMessage {
    pub fn new(instance_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BackupRunRequest {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct GcpOperationResponse {
    pub name: Option<String>,
    pub status: Option<String>,
    pub error: Option<GcpOperationErrors>,
}

#[derive(Debug, Deserialize)]
pub struct GcpOperationErrors {
    #[serde(default)]
    pub errors: Vec<GcpOperationError>,
}

#[derive(Debug, Deserialize)]
pub struct GcpOperationError {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl GcpOperationErrors {
    pub fn describe(&self) -> String {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| match (&e.code, &e.message) {
                (Some(code), Some(message)) => format!("{code}: {message}"),
                (None, Some(message)) => message.clone(),
                (Some(code), None) => code.clone(),
                (None, None) => "unknown error".to_string(),
            })
            .collect();

        if parts.is_empty() {
            "operation failed without details".to_string()
        } else {
            parts.join("; ")
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublishRequest {
    pub messages: Vec<PubsubMessage>,
}

#[derive(Debug, Serialize)]
pub struct PubsubMessage {
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct PublishResponse {
    #[serde(rename = "messageIds", default)]
    pub message_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataToken {
    pub access_token: String,
}
