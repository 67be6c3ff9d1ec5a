//! Entry point for one backup event.
//!
//! `handle_event` never fails: a malformed event, an exhausted retry budget
//! and an undeliverable alert all end up in the log and in the returned
//! [`Outcome`], never as an error for the caller.

use base64::Engine;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::alert::publish_alert;
use crate::config::Config;
use crate::error::BackupError;
use crate::gcp::{AlertPublisher, BackupApi};
use crate::retry::{attempt_backup, RetryController, RetryOutcome};
use crate::types::{AlertMessage, BackupEvent, PushEnvelope};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The event was rejected before any backup call.
    Rejected { reason: String },
    Succeeded {
        instance_id: String,
        retries: u32,
    },
    Exhausted {
        instance_id: String,
        retries: u32,
        last_error: String,
        alert_published: bool,
    },
}

/// Extracts the instance id from a raw event body.
///
/// Accepts either `{"instance_id": "..."}` or a Pub/Sub push envelope whose
/// base64 `message.data` holds that object. A top-level `instance_id` always
/// wins, so other fields named `message` are ignored.
pub fn decode_event(payload: &[u8]) -> Result<String, BackupError> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| BackupError::validation(format!("event is not valid JSON: {e}")))?;

    let pushed = value.get("instance_id").is_none()
        && value
            .get("message")
            .and_then(|message| message.get("data"))
            .is_some_and(Value::is_string);

    let event: BackupEvent = if pushed {
        let envelope: PushEnvelope = serde_json::from_value(value)
            .map_err(|e| BackupError::validation(format!("malformed push envelope: {e}")))?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(envelope.message.data.trim())
            .map_err(|e| BackupError::validation(format!("message data is not base64: {e}")))?;
        serde_json::from_slice(&data)
            .map_err(|e| BackupError::validation(format!("message data is not an event: {e}")))?
    } else {
        serde_json::from_value(value)
            .map_err(|e| BackupError::validation(format!("malformed event: {e}")))?
    };

    match event.instance_id {
        Some(id) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        Some(_) => Err(BackupError::validation("instance_id is empty")),
        None => Err(BackupError::validation("instance_id is missing")),
    }
}

pub struct BackupHandler {
    config: Config,
    api: Box<dyn BackupApi>,
    publisher: Box<dyn AlertPublisher>,
}

impl BackupHandler {
    pub fn new(
        config: Config,
        api: Box<dyn BackupApi>,
        publisher: Box<dyn AlertPublisher>,
    ) -> Self {
        Self {
            config,
            api,
            publisher,
        }
    }

    pub async fn handle_event(&self, payload: &[u8]) -> Outcome {
        match decode_event(payload) {
            Ok(instance_id) => self.run_backup(&instance_id).await,
            Err(err) => {
                error!(error = %err, "rejecting backup event");
                Outcome::Rejected {
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Runs the initial attempt, then retries, then alerts if nothing worked.
    pub async fn run_backup(&self, instance_id: &str) -> Outcome {
        info!(instance_id, project = %self.config.project_id, "starting backup");

        let first = attempt_backup(
            self.api.as_ref(),
            &self.config.project_id,
            instance_id,
            std::time::Duration::ZERO,
        )
        .await;

        let initial_error = match first {
            Ok(operation_id) => {
                info!(instance_id, operation_id = %operation_id, "backup completed");
                return Outcome::Succeeded {
                    instance_id: instance_id.to_string(),
                    retries: 0,
                };
            }
            Err(failure) => {
                warn!(instance_id, error = %failure, "initial backup attempt failed");
                failure.to_string()
            }
        };

        let controller = RetryController::new(self.api.as_ref(), &self.config);
        match controller.run(instance_id, initial_error).await {
            RetryOutcome::Succeeded { retries } => Outcome::Succeeded {
                instance_id: instance_id.to_string(),
                retries,
            },
            RetryOutcome::Exhausted {
                retries,
                last_error,
            } => {
                error!(
                    instance_id,
                    retries,
                    error = %last_error,
                    "backup failed after all retries"
                );
                let alert = AlertMessage::new(instance_id, last_error.clone());
                let alert_published =
                    publish_alert(self.publisher.as_ref(), &self.config, &alert).await;

                Outcome::Exhausted {
                    instance_id: instance_id.to_string(),
                    retries,
                    last_error,
                    alert_published,
                }
            }
        }
    }
}
