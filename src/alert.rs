use tracing::{error, info};

use crate::config::Config;
use crate::gcp::AlertPublisher;
use crate::types::AlertMessage;

/// Sends `alert` once. Returns whether it was accepted; failures are only logged.
pub async fn publish_alert(
    publisher: &dyn AlertPublisher,
    config: &Config,
    alert: &AlertMessage,
) -> bool {
    let payload = match serde_json::to_vec(alert) {
        Ok(payload) => payload,
        Err(err) => {
            error!(instance_id = %alert.instance_id, error = %err, "failed to serialize alert");
            return false;
        }
    };

    match publisher
        .publish(&config.project_id, &config.alert_topic, &payload)
        .await
    {
        Ok(message_id) => {
            info!(
                instance_id = %alert.instance_id,
                topic = %config.alert_topic,
                message_id = %message_id,
                "backup alert published"
            );
            true
        }
        Err(err) => {
            error!(
                instance_id = %alert.instance_id,
                topic = %config.alert_topic,
                error = %err,
                "failed to publish backup alert"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackupError;
    use crate::gcp::MockAlertPublisher;

    #[tokio::test]
    async fn test_payload_is_alert_json() {
        let mut publisher = MockAlertPublisher::new();
        publisher
            .expect_publish()
            .withf(|project, topic, payload| {
                let alert: AlertMessage = serde_json::from_slice(payload).unwrap();
                project == "proj"
                    && topic == "ops-alerts"
                    && alert.instance_id == "db-7"
                    && alert.error == "boom"
            })
            .times(1)
            .returning(|_, _, _| Ok("msg-1".to_string()));
        let config = Config::new("proj").with_alert_topic("ops-alerts");

        let sent = publish_alert(&publisher, &config, &AlertMessage::new("db-7", "boom")).await;

        assert!(sent);
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let mut publisher = MockAlertPublisher::new();
        publisher.expect_publish().times(1).returning(|_, topic, _| {
            Err(BackupError::Publish {
                topic: topic.to_string(),
                message: "permission denied".to_string(),
            })
        });
        let config = Config::new("proj");

        let sent = publish_alert(&publisher, &config, &AlertMessage::new("db-7", "boom")).await;

        assert!(!sent);
    }
}
