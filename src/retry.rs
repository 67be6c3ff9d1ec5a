//! Retry loop around a single backup attempt.
//!
//! An attempt is: start a backup run, sleep, read the operation once. The
//! operation is not polled until it finishes; a run that is still in progress
//! when the sleep ends counts as a failed attempt.

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{BackupError, ErrorKind};
use crate::gcp::BackupApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Retry `n` (0-indexed) is about to run.
    Attempting(u32),
    Succeeded,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Succeeded { retries: u32 },
    Exhausted { retries: u32, last_error: String },
}

/// Why a single attempt did not produce a finished backup.
#[derive(Debug)]
pub enum AttemptFailure {
    Api(BackupError),
    Incomplete { operation_id: String },
    Failed { operation_id: String, message: String },
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Api(err) => write!(f, "{err}"),
            AttemptFailure::Incomplete { operation_id } => {
                write!(f, "backup operation {operation_id} did not complete")
            }
            AttemptFailure::Failed {
                operation_id,
                message,
            } => write!(f, "backup operation {operation_id} failed: {message}"),
        }
    }
}

/// Delay before the status check of retry `attempt`: `unit * 2^attempt`.
pub fn backoff_delay(unit: Duration, attempt: u32) -> Duration {
    unit.saturating_mul(2u32.saturating_pow(attempt))
}

/// Runs one initiate/wait/check cycle and returns the operation id on success.
pub async fn attempt_backup(
    api: &dyn BackupApi,
    project_id: &str,
    instance_id: &str,
    delay: Duration,
) -> Result<String, AttemptFailure> {
    let operation_id = api
        .initiate_backup(project_id, instance_id)
        .await
        .map_err(AttemptFailure::Api)?;

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let status = api
        .get_operation_status(project_id, &operation_id, instance_id)
        .await
        .map_err(AttemptFailure::Api)?;

    match (status.done, status.error) {
        (true, None) => Ok(operation_id),
        (true, Some(message)) => Err(AttemptFailure::Failed {
            operation_id,
            message,
        }),
        (false, _) => Err(AttemptFailure::Incomplete { operation_id }),
    }
}

pub struct RetryController<'a> {
    api: &'a dyn BackupApi,
    project_id: &'a str,
    retry_limit: u32,
    backoff_unit: Duration,
}

impl<'a> RetryController<'a> {
    pub fn new(api: &'a dyn BackupApi, config: &'a Config) -> Self {
        Self {
            api,
            project_id: &config.project_id,
            retry_limit: config.retry_limit,
            backoff_unit: config.backoff_unit,
        }
    }

    /// Retries the backup until one attempt succeeds or the limit is reached.
    ///
    /// `last_error` describes the failure that triggered the retries; it is
    /// reported back unchanged if no retry runs at all.
    pub async fn run(&self, instance_id: &str, mut last_error: String) -> RetryOutcome {
        let mut state = RetryState::Attempting(0);
        let mut retries = 0;

        loop {
            state = match state {
                RetryState::Attempting(n) if n >= self.retry_limit => RetryState::Exhausted,
                RetryState::Attempting(n) => {
                    let delay = backoff_delay(self.backoff_unit, n);
                    retries = n + 1;
                    info!(
                        instance_id,
                        attempt = retries,
                        delay_secs = delay.as_secs_f64(),
                        "retrying backup"
                    );

                    match attempt_backup(self.api, self.project_id, instance_id, delay).await {
                        Ok(operation_id) => {
                            info!(
                                instance_id,
                                operation_id = %operation_id,
                                attempt = retries,
                                "backup completed"
                            );
                            RetryState::Succeeded
                        }
                        Err(failure) => {
                            self.log_failure(instance_id, retries, &failure);
                            last_error = failure.to_string();
                            RetryState::Attempting(n + 1)
                        }
                    }
                }
                RetryState::Succeeded => return RetryOutcome::Succeeded { retries },
                RetryState::Exhausted => {
                    return RetryOutcome::Exhausted {
                        retries,
                        last_error,
                    }
                }
            };
        }
    }

    fn log_failure(&self, instance_id: &str, attempt: u32, failure: &AttemptFailure) {
        match failure {
            AttemptFailure::Api(err) => match err.kind() {
                ErrorKind::Initiation => {
                    warn!(instance_id, attempt, error = %err, "backup initiation failed")
                }
                ErrorKind::StatusQuery => {
                    warn!(instance_id, attempt, error = %err, "operation status query failed")
                }
                ErrorKind::Validation | ErrorKind::Publish => {
                    warn!(instance_id, attempt, error = %err, "backup attempt failed")
                }
            },
            AttemptFailure::Incomplete { operation_id } => {
                warn!(
                    instance_id,
                    attempt,
                    operation_id = %operation_id,
                    "backup not done after wait"
                )
            }
            AttemptFailure::Failed {
                operation_id,
                message,
            } => warn!(
                instance_id,
                attempt,
                operation_id = %operation_id,
                error = %message,
                "backup operation finished with an error"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::MockBackupApi;
    use crate::types::OperationStatus;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let unit = Duration::from_secs(1);
        assert_eq!(backoff_delay(unit, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(unit, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(unit, 2), Duration::from_secs(4));
        assert_eq!(
            backoff_delay(Duration::from_millis(250), 3),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_backoff_saturates() {
        assert_eq!(
            backoff_delay(Duration::from_secs(1), 200),
            Duration::from_secs(u32::MAX as u64)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_with_error_is_a_failure() {
        let mut api = MockBackupApi::new();
        api.expect_initiate_backup()
            .returning(|_, _| Ok("op-9".to_string()));
        api.expect_get_operation_status().returning(|_, _, _| {
            Ok(OperationStatus {
                done: true,
                error: Some("INTERNAL_ERROR".to_string()),
            })
        });

        let result = attempt_backup(&api, "proj", "db-1", Duration::ZERO).await;
        match result {
            Err(AttemptFailure::Failed {
                operation_id,
                message,
            }) => {
                assert_eq!(operation_id, "op-9");
                assert_eq!(message, "INTERNAL_ERROR");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_reports_initial_error() {
        let api = MockBackupApi::new();
        let config = Config::new("proj").with_retry_limit(0);

        let outcome = RetryController::new(&api, &config)
            .run("db-1", "first failure".to_string())
            .await;

        assert_eq!(
            outcome,
            RetryOutcome::Exhausted {
                retries: 0,
                last_error: "first failure".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_initiation_error_counts_toward_limit() {
        let mut api = MockBackupApi::new();
        api.expect_initiate_backup().times(2).returning(|_, instance| {
            Err(BackupError::Initiation {
                instance_id: instance.to_string(),
                message: "quota exceeded".to_string(),
            })
        });
        api.expect_get_operation_status().never();
        let config = Config::new("proj").with_retry_limit(2);

        let outcome = RetryController::new(&api, &config)
            .run("db-3", "initial".to_string())
            .await;

        assert_eq!(
            outcome,
            RetryOutcome::Exhausted {
                retries: 2,
                last_error: "failed to start backup for instance db-3: quota exceeded"
                    .to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_error_then_success() {
        let mut api = MockBackupApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_initiate_backup()
            .times(2)
            .returning(|_, _| Ok("op".to_string()));
        api.expect_get_operation_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, op, instance| {
                Err(BackupError::StatusQuery {
                    instance_id: instance.to_string(),
                    operation_id: op.to_string(),
                    message: "503".to_string(),
                })
            });
        api.expect_get_operation_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(OperationStatus::succeeded()));
        let config = Config::new("proj");

        let outcome = RetryController::new(&api, &config)
            .run("db-4", "initial".to_string())
            .await;

        assert_eq!(outcome, RetryOutcome::Succeeded { retries: 2 });
    }
}
