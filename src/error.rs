use thiserror::Error;

/// Which stage of a backup invocation produced a [`BackupError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Initiation,
    StatusQuery,
    Publish,
}

#[derive(Debug, Error)]
pub enum BackupError {
    /// The inbound event could not be turned into an instance id.
    #[error("invalid backup event: {reason}")]
    Validation { reason: String },

    #[error("failed to start backup for instance {instance_id}: {message}")]
    Initiation { instance_id: String, message: String },

    #[error("failed to query operation {operation_id} for instance {instance_id}: {message}")]
    StatusQuery {
        instance_id: String,
        operation_id: String,
        message: String,
    },

    #[error("failed to publish alert to topic {topic}: {message}")]
    Publish { topic: String, message: String },
}

impl BackupError {
    pub fn validation(reason: impl Into<String>) -> Self {
        BackupError::Validation {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::Validation { .. } => ErrorKind::Validation,
            BackupError::Initiation { .. } => ErrorKind::Initiation,
            BackupError::StatusQuery { .. } => ErrorKind::StatusQuery,
            BackupError::Publish { .. } => ErrorKind::Publish,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("project id cannot be empty")]
    EmptyProject,

    #[error("alert topic cannot be empty")]
    EmptyAlertTopic,
}
