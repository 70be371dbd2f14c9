// src/health/error.rs

/// Outcome of a failed probe invocation.
///
/// Timeouts and contained panics are ordinary failures for evaluation purposes;
/// only the error text tells them apart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    #[error("{0}")]
    Failed(String),

    #[error("check timed out")]
    TimedOut,

    #[error("{0}")]
    Panicked(String),
}

impl CheckError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CheckError::TimedOut)
    }
}

impl From<anyhow::Error> for CheckError {
    fn from(err: anyhow::Error) -> Self {
        CheckError::Failed(format!("{:#}", err))
    }
}

/// Registration and settings errors, raised before the engine starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("check name must not be empty")]
    EmptyCheckName,

    #[error("duplicate check name: {0}")]
    DuplicateCheckName(String),

    #[error("scheduled check {0} must have a positive refresh interval")]
    ZeroInterval(String),

    #[error("invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}
