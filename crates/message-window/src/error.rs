use crate::gate::FetchMode;
use crate::model::MessageId;
use crate::source::SourceError;
use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("{mode} fetch failed: {source}")]
    Source {
        mode: FetchMode,
        #[source]
        source: SourceError,
    },
    #[error("{mode} fetch timed out after {after:?}")]
    TimedOut { mode: FetchMode, after: Duration },
    #[error("message {target} did not appear after {attempts} checks")]
    TargetNotFound { target: MessageId, attempts: u32 },
}

impl WindowError {
    /// Whether offering the user a retry makes sense. Nothing is retried
    /// automatically.
    pub fn is_retryable(&self) -> bool {
        match self {
            WindowError::Source { source, .. } => source.is_retryable(),
            WindowError::TimedOut { .. } => true,
            WindowError::TargetNotFound { .. } => true,
        }
    }

    pub fn mode(&self) -> Option<FetchMode> {
        match self {
            WindowError::Source { mode, .. } | WindowError::TimedOut { mode, .. } => Some(*mode),
            WindowError::TargetNotFound { .. } => None,
        }
    }
}
