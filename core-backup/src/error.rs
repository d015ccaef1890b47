use bridge_traits::BridgeError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Source file not found: {0}")]
    SourceMissing(String),

    #[error("Source file is empty: {0}")]
    SourceEmpty(String),

    #[error("Source is not a regular file: {0}")]
    NotAFile(String),

    #[error("Unsupported artifact {name}: expected one of {expected}")]
    UnsupportedExtension { name: String, expected: String },

    #[error("Source vanished: {0}")]
    SourceVanished(String),

    #[error("Source changed during wait: {0}")]
    SourceChanged(String),

    #[error("{0}")]
    VerificationFailed(String),

    #[error("Attempt timed out after {0:?}")]
    AttemptTimeout(Duration),

    #[error("Refusing to delete every artifact with a retention cap of 0 without force")]
    UnsafeRetentionCap,

    #[error("Source directory does not exist: {0}")]
    SourceDirectoryMissing(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Invalid run ID: {0}")]
    InvalidRunId(String),

    #[error("Invalid artifact stage: {0}")]
    InvalidStage(String),

    #[error("Worker pool is closed")]
    WorkerPoolClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl BackupError {
    /// Definitional failures that retrying cannot fix
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            BackupError::SourceMissing(_)
                | BackupError::SourceEmpty(_)
                | BackupError::NotAFile(_)
                | BackupError::UnsupportedExtension { .. }
                | BackupError::SourceVanished(_)
                | BackupError::SourceChanged(_)
        )
    }

    /// Whether the underlying cause is a missing path
    pub fn is_not_found(&self) -> bool {
        match self {
            BackupError::Bridge(e) => e.is_not_found(),
            BackupError::SourceMissing(_)
            | BackupError::SourceVanished(_)
            | BackupError::ArtifactNotFound(_) => true,
            _ => false,
        }
    }
}

impl From<core_runtime::Error> for BackupError {
    fn from(e: core_runtime::Error) -> Self {
        BackupError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_classification() {
        assert!(BackupError::SourceEmpty("a.tar".into()).is_structural());
        assert!(BackupError::UnsupportedExtension {
            name: "a.zip".into(),
            expected: ".tar".into()
        }
        .is_structural());
        assert!(!BackupError::VerificationFailed("Size mismatch".into()).is_structural());
        assert!(!BackupError::AttemptTimeout(Duration::from_secs(1)).is_structural());
    }

    #[test]
    fn test_not_found_from_bridge_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = BackupError::from(BridgeError::Io(io));
        assert!(err.is_not_found());
        assert!(!err.is_structural());
    }

    #[test]
    fn test_changed_message_keeps_prefix() {
        let err = BackupError::SourceChanged("file is empty".into());
        assert_eq!(err.to_string(), "Source changed during wait: file is empty");
    }
}
