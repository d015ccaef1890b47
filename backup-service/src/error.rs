use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("No USB device configured. Set usb_device to one of: {candidates}")]
    DeviceNotConfigured { candidates: String },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Mount failed: {0}")]
    MountFailed(String),

    #[error("Storage invalid: {0}")]
    StorageInvalid(String),

    #[error("Backup file not found: {0}")]
    BackupNotFound(String),

    #[error("Backup already exists at destination: {0} (use --force to copy again)")]
    BackupExists(String),

    #[error("Backup error: {0}")]
    Backup(#[from] core_backup::BackupError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
