use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

/// Process exit code for a successful run, including a dry run.
pub const EXIT_SUCCESS: u8 = 0;
/// Process exit code when the storage service rejects or fails a request.
pub const EXIT_REMOTE_FAILURE: u8 = 1;
/// Process exit code when the upload source does not exist.
pub const EXIT_NOT_FOUND: u8 = 2;
/// Process exit code when configuration is absent or out of range (sysexits `EX_USAGE`).
pub const EXIT_USAGE: u8 = 64;

#[derive(Error, Debug)]
pub enum CosError {
    #[error("Missing required configuration: {}", .0.join(", "))]
    ConfigurationMissing(Vec<String>),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Local file not found: {}", .0.display())]
    LocalFileNotFound(PathBuf),

    #[error("{0}")]
    RemoteOperationFailure(String),
}

impl CosError {
    pub fn remote(err: anyhow::Error) -> Self {
        CosError::RemoteOperationFailure(format!("{:#}", err))
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            CosError::ConfigurationMissing(_) | CosError::InvalidConfiguration(_) => EXIT_USAGE,
            CosError::LocalFileNotFound(_) => EXIT_NOT_FOUND,
            CosError::RemoteOperationFailure(_) => EXIT_REMOTE_FAILURE,
        }
    }
}

impl From<&CosError> for ExitCode {
    fn from(err: &CosError) -> Self {
        ExitCode::from(err.exit_code())
    }
}

pub type Result<T> = std::result::Result<T, CosError>;
