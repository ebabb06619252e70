pub mod config;
pub mod error;
pub mod infrastructure;
pub mod services;
pub mod telemetry;
pub mod utils;

pub use config::{CosSettings, Credentials, UploadArgs, UploadOptions, UploadRequest};
pub use error::{CosError, Result};
pub use services::storage::{CosStorageService, MultipartUpload, PutObject, StorageClient};
