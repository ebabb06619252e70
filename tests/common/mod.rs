#![allow(dead_code)]

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use cos_tools::config::{CosSettings, Credentials, UploadOptions, UploadRequest};
use cos_tools::{MultipartUpload, PutObject, StorageClient};

pub const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List { prefix: String, max_keys: i32 },
    Put(PutObject),
    Multipart(MultipartUpload),
}

/// In-memory `StorageClient` that records every call.
#[derive(Default)]
pub struct RecordingStorage {
    keys: Vec<String>,
    failure: Option<String>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingStorage {
    pub fn with_keys(keys: Vec<String>) -> Self {
        Self {
            keys,
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        match &self.failure {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StorageClient for RecordingStorage {
    async fn list_objects(&self, prefix: &str, max_keys: i32) -> Result<Vec<String>> {
        self.record(Call::List {
            prefix: prefix.to_string(),
            max_keys,
        })?;
        Ok(self.keys.clone())
    }

    async fn put_object(&self, request: &PutObject) -> Result<()> {
        // The real client streams from the path, so it must be readable.
        std::fs::metadata(&request.path)?;
        self.record(Call::Put(request.clone()))
    }

    async fn multipart_upload(&self, request: &MultipartUpload) -> Result<()> {
        self.record(Call::Multipart(request.clone()))
    }
}

pub fn settings() -> CosSettings {
    CosSettings {
        bucket: "example-1250000000".to_string(),
        region: "ap-singapore".to_string(),
        credentials: Credentials {
            secret_id: "AKIDexample0123".to_string(),
            secret_key: "secret".to_string(),
            token: None,
        },
        endpoint: None,
    }
}

pub fn request(local_path: &Path) -> UploadRequest {
    UploadRequest {
        local_path: local_path.to_path_buf(),
        destination_key: None,
        settings: settings(),
        options: UploadOptions::default(),
        dry_run: false,
    }
}

/// Sparse file of exactly `size` bytes.
pub fn sized_file(dir: &Path, name: &str, size: u64) -> PathBuf {
    let path = dir.join(name);
    File::create(&path).unwrap().set_len(size).unwrap();
    path
}
