use std::env;
use std::fmt;
use std::path::PathBuf;

use clap::Parser;
use clap::builder::RangedU64ValueParser;

use crate::error::{CosError, Result};

pub const DEFAULT_STORAGE_CLASS: &str = "STANDARD";
pub const DEFAULT_PART_SIZE_MIB: u64 = 8;
pub const DEFAULT_MAX_THREADS: usize = 5;
/// Largest part COS accepts in a multipart upload (5 GiB).
pub const MAX_PART_SIZE_MIB: u64 = 5 * 1024;

const MIB: u64 = 1024 * 1024;

/// Tencent Cloud API credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub secret_id: String,
    pub secret_key: String,
    /// Session token for temporary credentials
    pub token: Option<String>,
}

impl Credentials {
    /// First 8 characters of the secret id, safe to print.
    pub fn masked_id(&self) -> String {
        let prefix: String = self.secret_id.chars().take(8).collect();
        format!("{}...", prefix)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_id", &self.masked_id())
            .field("secret_key", &"<redacted>")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Connection settings for one COS bucket.
#[derive(Debug, Clone)]
pub struct CosSettings {
    pub bucket: String,
    pub region: String,
    pub credentials: Credentials,
    /// Overrides the regional endpoint, e.g. for an S3-compatible test server
    pub endpoint: Option<String>,
}

impl CosSettings {
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://cos.{}.myqcloud.com", self.region),
        }
    }

    /// Resolve settings purely from `COS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        PartialSettings::from_env().resolve()
    }
}

/// Where the raw values came from; only affects how missing fields are named.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SettingsSource {
    #[default]
    CommandLine,
    Environment,
}

/// Settings as collected, before required fields are checked.
#[derive(Debug, Clone, Default)]
pub struct PartialSettings {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub secret_id: Option<String>,
    pub secret_key: Option<String>,
    pub token: Option<String>,
    pub endpoint: Option<String>,
    pub source: SettingsSource,
}

impl PartialSettings {
    pub fn from_env() -> Self {
        Self {
            bucket: env::var("COS_BUCKET_NAME").ok(),
            region: env::var("COS_REGION").ok(),
            secret_id: env::var("COS_SECRET_ID").ok(),
            secret_key: env::var("COS_SECRET_KEY").ok(),
            token: env::var("COS_TOKEN").ok(),
            endpoint: env::var("COS_ENDPOINT").ok(),
            source: SettingsSource::Environment,
        }
    }

    /// Check required fields, reporting every missing one at once.
    pub fn resolve(self) -> Result<CosSettings> {
        let bucket = non_blank(self.bucket);
        let region = non_blank(self.region);
        let secret_id = non_blank(self.secret_id);
        let secret_key = non_blank(self.secret_key);

        let required = [
            (bucket.is_none(), "--bucket", "COS_BUCKET_NAME"),
            (region.is_none(), "--region", "COS_REGION"),
            (secret_id.is_none(), "--secret-id", "COS_SECRET_ID"),
            (secret_key.is_none(), "--secret-key", "COS_SECRET_KEY"),
        ];
        let missing: Vec<String> = required
            .iter()
            .filter(|(absent, _, _)| *absent)
            .map(|(_, flag, var)| match self.source {
                SettingsSource::CommandLine => format!("{} or {}", flag, var),
                SettingsSource::Environment => var.to_string(),
            })
            .collect();

        match (bucket, region, secret_id, secret_key) {
            (Some(bucket), Some(region), Some(secret_id), Some(secret_key)) => Ok(CosSettings {
                bucket,
                region,
                credentials: Credentials {
                    secret_id,
                    secret_key,
                    token: non_blank(self.token),
                },
                endpoint: non_blank(self.endpoint),
            }),
            _ => Err(CosError::ConfigurationMissing(missing)),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Knobs passed through to the storage client for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// COS storage class (STANDARD, STANDARD_IA, ARCHIVE, ...)
    pub storage_class: String,

    /// Content-Type override; only honored by direct uploads
    pub content_type: Option<String>,

    /// Multipart chunk size in MiB
    pub part_size_mib: u64,

    /// Maximum concurrent part uploads
    pub max_threads: usize,

    /// Send a Content-MD5 with every multipart part
    pub verify_checksum: bool,

    /// Canned ACL, e.g. private or public-read
    pub acl: Option<String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            storage_class: DEFAULT_STORAGE_CLASS.to_string(),
            content_type: None,
            part_size_mib: DEFAULT_PART_SIZE_MIB,
            max_threads: DEFAULT_MAX_THREADS,
            verify_checksum: false,
            acl: None,
        }
    }
}

impl UploadOptions {
    /// Part size in bytes, rejecting values outside 1..=5120 MiB.
    pub fn part_size_bytes(&self) -> Result<u64> {
        self.part_size_mib
            .checked_mul(MIB)
            .filter(|bytes| (MIB..=MAX_PART_SIZE_MIB * MIB).contains(bytes))
            .ok_or_else(|| {
                CosError::InvalidConfiguration(format!(
                    "--part-size must be between 1 and {} MiB, got {}",
                    MAX_PART_SIZE_MIB, self.part_size_mib
                ))
            })
    }
}

/// One upload invocation, fully validated.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub local_path: PathBuf,
    pub destination_key: Option<String>,
    pub settings: CosSettings,
    pub options: UploadOptions,
    pub dry_run: bool,
}

/// Upload a local file to Tencent COS.
///
/// Connection values fall back to `COS_*` environment variables.
#[derive(Debug, Clone, Parser)]
#[command(name = "cos-upload", version, about = "Upload a local file to Tencent COS")]
pub struct UploadArgs {
    /// Path to the local file to upload
    pub local_path: PathBuf,

    /// Destination object key in COS (defaults to the file name)
    #[arg(long)]
    pub key: Option<String>,

    /// COS bucket name
    #[arg(long, env = "COS_BUCKET_NAME")]
    pub bucket: Option<String>,

    /// COS region, e.g. ap-singapore
    #[arg(long, env = "COS_REGION")]
    pub region: Option<String>,

    /// Tencent Cloud Secret ID
    #[arg(long, env = "COS_SECRET_ID", hide_env_values = true)]
    pub secret_id: Option<String>,

    /// Tencent Cloud Secret Key
    #[arg(long, env = "COS_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Temporary credential token (optional)
    #[arg(long, env = "COS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Custom endpoint URL instead of https://cos.<region>.myqcloud.com
    #[arg(long, env = "COS_ENDPOINT")]
    pub endpoint: Option<String>,

    /// COS storage class (STANDARD, STANDARD_IA, ARCHIVE, etc.)
    #[arg(long, default_value = DEFAULT_STORAGE_CLASS)]
    pub storage_class: String,

    /// Override Content-Type for small files (<=5MiB)
    #[arg(long)]
    pub content_type: Option<String>,

    /// Multipart chunk size in MiB for large files (1-5120)
    #[arg(long, default_value_t = DEFAULT_PART_SIZE_MIB, value_parser = RangedU64ValueParser::<u64>::new().range(1..=MAX_PART_SIZE_MIB))]
    pub part_size: u64,

    /// Max concurrent part uploads for multipart upload
    #[arg(long, default_value_t = DEFAULT_MAX_THREADS, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    pub threads: usize,

    /// Enable MD5 check for multipart upload
    #[arg(long)]
    pub md5: bool,

    /// ACL, e.g. private, public-read
    #[arg(long)]
    pub acl: Option<String>,

    /// Print planned upload and exit
    #[arg(long)]
    pub dry_run: bool,
}

impl UploadArgs {
    pub fn into_request(self) -> Result<UploadRequest> {
        let settings = PartialSettings {
            bucket: self.bucket,
            region: self.region,
            secret_id: self.secret_id,
            secret_key: self.secret_key,
            token: self.token,
            endpoint: self.endpoint,
            source: SettingsSource::CommandLine,
        }
        .resolve()?;

        Ok(UploadRequest {
            local_path: self.local_path,
            destination_key: self.key,
            settings,
            options: UploadOptions {
                storage_class: self.storage_class,
                content_type: self.content_type,
                part_size_mib: self.part_size,
                max_threads: self.threads,
                verify_checksum: self.md5,
                acl: self.acl,
            },
            dry_run: self.dry_run,
        })
    }
}
