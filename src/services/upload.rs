use std::fmt;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{UploadOptions, UploadRequest};
use crate::error::{CosError, Result};
use crate::services::storage::{
    MultipartUpload, PutObject, StorageClient, effective_part_size, part_count,
};
use crate::utils::format::format_bytes;

/// Files up to and including this size go through a single PUT.
pub const SMALL_FILE_THRESHOLD: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    Direct,
    Multipart,
}

impl UploadStrategy {
    pub fn for_size(size_bytes: u64, threshold: u64) -> Self {
        if size_bytes <= threshold {
            UploadStrategy::Direct
        } else {
            UploadStrategy::Multipart
        }
    }
}

impl fmt::Display for UploadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStrategy::Direct => write!(f, "direct"),
            UploadStrategy::Multipart => write!(f, "multipart"),
        }
    }
}

/// Everything derived from the local file for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUpload {
    pub local_path: PathBuf,
    pub key: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub strategy: UploadStrategy,
}

pub fn resolve(
    local_path: &Path,
    explicit_key: Option<&str>,
    explicit_content_type: Option<&str>,
) -> Result<ResolvedUpload> {
    resolve_with_threshold(
        local_path,
        explicit_key,
        explicit_content_type,
        SMALL_FILE_THRESHOLD,
    )
}

pub fn resolve_with_threshold(
    local_path: &Path,
    explicit_key: Option<&str>,
    explicit_content_type: Option<&str>,
    threshold: u64,
) -> Result<ResolvedUpload> {
    let not_found = || CosError::LocalFileNotFound(local_path.to_path_buf());

    let metadata = match std::fs::metadata(local_path) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return Err(not_found()),
    };

    let key = match explicit_key.filter(|k| !k.trim().is_empty()) {
        Some(key) => key.to_string(),
        None => local_path
            .file_name()
            .ok_or_else(not_found)?
            .to_string_lossy()
            .into_owned(),
    };

    let content_type = match explicit_content_type {
        Some(content_type) => content_type.to_string(),
        None => infer_content_type(local_path),
    };

    let size_bytes = metadata.len();

    Ok(ResolvedUpload {
        local_path: local_path.to_path_buf(),
        key,
        content_type,
        size_bytes,
        strategy: UploadStrategy::for_size(size_bytes, threshold),
    })
}

/// Extension-based guess, falling back to `application/octet-stream`.
pub fn infer_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .map(str::to_string)
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
}

/// Send the file with the strategy chosen at resolution time and return the
/// object key.
pub async fn upload<S>(
    storage: &S,
    resolved: &ResolvedUpload,
    options: &UploadOptions,
) -> Result<String>
where
    S: StorageClient + ?Sized,
{
    let part_size_bytes = options.part_size_bytes()?;
    let res = match resolved.strategy {
        UploadStrategy::Direct => {
            storage
                .put_object(&PutObject {
                    key: resolved.key.clone(),
                    path: resolved.local_path.clone(),
                    content_type: resolved.content_type.clone(),
                    storage_class: options.storage_class.clone(),
                    acl: options.acl.clone(),
                })
                .await
        }
        UploadStrategy::Multipart => {
            // Content type is not sent on this path; COS derives it.
            storage
                .multipart_upload(&MultipartUpload {
                    key: resolved.key.clone(),
                    path: resolved.local_path.clone(),
                    part_size_bytes,
                    max_threads: options.max_threads,
                    verify_checksum: options.verify_checksum,
                })
                .await
        }
    };

    res.map_err(CosError::remote)?;
    Ok(resolved.key.clone())
}

/// What an invocation will do (or did), for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    pub bucket: String,
    pub region: String,
    pub resolved: ResolvedUpload,
    pub part_size_bytes: u64,
    pub max_threads: usize,
}

impl UploadPlan {
    /// Part size the storage client will use once the part limit is applied.
    pub fn effective_part_size(&self) -> u64 {
        effective_part_size(self.resolved.size_bytes, self.part_size_bytes)
            .unwrap_or(self.part_size_bytes)
    }
}

impl fmt::Display for UploadPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = std::path::absolute(&self.resolved.local_path)
            .unwrap_or_else(|_| self.resolved.local_path.clone());

        writeln!(f, "  Local: {}", local.display())?;
        writeln!(f, "  Bucket: {}", self.bucket)?;
        writeln!(f, "  Region: {}", self.region)?;
        writeln!(f, "  Key: {}", self.resolved.key)?;
        writeln!(f, "  Size: {}", format_bytes(self.resolved.size_bytes))?;
        writeln!(f, "  Content-Type: {}", self.resolved.content_type)?;
        match self.resolved.strategy {
            UploadStrategy::Direct => write!(f, "  Strategy: direct"),
            UploadStrategy::Multipart => write!(
                f,
                "  Strategy: multipart ({} parts of {}, {} threads)",
                part_count(self.resolved.size_bytes, self.effective_part_size()),
                format_bytes(self.effective_part_size()),
                self.max_threads
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    DryRun(UploadPlan),
    Uploaded(UploadPlan),
}

impl UploadOutcome {
    pub fn plan(&self) -> &UploadPlan {
        match self {
            UploadOutcome::DryRun(plan) | UploadOutcome::Uploaded(plan) => plan,
        }
    }
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadOutcome::DryRun(plan) => write!(f, "Dry run: would upload\n{}", plan),
            UploadOutcome::Uploaded(plan) => write!(
                f,
                "✓ Upload complete\nObject Key: {}",
                plan.resolved.key
            ),
        }
    }
}

/// Resolve the request into what would be uploaded, without touching storage.
pub fn plan(request: &UploadRequest) -> Result<UploadPlan> {
    let part_size_bytes = request.options.part_size_bytes()?;
    let resolved = resolve(
        &request.local_path,
        request.destination_key.as_deref(),
        request.options.content_type.as_deref(),
    )?;

    Ok(UploadPlan {
        bucket: request.settings.bucket.clone(),
        region: request.settings.region.clone(),
        resolved,
        part_size_bytes,
        max_threads: request.options.max_threads,
    })
}

/// Carry out a plan, or report it unchanged for a dry run.
pub async fn execute<S>(
    request: &UploadRequest,
    plan: UploadPlan,
    storage: &S,
) -> Result<UploadOutcome>
where
    S: StorageClient + ?Sized,
{
    if request.dry_run {
        return Ok(UploadOutcome::DryRun(plan));
    }

    info!(
        "📤 Uploading {} -> {} ({}, {})",
        plan.resolved.local_path.display(),
        plan.resolved.key,
        format_bytes(plan.resolved.size_bytes),
        plan.resolved.strategy
    );
    upload(storage, &plan.resolved, &request.options).await?;
    info!("✅ Uploaded {}", plan.resolved.key);

    Ok(UploadOutcome::Uploaded(plan))
}

/// Resolve the request and, unless it is a dry run, upload it.
pub async fn run<S>(request: &UploadRequest, storage: &S) -> Result<UploadOutcome>
where
    S: StorageClient + ?Sized,
{
    execute(request, plan(request)?, storage).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn sized_file(dir: &TempDir, name: &str, size: u64) -> PathBuf {
        let path = dir.path().join(name);
        File::create(&path).unwrap().set_len(size).unwrap();
        path
    }

    #[test]
    fn test_threshold_boundary() {
        let dir = TempDir::new().unwrap();
        let at = sized_file(&dir, "at.bin", SMALL_FILE_THRESHOLD);
        let above = sized_file(&dir, "above.bin", SMALL_FILE_THRESHOLD + 1);

        assert_eq!(
            resolve(&at, None, None).unwrap().strategy,
            UploadStrategy::Direct
        );
        assert_eq!(
            resolve(&above, None, None).unwrap().strategy,
            UploadStrategy::Multipart
        );
    }

    #[test]
    fn test_empty_file_is_direct() {
        let dir = TempDir::new().unwrap();
        let empty = sized_file(&dir, "empty.txt", 0);
        let resolved = resolve(&empty, None, None).unwrap();
        assert_eq!(resolved.size_bytes, 0);
        assert_eq!(resolved.strategy, UploadStrategy::Direct);
    }

    #[test]
    fn test_custom_threshold() {
        let dir = TempDir::new().unwrap();
        let path = sized_file(&dir, "small.bin", 2048);
        let resolved = resolve_with_threshold(&path, None, None, 1024).unwrap();
        assert_eq!(resolved.strategy, UploadStrategy::Multipart);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.zip");
        match resolve(&missing, Some("k"), None) {
            Err(CosError::LocalFileNotFound(path)) => assert_eq!(path, missing),
            other => panic!("expected LocalFileNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_directory_is_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            resolve(dir.path(), None, None),
            Err(CosError::LocalFileNotFound(_))
        ));
    }

    #[test]
    fn test_blank_key_falls_back_to_file_name() {
        let dir = TempDir::new().unwrap();
        let path = sized_file(&dir, "app.zip", 10);

        for key in [None, Some(""), Some("   ")] {
            assert_eq!(resolve(&path, key, None).unwrap().key, "app.zip");
        }
        assert_eq!(
            resolve(&path, Some("releases/app.zip"), None).unwrap().key,
            "releases/app.zip"
        );
        assert_eq!(
            resolve(&path, Some(" spaced "), None).unwrap().key,
            " spaced "
        );
    }

    #[test]
    fn test_content_type_resolution() {
        let dir = TempDir::new().unwrap();
        let zip = sized_file(&dir, "app.zip", 10);
        let unknown = sized_file(&dir, "blob.qqqunknown", 10);
        let bare = sized_file(&dir, "README", 10);

        assert_eq!(
            resolve(&zip, None, None).unwrap().content_type,
            "application/zip"
        );
        assert_eq!(
            resolve(&zip, None, Some("application/x-custom"))
                .unwrap()
                .content_type,
            "application/x-custom"
        );
        assert_eq!(
            resolve(&unknown, None, None).unwrap().content_type,
            "application/octet-stream"
        );
        assert_eq!(
            resolve(&bare, None, None).unwrap().content_type,
            "application/octet-stream"
        );
    }

    #[test]
    fn test_plan_display_multipart() {
        let plan = UploadPlan {
            bucket: "example-1250000000".into(),
            region: "ap-singapore".into(),
            resolved: ResolvedUpload {
                local_path: PathBuf::from("/data/big.iso"),
                key: "big.iso".into(),
                content_type: "application/octet-stream".into(),
                size_bytes: 20 * 1024 * 1024,
                strategy: UploadStrategy::Multipart,
            },
            part_size_bytes: 8 * 1024 * 1024,
            max_threads: 5,
        };
        let text = UploadOutcome::DryRun(plan).to_string();
        assert!(text.starts_with("Dry run: would upload\n"));
        assert!(text.contains("  Key: big.iso"));
        assert!(text.contains("  Bucket: example-1250000000"));
        assert!(text.contains("multipart (3 parts of 8.00 MiB, 5 threads)"));
    }

    #[test]
    fn test_plan_display_reports_raised_part_size() {
        let plan = UploadPlan {
            bucket: "example-1250000000".into(),
            region: "ap-singapore".into(),
            resolved: ResolvedUpload {
                local_path: PathBuf::from("/data/huge.tar"),
                key: "huge.tar".into(),
                content_type: "application/x-tar".into(),
                size_bytes: 20_000 * 1024 * 1024,
                strategy: UploadStrategy::Multipart,
            },
            part_size_bytes: 1024 * 1024,
            max_threads: 5,
        };
        assert_eq!(plan.effective_part_size(), 2 * 1024 * 1024);
        assert!(plan.to_string().contains("multipart (10000 parts of 2.00 MiB, 5 threads)"));
    }
}
