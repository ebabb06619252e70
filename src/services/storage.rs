use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl, StorageClass};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::task::JoinSet;

/// COS accepts at most this many parts per multipart upload.
pub const MAX_PARTS: u64 = 10_000;
/// Largest single part COS accepts (5 GiB).
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Single-shot upload of a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObject {
    pub key: String,
    pub path: PathBuf,
    pub content_type: String,
    pub storage_class: String,
    pub acl: Option<String>,
}

/// Chunked upload of a local file. Content type, storage class and ACL are
/// not carried on this path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartUpload {
    pub key: String,
    pub path: PathBuf,
    pub part_size_bytes: u64,
    pub max_threads: usize,
    pub verify_checksum: bool,
}

/// Object storage operations the CLIs depend on. The bucket is bound at
/// construction time.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// One flat page of object keys under `prefix`.
    async fn list_objects(&self, prefix: &str, max_keys: i32) -> Result<Vec<String>>;
    async fn put_object(&self, request: &PutObject) -> Result<()>;
    async fn multipart_upload(&self, request: &MultipartUpload) -> Result<()>;
}

/// `StorageClient` over the S3-compatible COS API.
pub struct CosStorageService {
    client: Client,
    bucket: String,
}

impl CosStorageService {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Uploads `parts` with at most `max_threads` in flight. A part is only
    /// read once a slot is free, so memory stays bounded by `max_threads`
    /// parts. The first failed part stops the loop.
    async fn upload_parts(
        &self,
        request: &MultipartUpload,
        upload_id: &str,
        parts: &[PartRange],
    ) -> Result<Vec<CompletedPart>> {
        let max_threads = request.max_threads.max(1);
        let mut file = File::open(&request.path)
            .await
            .with_context(|| format!("Failed to open {}", request.path.display()))?;

        // Dropping the set on an early return aborts the remaining parts.
        let mut tasks = JoinSet::new();
        let mut completed = Vec::with_capacity(parts.len());

        for part in parts {
            while let Some(joined) = tasks.try_join_next() {
                completed.push(joined.context("Part upload task failed")??);
            }
            if tasks.len() >= max_threads {
                if let Some(joined) = tasks.join_next().await {
                    completed.push(joined.context("Part upload task failed")??);
                }
            }

            let chunk = read_part(&mut file, part.len)
                .await
                .with_context(|| format!("Failed to read {}", request.path.display()))?;

            let client = self.client.clone();
            let bucket = self.bucket.clone();
            let key = request.key.clone();
            let upload_id = upload_id.to_string();
            let verify_checksum = request.verify_checksum;
            let part_number = part.number;

            tasks.spawn(async move {
                let size = chunk.len();

                let mut req = client
                    .upload_part()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number);
                if verify_checksum {
                    req = req.content_md5(md5_base64(&chunk));
                }

                let output = req
                    .body(ByteStream::from(chunk))
                    .send()
                    .await
                    .map_err(|e| {
                        anyhow!(
                            "UploadPart {} failed: {}",
                            part_number,
                            DisplayErrorContext(&e)
                        )
                    })?;

                let e_tag = output
                    .e_tag()
                    .ok_or_else(|| anyhow!("UploadPart {} returned no ETag", part_number))?;
                tracing::debug!(part_number, size, "part uploaded");

                Ok::<_, anyhow::Error>(
                    CompletedPart::builder()
                        .e_tag(e_tag)
                        .part_number(part_number)
                        .build(),
                )
            });
        }

        while let Some(joined) = tasks.join_next().await {
            completed.push(joined.context("Part upload task failed")??);
        }
        completed.sort_by_key(|part| part.part_number());

        Ok(completed)
    }
}

#[async_trait]
impl StorageClient for CosStorageService {
    async fn list_objects(&self, prefix: &str, max_keys: i32) -> Result<Vec<String>> {
        let res = self
            .client
            .list_objects()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| anyhow!("ListObjects failed: {}", DisplayErrorContext(&e)))?;

        Ok(res
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(|object| object.key)
            .collect())
    }

    async fn put_object(&self, request: &PutObject) -> Result<()> {
        // The body owns the file handle; it is closed when the request
        // finishes or fails.
        let body = ByteStream::from_path(&request.path)
            .await
            .with_context(|| format!("Failed to open {}", request.path.display()))?;

        let mut put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&request.key)
            .body(body)
            .content_type(&request.content_type)
            .storage_class(StorageClass::from(request.storage_class.as_str()));
        if let Some(acl) = &request.acl {
            put = put.acl(ObjectCannedAcl::from(acl.as_str()));
        }

        put.send()
            .await
            .map_err(|e| anyhow!("PutObject failed: {}", DisplayErrorContext(&e)))?;
        Ok(())
    }

    async fn multipart_upload(&self, request: &MultipartUpload) -> Result<()> {
        let size_bytes = tokio::fs::metadata(&request.path)
            .await
            .with_context(|| format!("Failed to stat {}", request.path.display()))?
            .len();
        let part_size = effective_part_size(size_bytes, request.part_size_bytes)?;
        if part_size != request.part_size_bytes {
            tracing::warn!(
                requested = request.part_size_bytes,
                part_size,
                "part size raised to stay within {} parts",
                MAX_PARTS
            );
        }
        let parts = plan_parts(size_bytes, part_size);

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&request.key)
            .send()
            .await
            .map_err(|e| anyhow!("CreateMultipartUpload failed: {}", DisplayErrorContext(&e)))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| anyhow!("No upload ID"))?
            .to_string();

        match self.upload_parts(request, &upload_id, &parts).await {
            Ok(parts) => {
                tracing::debug!(key = %request.key, parts = parts.len(), "completing multipart upload");
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();

                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&request.key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .map_err(|e| {
                        anyhow!("CompleteMultipartUpload failed: {}", DisplayErrorContext(&e))
                    })?;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Multipart upload of {} failed, aborting: {:#}", request.key, e);
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&request.key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        "AbortMultipartUpload {} failed: {}",
                        upload_id,
                        DisplayErrorContext(&abort_err)
                    );
                }
                Err(e)
            }
        }
    }
}

/// Read exactly `len` bytes. The buffer is sized by the part, not by the
/// configured part size, so a small file never allocates a full part.
async fn read_part(file: &mut File, len: u64) -> std::io::Result<Vec<u8>> {
    let len = usize::try_from(len).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "part does not fit in memory")
    })?;
    let mut buffer = vec![0u8; len];
    file.read_exact(&mut buffer).await?;
    Ok(buffer)
}

fn md5_base64(data: &[u8]) -> String {
    B64.encode(md5::compute(data).0)
}

/// Number of parts a file of `size_bytes` splits into.
pub fn part_count(size_bytes: u64, part_size_bytes: u64) -> u64 {
    size_bytes.div_ceil(part_size_bytes.max(1)).max(1)
}

/// Part size actually used for a file: the requested size, raised when the
/// file would otherwise need more than `MAX_PARTS` parts.
pub fn effective_part_size(size_bytes: u64, requested: u64) -> Result<u64> {
    let part_size = requested.max(1).max(size_bytes.div_ceil(MAX_PARTS));
    if part_size > MAX_PART_SIZE {
        bail!(
            "{} bytes does not fit in {} parts of at most {} bytes",
            size_bytes,
            MAX_PARTS,
            MAX_PART_SIZE
        );
    }
    Ok(part_size)
}

/// One slice of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    pub number: i32,
    pub offset: u64,
    pub len: u64,
}

/// Split a file into numbered parts; the last part may be shorter. An empty
/// file still gets one empty part, since COS needs at least one to complete.
pub fn plan_parts(size_bytes: u64, part_size_bytes: u64) -> Vec<PartRange> {
    let part_size = part_size_bytes.max(1);
    (0..part_count(size_bytes, part_size))
        .map(|index| {
            let offset = index * part_size;
            PartRange {
                number: index as i32 + 1,
                offset,
                len: part_size.min(size_bytes - offset),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_md5_base64_known_value() {
        // RFC 1321 test vector for "abc"
        assert_eq!(md5_base64(b"abc"), "kAFQmDzST7DWlj99KOF/cg==");
        assert_eq!(md5_base64(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn test_part_count() {
        let mib = 1024 * 1024;
        assert_eq!(part_count(20 * mib, 8 * mib), 3);
        assert_eq!(part_count(16 * mib, 8 * mib), 2);
        assert_eq!(part_count(0, 8 * mib), 1);
    }

    #[test]
    fn test_plan_parts_last_part_is_shorter() {
        assert_eq!(
            plan_parts(10, 4),
            vec![
                PartRange { number: 1, offset: 0, len: 4 },
                PartRange { number: 2, offset: 4, len: 4 },
                PartRange { number: 3, offset: 8, len: 2 },
            ]
        );
        assert_eq!(plan_parts(8, 4).len(), 2);
        assert_eq!(plan_parts(0, 4), vec![PartRange { number: 1, offset: 0, len: 0 }]);
    }

    #[test]
    fn test_plan_parts_small_file_with_huge_part_size() {
        let parts = plan_parts(16, MAX_PART_SIZE);
        assert_eq!(parts, vec![PartRange { number: 1, offset: 0, len: 16 }]);
    }

    #[test]
    fn test_effective_part_size_stays_within_part_limit() {
        let mib = 1024 * 1024;
        assert_eq!(effective_part_size(20 * mib, 8 * mib).unwrap(), 8 * mib);

        // 100 GiB in 1 MiB parts would need 102,400 parts.
        let size = 100 * 1024 * mib;
        let part_size = effective_part_size(size, mib).unwrap();
        assert!(part_size > mib);
        assert!(part_count(size, part_size) <= MAX_PARTS);
        assert_eq!(plan_parts(size, part_size).len() as u64, part_count(size, part_size));

        assert!(effective_part_size(MAX_PARTS * MAX_PART_SIZE + 1, mib).is_err());
    }

    #[tokio::test]
    async fn test_read_part_reads_exact_lengths() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();

        let mut file = File::open(tmp.path()).await.unwrap();
        let mut chunks = Vec::new();
        for part in plan_parts(10, 4) {
            chunks.push(read_part(&mut file, part.len).await.unwrap());
        }
        assert_eq!(chunks, vec![b"0123".to_vec(), b"4567".to_vec(), b"89".to_vec()]);
    }

    #[tokio::test]
    async fn test_read_part_reports_truncated_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"abc").unwrap();

        let mut file = File::open(tmp.path()).await.unwrap();
        let err = read_part(&mut file, 8).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
