use crate::config::CosSettings;
use crate::services::storage::CosStorageService;
use aws_sdk_s3::config::{
    Credentials, Region, RequestChecksumCalculation, ResponseChecksumValidation,
};
use tracing::info;

/// Build a COS client for the configured bucket. No request is sent here.
pub async fn setup_storage(settings: &CosSettings) -> CosStorageService {
    let endpoint_url = settings.endpoint_url();
    info!(
        "☁️  COS Storage: {} (Bucket: {}, Region: {})",
        endpoint_url, settings.bucket, settings.region
    );

    let creds = &settings.credentials;
    let aws_config = aws_config::from_env()
        .endpoint_url(&endpoint_url)
        .region(Region::new(settings.region.clone()))
        .credentials_provider(Credentials::new(
            creds.secret_id.clone(),
            creds.secret_key.clone(),
            creds.token.clone(),
            None,
            "cos-static",
        ))
        .load()
        .await;

    // COS serves buckets on virtual hosts; path style is only for custom
    // S3-compatible endpoints. COS does not accept the SDK's default
    // flexible checksums, so they are only sent when an operation requires them.
    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(settings.endpoint.is_some())
        .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
        .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);
    CosStorageService::new(s3_client, settings.bucket.clone())
}
