use std::process::ExitCode;

use clap::Parser;
use cos_tools::infrastructure::storage::setup_storage;
use cos_tools::services::upload;
use cos_tools::utils::format::banner;
use cos_tools::{CosError, UploadArgs};
use dotenvy::dotenv;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    cos_tools::telemetry::init_tracing("cos_tools=warn,cos_upload=warn");

    let args = UploadArgs::parse();

    match execute(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match &e {
                CosError::ConfigurationMissing(_) | CosError::InvalidConfiguration(_) => {
                    eprintln!("{}", e)
                }
                CosError::LocalFileNotFound(_) => eprintln!("Error: {}", e),
                CosError::RemoteOperationFailure(_) => {
                    error!("❌ Upload failed: {}", e);
                    eprintln!("Upload failed: {}", e);
                }
            }
            ExitCode::from(&e)
        }
    }
}

async fn execute(args: UploadArgs) -> cos_tools::Result<()> {
    let request = args.into_request()?;
    let plan = upload::plan(&request)?;

    if !request.dry_run {
        println!("{}", banner("Tencent COS Upload"));
        println!("Bucket: {}", plan.bucket);
        println!("Region: {}", plan.region);
        println!("Key: {}", plan.resolved.key);
        println!();
    }

    // Building the client performs no I/O, so a dry run stays offline.
    let storage = setup_storage(&request.settings).await;
    let outcome = upload::execute(&request, plan, &storage).await?;
    println!("{}", outcome);

    Ok(())
}
