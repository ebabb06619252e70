use std::process::ExitCode;

use cos_tools::CosSettings;
use cos_tools::infrastructure::storage::setup_storage;
use cos_tools::services::listing::{self, ListingSummary};
use cos_tools::utils::format::banner;
use dotenvy::dotenv;
use tracing::error;

/// Lists the bucket root to check that COS_* configuration works.
#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    cos_tools::telemetry::init_tracing("cos_tools=warn,cos_list=warn");

    let settings = match CosSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("✗ {}", e);
            return ExitCode::from(&e);
        }
    };

    println!("{}", banner("Tencent COS Configuration Test"));
    println!("Bucket: {}", settings.bucket);
    println!("Region: {}", settings.region);
    println!("Secret ID: {}", settings.credentials.masked_id());
    println!();
    println!("Listing objects in root directory (\"/\")...");
    println!("{}", "-".repeat(40));

    let storage = setup_storage(&settings).await;

    match listing::list(&storage, "").await {
        Ok(keys) => {
            println!("{}", ListingSummary::new(&keys));
            println!();
            println!("✓ SUCCESS: Tencent COS configuration is working correctly!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ Error listing COS objects: {}", e);
            eprintln!("Error listing COS objects: {}", e);
            eprintln!("✗ FAILED: Unable to access COS bucket. Please check your configuration.");
            ExitCode::from(&e)
        }
    }
}
