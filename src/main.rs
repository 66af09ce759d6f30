use std::sync::Arc;

use orau::{
    logger::{self, LoggerConfig},
    server, Config, GenerationService, ReplicateClient, ReplicateConfig, StorageManager,
};

const DEFAULT_PORT: u16 = 8080;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenv::dotenv().is_ok();
    logger::init_with_config(LoggerConfig::from_env())?;

    if dotenv_loaded {
        log::info!("✅ .env file loaded successfully");
    } else {
        log::warn!("⚠️  No .env file found, using system environment variables");
    }

    let config = Config::from_env();
    let port = config.port.unwrap_or(DEFAULT_PORT);
    logger::log_startup_info("orau-server", env!("CARGO_PKG_VERSION"), port);
    logger::log_config_info(&config);

    let storage = match StorageManager::new(&config).await {
        Ok(storage) => storage,
        Err(e) => {
            log::error!("❌ Failed to initialize storage: {}", e);
            return Err(e.into());
        }
    };

    let replicate = config.replicate.clone().unwrap_or_else(ReplicateConfig::from_env);
    if replicate.api_key.is_none() {
        log::warn!("⚠️  REPLICATE_API_KEY is not set; generation requests will fail");
    }
    let provider = Arc::new(ReplicateClient::new(replicate));
    let service = GenerationService::new(provider, storage.objects(), config.bucket());

    server::serve(service, port).await?;
    Ok(())
}
