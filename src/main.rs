use log::{error, info};
use resultflow::config::AppConfig;
use resultflow::errors::AppError;
use resultflow::{build_stores, start_service};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run().await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let stores = build_stores(&config)?;
    let service = start_service(&config, stores).await?;
    info!("main-service running; Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    service.shutdown().await;
    Ok(())
}
