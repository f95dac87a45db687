use coedit::config::Config;
use coedit::server::CollabServer;
use log::{error, info, warn};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {e}");
        warn!("Using default configuration");
        Config::default()
    });

    info!("Starting collaboration server on {}", config.server_address());

    let server = CollabServer::new(config);
    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}
