mod cli;

use clap::Parser;
use cli::Cli;
use txgateway::api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if let Some(config_path) = cli.config {
        std::env::set_var("TXGATEWAY_CONFIG", config_path);
    }

    api::run().await
}
