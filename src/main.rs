use clap::Parser;
use dotenv::dotenv;
use tracing::info;
use reservations::config::{Command, Config};
use reservations::{gateway, service, standalone};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::parse();
    info!("Starting reservations in {} environment", config.environment);

    match config.command {
        Command::Service(service_config) => service::run(service_config).await,
        Command::Gateway(gateway_config) => gateway::run(gateway_config).await,
        Command::Standalone(standalone_config) => standalone::run(standalone_config).await,
    }
}
