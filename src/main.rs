//! Prediction service - Main Entry Point

use clap::Parser;
use predict_service::cli::{cmd_serve, Cli, Commands, ServeArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "predict_service=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve(args)) => cmd_serve(args).await,
        None => cmd_serve(ServeArgs::default()).await,
    }
}
