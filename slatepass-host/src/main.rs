use anyhow::Result;
use clap::Parser;
use slatepass_core::daemon::{
    decode_request, read_frame, write_response, PassService, PROTOCOL_VERSION,
};
use slatepass_core::ServiceConfig;
use std::path::PathBuf;
use tokio::io::{stdin, stdout};
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "slatepass-host", about = "SlatePass native messaging host")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol
    let subscriber = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let config = ServiceConfig::load_or_default(cli.config.as_deref())?;

    info!(
        "Starting SlatePass native messaging host v{} (protocol {})",
        VERSION, PROTOCOL_VERSION
    );

    let service = PassService::from_config(&config).await?;
    let served = serve(&service, config.max_frame_len).await;

    service.shutdown().await;
    match served {
        Ok(()) => {
            info!("Native messaging host completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Native messaging host error: {}", e);
            anyhow::bail!("Native messaging host failed: {}", e)
        }
    }
}

async fn serve(service: &PassService, max_frame_len: usize) -> Result<()> {
    let mut input = stdin();
    let mut output = stdout();

    while let Some(frame) = read_frame(&mut input, max_frame_len).await? {
        let response = match decode_request(&frame) {
            Ok(request) => service.handle(request).await,
            Err(rejected) => rejected,
        };
        write_response(&mut output, &response).await?;
    }

    info!("Input closed");
    Ok(())
}
