//! CLI for nodelink
//!
//! Subcommands:
//! - `serve`: connect to the broker and hand downlink commands to the log
//!   until interrupted

use std::time::Duration;

use clap::Parser;
use nodelink::Handler;
use nodelink::config::{Settings, load_config_from};
use nodelink::payload::DataDownPayload;
use nodelink::persistence::open_lock_store;
use nodelink::utils::logging;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "nodelink")]
enum Command {
    /// Connect to the broker and serve downlink commands
    Serve {
        /// Configuration file, without extension
        #[arg(long, default_value = nodelink::config::DEFAULT_CONFIG_PATH)]
        config: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cmd = Command::parse();

    match cmd {
        Command::Serve { config } => {
            let settings = match load_config_from(&config) {
                Ok(settings) => settings,
                Err(e) => {
                    logging::init("info");
                    error!("Failed to load configuration: {}", e);
                    std::process::exit(1);
                }
            };
            logging::init(&settings.log.level);

            if let Err(e) = run_server(settings).await {
                error!("Server failed: {}", e);
                std::process::exit(1);
            }
        }
    }
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_lock_store(&settings.lock).await?;
    info!(backend = ?settings.lock.backend, "downlink lock store ready");
    let (handler, mut data_down) = Handler::connect(&settings.mqtt, store.clone()).await?;

    let purge_every = Duration::from_secs(settings.lock.purge_interval_secs.max(1));
    let purge = tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_every);
        loop {
            interval.tick().await;
            if let Err(e) = store.purge_expired().await {
                warn!(error = %e, "purging expired downlink locks failed");
            }
        }
    });

    loop {
        tokio::select! {
            Some(pl) = data_down.recv() => forward(pl),
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received. Exiting gracefully.");
                break;
            }
        }
    }

    // keep draining so in-flight commands can finish their hand-off
    let drain = tokio::spawn(async move {
        while let Some(pl) = data_down.recv().await {
            forward(pl);
        }
    });

    handler.close().await?;
    drain.await?;
    purge.abort();
    Ok(())
}

fn forward(pl: DataDownPayload) {
    info!(
        dev_eui = %pl.dev_eui,
        reference = %pl.reference,
        confirmed = pl.confirmed,
        f_port = pl.f_port,
        bytes = pl.data.len(),
        "data-down payload ready for network server"
    );
}
