mod auth;
mod cancel;
mod cli;
mod config;
mod error;
mod flow;
mod insights;
mod output;
mod providers;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting FlowLens");

    let cancel = cli.cancel_token();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current request");
            on_interrupt.cancel();
        }
    });

    cli.execute(cancel).await?;

    Ok(())
}
