use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vitalfrog::report::BANNER;
use vitalfrog::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.directive().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    println!("{}", BANNER.green());
    info!("vitalfrog v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping");
            on_signal.cancel();
        }
    });

    match vitalfrog::run(config, cancel).await {
        Ok(summary) if summary.is_failure() => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
