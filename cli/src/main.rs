use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use presign::args::Args;
use presign::Config;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from(Args::parse());
    match presign::run(&config).await {
        Ok(report) => {
            tracing::info!(
                object = %report.object,
                uploaded = report.uploaded,
                downloaded = report.downloaded,
                "round trip complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
