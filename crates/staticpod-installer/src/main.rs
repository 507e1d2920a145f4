//! staticpod-installer
//!
//! Copies one revision's secrets and configmaps onto the node and writes its
//! static pod manifest for the kubelet to pick up.

use clap::Parser;

use staticpod_common::telemetry::{init_logging, LoggingConfig};
use staticpod_installer::cli::{self, InstallArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = InstallArgs::parse();

    init_logging(LoggingConfig {
        format: args.log_format.into(),
        ..Default::default()
    })?;

    cli::run(args).await?;
    Ok(())
}
