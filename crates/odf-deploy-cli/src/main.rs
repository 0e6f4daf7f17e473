//! odf-deploy CLI
//!
//! Deploys OpenShift and the storage operator across the clusters of a test run.

use clap::Parser;

use odf_deploy::{Cli, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run().await
}
