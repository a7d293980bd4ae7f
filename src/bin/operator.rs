use anyhow::Context;
use clap::Parser;
use kube_insight::cli::{OperatorArgs, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = OperatorArgs::parse();
    init_tracing(args.json_logs)?;
    let config = args.resolve_config()?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "insight-operator starting");

    let client = kube::Client::try_default()
        .await
        .context("failed to build Kubernetes client")?;
    insight_adapter_kube::run(client, config).await
}
