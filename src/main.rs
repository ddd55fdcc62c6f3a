use std::env;

use anyhow::{Context, anyhow};
use clap::Parser;
use jackpot::api::{Cli, run_cli, run_http_server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let raw_args: Vec<String> = env::args().collect();
    if raw_args.get(1).map(|s| s.as_str()) == Some("serve") {
        let port = raw_args
            .get(2)
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(8080);
        return run_http_server(port).await.context("server error");
    }

    let cli = Cli::parse();
    let output = tokio::task::spawn_blocking(move || run_cli(&cli))
        .await
        .context("simulation task failed")?
        .map_err(|msg| anyhow!(msg))?;
    println!("{output}");
    Ok(())
}
