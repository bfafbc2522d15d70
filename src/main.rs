use clap::Parser;
use group_tabs::cli::{run_cli, Args};
use group_tabs::config::ConfigFile;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = ConfigFile::load().await.ok().flatten().unwrap_or_default();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter().unwrap_or("info")));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run_cli(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
