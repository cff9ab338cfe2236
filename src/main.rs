mod agent;
mod cache;
mod config;
mod event;
mod intercept;
mod origin;
mod outbox;
mod request;
mod server;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "offsync")]
#[command(about = "An offline-first HTTP relay that caches reads and queues writes for deferred sync")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Listen address override (e.g. 127.0.0.1:8970)
  #[arg(short, long)]
  listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override listen address if specified on the command line
  let config = if let Some(listen) = args.listen {
    config::Config {
      relay: config::RelayConfig { listen },
      ..config
    }
  } else {
    config
  };

  // Initialize and run the agent
  let mut agent = agent::Agent::new(config)?;
  agent.run().await
}
