//! Shardcast command-line tool
//!
//! - `manifest`: run the local upload stages and print the manifest
//! - `sink`: run a local fragment sink that stores pushed fragments
//! - `config`: print the effective configuration

use anyhow::Context;
use clap::{Parser, Subcommand};
use shardcast_core::hash::OwnerId;
use shardcast_network::FragmentSink;
use shardcast_storage::{FsStore, ScratchStore};
use shardcast_uploader::{Planner, UploadRequest, UploaderConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "shardcast")]
#[command(about = "Segment, erasure-code and distribute files to storage nodes")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "shardcast.toml")]
    config: PathBuf,

    /// Scratch directory (overrides config file)
    #[arg(long, global = true)]
    scratch_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Segment, hash and encode a file, then print its manifest as JSON
    Manifest {
        /// File to plan
        path: PathBuf,

        /// Owner account (base58)
        #[arg(long, env = "SHARDCAST_OWNER")]
        owner: String,

        /// Target bucket
        #[arg(long)]
        bucket: String,

        /// Display name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Accept fragment pushes and store them in the scratch directory
    Sink {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1:4100")]
        listen: SocketAddr,

        /// Node identifier used in logs
        #[arg(long, default_value = "local-sink")]
        node_id: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Priority: CLI args > environment > config file > defaults
    let mut config = UploaderConfig::load_or_default(&cli.config).with_env_overrides();
    if let Some(dir) = cli.scratch_dir {
        config.scratch.dir = dir;
    }
    config.validate().context("invalid configuration")?;

    match cli.command {
        Command::Manifest {
            path,
            owner,
            bucket,
            name,
        } => {
            let owner = OwnerId::from_base58(&owner).context("invalid owner")?;
            let file_name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("path has no file name")?,
            };

            let store: Arc<dyn ScratchStore> = Arc::new(FsStore::open(config.storage_config())?);
            let planner = Planner::from_config(&config, store)?;
            let request = UploadRequest::new(owner, path, file_name, bucket);

            let planned = planner.plan(&request).await?;
            println!("{}", serde_json::to_string_pretty(&planned.manifest)?);
        }

        Command::Sink { listen, node_id } => {
            let store: Arc<dyn ScratchStore> = Arc::new(FsStore::open(config.storage_config())?);
            let sink = FragmentSink::bind(listen, store, node_id)
                .await?
                .with_max_frame_len(config.distribution.max_frame_len);
            info!(addr = %sink.local_addr()?, "Press Ctrl+C to stop");

            let shutdown = CancellationToken::new();
            let trigger = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown signal received");
                    trigger.cancel();
                }
            });

            sink.run(shutdown).await?;
        }

        Command::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
