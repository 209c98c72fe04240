//! garden-clientmap - operator tool for the garden multi-cluster client map

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Config, CustomResourceExt};
use tokio_util::sync::CancellationToken;

use garden_clientmap::{
    build_client_map, spawn_eviction, ClientMap, ClientMapConfig, ClientSetKey,
};
use garden_common::crd::{Plant, Project, Seed, Shoot};
use garden_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};

/// Reach garden, seed, shoot and plant clusters through the client map
#[derive(Parser, Debug)]
#[command(name = "garden-clientmap", version, about, long_about = None)]
struct Cli {
    /// Print the garden resource definitions the factories read and exit
    #[arg(long)]
    crd: bool,

    /// Kubeconfig for the garden cluster (in-cluster or default config when unset)
    #[arg(long, global = true, env = "GARDEN_KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Seconds between credential fingerprint checks of a cached client set
    #[arg(long, global = true)]
    refresh_interval_secs: Option<u64>,

    /// Bound in seconds for a single client set build (0 disables it)
    #[arg(long, global = true)]
    build_timeout_secs: Option<u64>,

    /// Evict client sets unused for this many seconds (0 keeps them)
    #[arg(long, global = true)]
    idle_timeout_secs: Option<u64>,

    /// Human-readable logs instead of JSON
    #[arg(long, global = true)]
    text_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the client set for a cluster and print its server version
    ///
    /// KEY is `garden`, `seed:<name>`, `shoot:<namespace>/<name>` or
    /// `plant:<namespace>/<name>`.
    Get {
        /// Cluster to connect to
        key: ClientSetKey,
    },

    /// Keep fetching a client set, showing rebuilds as credentials rotate
    Watch {
        /// Cluster to connect to
        key: ClientSetKey,

        /// Seconds between fetches
        #[arg(long, default_value = "30")]
        every: u64,
    },
}

impl Cli {
    /// Environment configuration with command line overrides applied
    fn client_map_config(&self) -> anyhow::Result<ClientMapConfig> {
        let mut config = ClientMapConfig::from_env()?;
        let optional = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));

        if let Some(secs) = self.refresh_interval_secs {
            config.refresh_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = self.build_timeout_secs {
            config.build_timeout = optional(secs);
        }
        if let Some(secs) = self.idle_timeout_secs {
            config.idle_timeout = optional(secs);
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider before any TLS client is built
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install aws-lc-rs crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        for crd in [Shoot::crd(), Seed::crd(), Plant::crd(), Project::crd()] {
            let yaml = serde_yaml::to_string(&crd).context("failed to serialize CRD")?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    let mut telemetry = TelemetryConfig::from_env()?;
    if cli.text_logs {
        telemetry.log_format = LogFormat::Text;
    }
    let _telemetry = init_telemetry(telemetry)?;

    let Some(command) = cli.command.as_ref() else {
        anyhow::bail!("no command given, see --help");
    };

    let config = cli.client_map_config()?;
    let garden = garden_config(cli.kubeconfig.as_deref()).await?;
    let map = Arc::new(build_client_map(garden, &config)?);

    match command {
        Commands::Get { key } => {
            let client_set = map.get_client(key).await?;
            let version = client_set.server_version().await?;
            println!("{key}\t{version}\t{}", client_set.fingerprint());
            Ok(())
        }
        Commands::Watch { key, every } => run_watch(map, key, *every, &config).await,
    }
}

/// Garden configuration from an explicit kubeconfig or the environment
async fn garden_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?)
        }
        None => Ok(Config::infer().await?),
    }
}

async fn run_watch(
    map: Arc<garden_clientmap::DelegatingClientMap>,
    key: &ClientSetKey,
    every: u64,
    config: &ClientMapConfig,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let eviction = config
        .idle_timeout
        .map(|_| spawn_eviction(map.clone(), config.eviction_period, cancel.clone()));

    let mut ticker = tokio::time::interval(Duration::from_secs(every.max(1)));
    let mut last_fingerprint = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping watch");
                break;
            }
            _ = ticker.tick() => {
                match map.get_client(key).await {
                    Ok(client_set) => {
                        let fingerprint = client_set.fingerprint().to_string();
                        if last_fingerprint.as_ref() != Some(&fingerprint) {
                            tracing::info!(key = %key, fingerprint = %fingerprint, "Using client set");
                            last_fingerprint = Some(fingerprint);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, retryable = e.is_retryable(), "Failed to get client set");
                    }
                }
            }
        }
    }

    cancel.cancel();
    if let Some(handle) = eviction {
        handle.await?;
    }
    Ok(())
}
