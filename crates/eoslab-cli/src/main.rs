//! `eoslab` entry point.
//!
//! Parses the command line, loads the topology YAML, authenticates against
//! the ESXi host, and hands off to `eoslab_core::run`. Any error terminates
//! the run with a one-line diagnostic and a non-zero exit code; machines
//! after a failing one are not attempted.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use eoslab_core::{ProvisionError, RunConfig, Topology};
use eoslab_vim::EsxiClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Provision a vEOS lab topology on a single ESXi host.
#[derive(Parser, Debug)]
#[command(name = "eoslab", version, about)]
struct Args {
    /// Datastore name
    #[arg(short = 'd', long)]
    datastore: String,

    /// ESXi host to connect to
    #[arg(short = 's', long)]
    host: String,

    /// User name to use when connecting to the host
    #[arg(short = 'u', long)]
    user: String,

    /// Port to connect on
    #[arg(short = 'o', long, default_value_t = 443)]
    port: u16,

    /// Disable TLS host certificate verification
    #[arg(short = 'S', long)]
    insecure: bool,

    /// Local vEOS vmdk disk image to upload
    #[arg(short = 'l', long = "local-file")]
    local_file: PathBuf,

    /// Topology YAML file to parse
    #[arg(short = 'y', long = "yaml-file")]
    yaml_file: PathBuf,

    /// Password for the host; prompted for when absent
    #[arg(short = 'p', long, env = "EOSLAB_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(Args::parse()).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let password = match args.password {
        Some(p) => p,
        None => rpassword::prompt_password(format!(
            "Enter password for host {} and user {}: ",
            args.host, args.user
        ))
        .context("could not read password")?,
    };

    let text = std::fs::read_to_string(&args.yaml_file)
        .with_context(|| format!("could not read {}", args.yaml_file.display()))?;
    let topology = Topology::from_yaml(&text)?;
    if topology.is_empty() {
        tracing::warn!("topology file contains no machines, nothing to do");
        return Ok(());
    }

    let client = EsxiClient::connect(&args.host, args.port, &args.user, &password, !args.insecure)
        .await
        .map_err(|e| ProvisionError::Connection(e.to_string()))
        .context("check the host address, username, and password")?;

    let config = RunConfig {
        datastore: args.datastore,
        host_addr: args.host,
        disk_path: args.local_file,
        verify_tls: !args.insecure,
    };

    let result = eoslab_core::run(&client, &topology, &config).await;
    client.logout().await;
    result?;

    println!("vEOS lab generation complete!");
    Ok(())
}
