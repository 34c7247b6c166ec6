//! berthd: the berth daemon.
//!
//! One binary for both the long-running allocation workers and the
//! management commands that act on the same state store:
//!
//! - `run` starts the worker pool and resumes pending leases
//! - `lease` requests a lease and waits until it is active
//! - `release`, `close-resource`, `release-all-resources` tear down
//! - `list`, `logs` inspect state
//!
//! # Usage
//!
//! ```text
//! berthd --config /etc/berth/berth.toml run
//! berthd lease --type storage --attributes attr_region=eu --owner ci
//! berthd logs --lease 42
//! ```

mod commands;
mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use berth_core::{LeaseId, ResourceId};

use crate::daemon::Daemon;

#[derive(Parser)]
#[command(
    name = "berthd",
    about = "berth resource allocation daemon",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to berth.toml (default: ./berth.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persistent state, overriding [daemon].data_dir.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run allocation workers until Ctrl-C.
    Run,
    /// Request a lease, wait until it is active and print its id.
    Lease {
        /// Resource type to lease.
        #[arg(long = "type")]
        resource_type: String,
        /// Comma separated `key=value` lease attributes.
        #[arg(long)]
        attributes: Option<String>,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Release an active lease.
    Release {
        #[arg(long)]
        lease: LeaseId,
    },
    /// Close a resource, releasing or breaking every lease on it.
    CloseResource {
        #[arg(long)]
        resource: ResourceId,
    },
    /// Close every open or pending resource.
    ReleaseAllResources,
    /// Print resources and leases.
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Print persisted log entries, oldest first.
    Logs {
        #[arg(long)]
        lease: Option<LeaseId>,
        #[arg(long)]
        resource: Option<ResourceId>,
        /// Show at most this many of the most recent entries.
        #[arg(long, default_value = "100")]
        limit: usize,
    },
    /// Print a scaffold berth.toml.
    Init {
        /// Root directory for the scaffold's local-directory blueprint.
        #[arg(long, default_value = "/srv/berth")]
        root: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,berth=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Command::Init { root } = &cli.command {
        return commands::init(root);
    }

    let config = daemon::load_config(cli.config.as_deref())?;
    let daemon = Daemon::open(config, cli.data_dir)?;

    match cli.command {
        Command::Run => daemon.run().await,
        Command::Lease {
            resource_type,
            attributes,
            owner,
        } => {
            commands::lease(&daemon, &resource_type, attributes.as_deref(), owner.as_deref())
                .await
        }
        Command::Release { lease } => commands::release(&daemon, lease).await,
        Command::CloseResource { resource } => commands::close_resource(&daemon, resource).await,
        Command::ReleaseAllResources => commands::release_all_resources(&daemon).await,
        Command::List { format } => commands::list(&daemon, &format),
        Command::Logs {
            lease,
            resource,
            limit,
        } => commands::logs(&daemon, lease, resource, limit),
        Command::Init { .. } => Ok(()),
    }
}
