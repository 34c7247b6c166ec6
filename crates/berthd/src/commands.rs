//! Management command handlers.

use anyhow::{Context, bail};
use serde_json::Value;
use tracing::info;

use berth_core::{Attributes, BerthConfig, Lease, LeaseId, ResourceId};
use berth_engine::wait_until_active;
use berth_state::LogFilter;

use crate::daemon::Daemon;

/// Parse `k=v,k2=v2` into lease attributes. Values are strings.
pub fn parse_attributes(text: Option<&str>) -> anyhow::Result<Attributes> {
    let mut attributes = Attributes::new();
    let Some(text) = text else {
        return Ok(attributes);
    };
    for pair in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("attribute {pair:?} is not key=value");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("attribute {pair:?} has an empty key");
        }
        attributes.insert(key.to_string(), Value::String(value.trim().to_string()));
    }
    Ok(attributes)
}

pub async fn lease(
    daemon: &Daemon,
    resource_type: &str,
    attributes: Option<&str>,
    owner: Option<&str>,
) -> anyhow::Result<()> {
    let mut lease = Lease::new(resource_type).with_attributes(parse_attributes(attributes)?);
    if let Some(owner) = owner {
        lease = lease.with_owner(owner);
    }

    let (queue, workers) = daemon.start_workers(1)?;
    let queued = queue.queue_for_activation(lease)?;
    let result = wait_until_active(&daemon.store, queued.id, &daemon.poll).await;
    workers.shutdown().await;

    let lease = result.with_context(|| format!("lease {} did not become active", queued.id))?;
    info!(
        lease = lease.id,
        resource = ?lease.resource_id,
        attributes = %serde_json::to_string(&lease.attributes)?,
        "lease active"
    );
    println!("{}", lease.id);
    Ok(())
}

pub async fn release(daemon: &Daemon, lease_id: LeaseId) -> anyhow::Result<()> {
    let lease = daemon.registry.release_lease(lease_id).await?;
    println!("released lease {} ({})", lease.id, lease.status);
    Ok(())
}

pub async fn close_resource(daemon: &Daemon, resource_id: ResourceId) -> anyhow::Result<()> {
    if daemon.registry.close_resource(resource_id).await? {
        println!("closed resource {resource_id}");
    } else {
        println!("resource {resource_id} was already closing or closed");
    }
    Ok(())
}

pub async fn release_all_resources(daemon: &Daemon) -> anyhow::Result<()> {
    let closed = daemon.registry.release_all_resources().await?;
    println!("closed {closed} resources");
    Ok(())
}

pub fn list(daemon: &Daemon, format: &str) -> anyhow::Result<()> {
    let resources = daemon.store.list_resources()?;
    let leases = daemon.store.list_leases()?;

    match format {
        "json" => {
            let listing = serde_json::json!({ "resources": resources, "leases": leases });
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        _ => {
            println!("RESOURCES");
            for r in &resources {
                println!(
                    "{:>6}  {:<10}  {:<12}  {:<16}  {}",
                    r.id,
                    r.status.to_string(),
                    r.resource_type,
                    r.blueprint_id,
                    r.name
                );
            }
            println!();
            println!("LEASES");
            for l in &leases {
                let resource = l.resource_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into());
                let detail = l
                    .broken_reason
                    .clone()
                    .or_else(|| l.owner.clone())
                    .unwrap_or_default();
                println!(
                    "{:>6}  {:<10}  {:<12}  {:>8}  {}",
                    l.id,
                    l.status.to_string(),
                    l.resource_type,
                    resource,
                    detail
                );
            }
        }
    }
    Ok(())
}

pub fn logs(
    daemon: &Daemon,
    lease_id: Option<LeaseId>,
    resource_id: Option<ResourceId>,
    limit: usize,
) -> anyhow::Result<()> {
    let filter = LogFilter {
        lease_id,
        resource_id,
        ..LogFilter::default()
    };
    for entry in daemon.store.list_logs(filter, limit)? {
        let scope = [
            entry.blueprint_id.clone(),
            entry.resource_id.map(|id| format!("resource {id}")),
            entry.lease_id.map(|id| format!("lease {id}")),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");
        println!("{}  [{scope}]  {}", entry.epoch, entry.message);
    }
    Ok(())
}

pub fn init(root: &str) -> anyhow::Result<()> {
    print!("{}", BerthConfig::scaffold(root).to_toml_string()?);
    Ok(())
}
