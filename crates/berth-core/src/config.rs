//! berth.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BerthConfig {
    pub daemon: Option<DaemonConfig>,
    pub poll: Option<PollSection>,
    #[serde(default, rename = "blueprint", skip_serializing_if = "Vec::is_empty")]
    pub blueprints: Vec<BlueprintConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub data_dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub lock_timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollSection {
    pub interval: Option<String>,
    pub max_interval: Option<String>,
    pub deadline: Option<String>,
}

/// One configured blueprint instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintConfig {
    pub id: String,
    pub name: String,
    /// Registered implementation key, e.g. `local-directory`.
    pub implementation: String,
    /// Resource type this blueprint provides.
    #[serde(rename = "type")]
    pub resource_type: String,
    pub enabled: Option<bool>,
    /// Newline separated `key=value` custom attributes.
    pub attributes: Option<String>,
    pub policy: Option<PolicyConfig>,
    /// Implementation-specific settings.
    pub details: Option<toml::Table>,
}

/// Pool sizing limits for a blueprint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PolicyConfig {
    pub min_count: Option<u32>,
    pub max_count: Option<u32>,
    pub leases_per_resource: Option<u32>,
    pub expiry: Option<String>,
}

pub const DEFAULT_DATA_DIR: &str = "/var/lib/berth";
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_MAX_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(30 * 60);

impl BerthConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: BerthConfig = toml::from_str(content)?;
        for blueprint in &config.blueprints {
            if let Some(policy) = &blueprint.policy {
                policy.validate(&blueprint.id)?;
            }
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.daemon
            .as_ref()
            .and_then(|d| d.data_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    pub fn workers(&self) -> usize {
        self.daemon
            .as_ref()
            .and_then(|d| d.workers)
            .unwrap_or(DEFAULT_WORKERS)
            .max(1)
    }

    pub fn lock_timeout(&self) -> anyhow::Result<Duration> {
        optional_duration(
            self.daemon.as_ref().and_then(|d| d.lock_timeout.as_deref()),
            DEFAULT_LOCK_TIMEOUT,
        )
    }

    /// Resolved `(interval, max_interval, deadline)` polling settings.
    pub fn poll_settings(&self) -> anyhow::Result<(Duration, Duration, Duration)> {
        let poll = self.poll.clone().unwrap_or_default();
        Ok((
            optional_duration(poll.interval.as_deref(), DEFAULT_POLL_INTERVAL)?,
            optional_duration(poll.max_interval.as_deref(), DEFAULT_POLL_MAX_INTERVAL)?,
            optional_duration(poll.deadline.as_deref(), DEFAULT_POLL_DEADLINE)?,
        ))
    }

    /// Scaffold a config with a single local-directory blueprint.
    pub fn scaffold(root: &str) -> Self {
        let mut details = toml::Table::new();
        details.insert("root".to_string(), toml::Value::String(root.to_string()));

        BerthConfig {
            daemon: Some(DaemonConfig {
                data_dir: Some(PathBuf::from(DEFAULT_DATA_DIR)),
                workers: Some(DEFAULT_WORKERS),
                lock_timeout: Some("30s".to_string()),
            }),
            poll: Some(PollSection {
                interval: Some("5s".to_string()),
                max_interval: Some("30s".to_string()),
                deadline: Some("30m".to_string()),
            }),
            blueprints: vec![BlueprintConfig {
                id: "scratch".to_string(),
                name: "Local scratch space".to_string(),
                implementation: "local-directory".to_string(),
                resource_type: "storage".to_string(),
                enabled: Some(true),
                attributes: None,
                policy: Some(PolicyConfig {
                    min_count: Some(1),
                    max_count: Some(4),
                    leases_per_resource: Some(2),
                    expiry: None,
                }),
                details: Some(details),
            }],
        }
    }
}

impl BlueprintConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn detail(&self, key: &str) -> Option<&toml::Value> {
        self.details.as_ref()?.get(key)
    }

    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.detail(key).and_then(toml::Value::as_str)
    }
}

impl PolicyConfig {
    pub fn expiry(&self) -> anyhow::Result<Option<Duration>> {
        match &self.expiry {
            Some(s) => Ok(Some(parse_duration(s)?)),
            None => Ok(None),
        }
    }

    fn validate(&self, blueprint: &str) -> anyhow::Result<()> {
        if let (Some(min), Some(max)) = (self.min_count, self.max_count) {
            if min > max {
                anyhow::bail!(
                    "blueprint {blueprint}: min_count {min} exceeds max_count {max}"
                );
            }
        }
        self.expiry()?;
        Ok(())
    }
}

fn optional_duration(value: Option<&str>, default: Duration) -> anyhow::Result<Duration> {
    match value {
        Some(s) => Ok(parse_duration(s)?),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold_round_trips() {
        let config = BerthConfig::scaffold("/srv/berth");
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("local-directory"));

        let parsed = BerthConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed.blueprints.len(), 1);
        assert_eq!(parsed.blueprints[0].detail_str("root"), Some("/srv/berth"));
    }

    #[test]
    fn test_parse_minimal() {
        let config = BerthConfig::from_toml_str("").unwrap();
        assert!(config.blueprints.is_empty());
        assert_eq!(config.workers(), DEFAULT_WORKERS);
        assert_eq!(config.lock_timeout().unwrap(), DEFAULT_LOCK_TIMEOUT);
        assert_eq!(config.data_dir(), PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[test]
    fn test_parse_blueprint() {
        let toml_str = r#"
[daemon]
workers = 2
lock_timeout = "5s"

[poll]
interval = "100ms"
deadline = "1m"

[[blueprint]]
id = "scratch"
name = "Scratch"
implementation = "local-directory"
type = "storage"
attributes = "platform=linux"

[blueprint.policy]
min_count = 1
max_count = 2
leases_per_resource = 1
expiry = "1h"

[blueprint.details]
root = "/tmp/berth"
"#;
        let config = BerthConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.workers(), 2);
        assert_eq!(config.lock_timeout().unwrap(), Duration::from_secs(5));

        let (interval, max_interval, deadline) = config.poll_settings().unwrap();
        assert_eq!(interval, Duration::from_millis(100));
        assert_eq!(max_interval, DEFAULT_POLL_MAX_INTERVAL);
        assert_eq!(deadline, Duration::from_secs(60));

        let bp = &config.blueprints[0];
        assert!(bp.is_enabled());
        assert_eq!(bp.resource_type, "storage");
        let policy = bp.policy.as_ref().unwrap();
        assert_eq!(policy.max_count, Some(2));
        assert_eq!(policy.expiry().unwrap(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_rejects_inverted_limits() {
        let toml_str = r#"
[[blueprint]]
id = "bad"
name = "Bad"
implementation = "local-directory"
type = "storage"

[blueprint.policy]
min_count = 3
max_count = 1
"#;
        assert!(BerthConfig::from_toml_str(toml_str).is_err());
    }
}
