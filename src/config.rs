use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub lease: LeaseConfig,
    pub secrets: SecretsConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(env!("CARGO_PKG_NAME"))
                .join(format!("{}.db", env!("CARGO_PKG_NAME"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Only start runs whose latest approval request is approved
    pub require_approval: bool,
    /// Background tick interval; 0 disables the driver
    pub tick_interval_ms: u64,
    pub max_retries: u32,
    pub backoff_base_seconds: u64,
    pub backoff_jitter_seconds: u64,
    /// Attempts per task/claim before a transient store error is surfaced
    pub conflict_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            require_approval: true,
            tick_interval_ms: 0,
            max_retries: 2,
            backoff_base_seconds: 30,
            backoff_jitter_seconds: 0,
            conflict_retries: 3,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Option<Duration> {
        (self.tick_interval_ms > 0).then(|| Duration::from_millis(self.tick_interval_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    pub ttl_seconds: u64,
    pub heartbeat_interval_seconds: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            heartbeat_interval_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Key material for encrypting info request responses
    pub secret_key: Option<String>,
    /// Environment variable consulted when `secret_key` is unset
    pub secret_key_env: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            secret_key_env: "RUNPLANE_SECRET_KEY".to_string(),
        }
    }
}

impl SecretsConfig {
    /// The configured key, falling back to the environment.
    pub fn resolve(&self) -> Option<String> {
        self.secret_key
            .clone()
            .or_else(|| std::env::var(&self.secret_key_env).ok())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Generated when unset
    pub agent_id: Option<String>,
    pub poll_interval_ms: u64,
    /// Call tick before each queue scan
    pub drive_ticks: bool,
    pub info_poll_interval_ms: u64,
    pub shell: String,
    pub step_timeout_seconds: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: None,
            poll_interval_ms: 2000,
            drive_ticks: true,
            info_poll_interval_ms: 1000,
            shell: "/bin/sh".to_string(),
            step_timeout_seconds: 600,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            storage: StorageConfig::default(),
            scheduler: SchedulerConfig::default(),
            lease: LeaseConfig::default(),
            secrets: SecretsConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Reject settings the lease and retry machinery cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.lease.ttl_seconds == 0 {
            eyre::bail!("lease.ttl_seconds must be greater than 0");
        }
        if self.lease.heartbeat_interval_seconds >= self.lease.ttl_seconds {
            eyre::bail!(
                "lease.heartbeat_interval_seconds ({}) must be shorter than lease.ttl_seconds ({})",
                self.lease.heartbeat_interval_seconds,
                self.lease.ttl_seconds
            );
        }
        if self.scheduler.conflict_retries == 0 {
            eyre::bail!("scheduler.conflict_retries must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.scheduler.require_approval);
        assert_eq!(config.scheduler.max_retries, 2);
        assert_eq!(config.scheduler.backoff_base_seconds, 30);
        assert_eq!(config.scheduler.tick_interval(), None);
        assert_eq!(config.lease.ttl_seconds, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            r#"
scheduler:
  require_approval: false
  tick_interval_ms: 500
lease:
  ttl_seconds: 60
"#,
        )
        .unwrap();
        assert!(!config.scheduler.require_approval);
        assert_eq!(config.scheduler.tick_interval(), Some(Duration::from_millis(500)));
        assert_eq!(config.scheduler.max_retries, 2);
        assert_eq!(config.lease.ttl_seconds, 60);
        assert_eq!(config.lease.heartbeat_interval_seconds, 10);
        assert_eq!(config.agent.shell, "/bin/sh");
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runplane.yml");
        fs::write(&path, "storage:\n  db_path: /tmp/plane.db\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.storage.db_path, PathBuf::from("/tmp/plane.db"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/runplane.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_validate_rejects_heartbeat_not_shorter_than_ttl() {
        let mut config = Config::default();
        config.lease.ttl_seconds = 10;
        config.lease.heartbeat_interval_seconds = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_ttl_and_retries() {
        let mut config = Config::default();
        config.lease.ttl_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.conflict_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secret_key_explicit_wins() {
        let secrets = SecretsConfig {
            secret_key: Some("abc".to_string()),
            secret_key_env: "RUNPLANE_TEST_UNSET_SECRET".to_string(),
        };
        assert_eq!(secrets.resolve().as_deref(), Some("abc"));

        let empty = SecretsConfig {
            secret_key: None,
            secret_key_env: "RUNPLANE_TEST_UNSET_SECRET".to_string(),
        };
        assert_eq!(empty.resolve(), None);
    }
}
