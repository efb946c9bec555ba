use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Extra `target=level` filter directives, e.g. `exec_ledger::flush=debug`
    #[serde(default)]
    pub log_directives: Vec<String>,
    /// Session to recover and run; a fresh UUID when unset
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub flush: FlushConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
    /// PostgreSQL store of record; migration is disabled when unset
    #[serde(default)]
    pub postgres_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuditConfig {
    pub data_dir: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/audit".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FlushConfig {
    pub interval_ms: u64,
    /// Max items drained per queue per cycle (0 = all)
    pub batch_size: usize,
    /// Push records rebuilt at startup to the cache
    pub flush_recovered: bool,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            batch_size: 0,
            flush_recovered: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetentionConfig {
    pub max_age_ms: u64,
    pub sweep_interval_ms: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_ms: 3_600_000,
            sweep_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MigrationConfig {
    pub interval_ms: u64,
    pub intervals: Vec<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            interval_ms: 300_000,
            intervals: vec!["1m".to_string()],
        }
    }
}

impl FlushConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl RetentionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

impl MigrationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: ledger.log
use_json: false
rotation: daily
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert!(config.session_id.is_none());
        assert!(config.log_directives.is_empty());
        assert!(config.postgres_url.is_none());
        assert_eq!(config.audit.data_dir, "./data/audit");
        assert_eq!(config.flush.interval(), Duration::from_secs(1));
        assert_eq!(config.retention.max_age(), Duration::from_secs(3600));
        assert_eq!(config.migration.intervals, vec!["1m".to_string()]);
    }

    #[test]
    fn test_sections_override_defaults() {
        let yaml = format!(
            "{}{}",
            MINIMAL,
            r#"
session_id: S1
flush:
  interval_ms: 250
  batch_size: 500
  flush_recovered: true
migration:
  interval_ms: 60000
  intervals: ["1m", "5m"]
"#
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.session_id.as_deref(), Some("S1"));
        assert_eq!(config.flush.batch_size, 500);
        assert!(config.flush.flush_recovered);
        assert_eq!(config.migration.intervals.len(), 2);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(AppConfig::load("does-not-exist").is_err());
    }
}
