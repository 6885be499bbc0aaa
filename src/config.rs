use anyhow::{Result, anyhow};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::stats::aggregator::AggregatorConfig;
use crate::stats::query::SortKey;
use crate::stats::rate::DEFAULT_MAX_SAMPLES;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Network interface to monitor
    pub interface: Option<String>,
    /// BPF filter applied to the capture
    pub bpf_filter: Option<String>,
    /// Display refresh interval in milliseconds
    pub refresh_interval: u64,
    /// Connection table refresh interval in milliseconds
    pub connection_refresh_interval: u64,
    /// Rate window in milliseconds
    pub rate_window: u64,
    /// Capacity of the packet event queue
    pub queue_capacity: usize,
    /// Initial sort column
    pub sort: SortKey,
    /// Custom configuration file path
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: None,
            bpf_filter: None,
            refresh_interval: 1000,
            connection_refresh_interval: 1000,
            rate_window: 5000,
            queue_capacity: 10_000,
            sort: SortKey::Total,
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = if let Some(path) = path {
            PathBuf::from(path)
        } else {
            Self::find_config_file()?
        };

        let mut config = Config::default();

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            config.apply(&content);
            config.config_path = Some(config_path);
        } else if path.is_some() {
            return Err(anyhow!(
                "Config file not found: {}",
                config_path.display()
            ));
        }

        Ok(config)
    }

    /// Apply `key: value` lines on top of the current values.
    /// Unknown keys and unparsable values are ignored.
    pub fn apply(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().trim_matches('"');

            match key {
                "interface" => {
                    self.interface = Some(value.to_string());
                }
                "bpf_filter" => {
                    self.bpf_filter = Some(value.to_string());
                }
                "refresh_interval" => {
                    if let Ok(interval) = value.parse::<u64>() {
                        self.refresh_interval = interval;
                    }
                }
                "connection_refresh_interval" => {
                    if let Ok(interval) = value.parse::<u64>() {
                        self.connection_refresh_interval = interval;
                    }
                }
                "rate_window" => {
                    if let Ok(window) = value.parse::<u64>() {
                        self.rate_window = window;
                    }
                }
                "queue_capacity" => {
                    if let Ok(capacity) = value.parse::<usize>() {
                        self.queue_capacity = capacity;
                    }
                }
                "sort" => match value.parse::<SortKey>() {
                    Ok(sort) => self.sort = sort,
                    Err(e) => log::warn!("Ignoring config value: {}", e),
                },
                _ => {
                    log::debug!("Ignoring unknown config key: {}", key);
                }
            }
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval == 0 {
            return Err(anyhow!("refresh_interval must be greater than zero"));
        }
        if self.connection_refresh_interval == 0 {
            return Err(anyhow!(
                "connection_refresh_interval must be greater than zero"
            ));
        }
        if self.rate_window == 0 {
            return Err(anyhow!("rate_window must be greater than zero"));
        }
        if self.queue_capacity == 0 {
            return Err(anyhow!("queue_capacity must be greater than zero"));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval)
    }

    pub fn connection_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.connection_refresh_interval)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window)
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            queue_capacity: self.queue_capacity,
            window: self.rate_window(),
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }

    /// Find configuration file
    fn find_config_file() -> Result<PathBuf> {
        // Try XDG config directory first
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let xdg_path = PathBuf::from(xdg_config).join("xnettop/config.yml");
            if xdg_path.exists() {
                return Ok(xdg_path);
            }
        }

        // Try ~/.config/xnettop
        let home = Self::get_home_dir()?;
        let home_config = home.join(".config/xnettop/config.yml");
        if home_config.exists() {
            return Ok(home_config);
        }

        let current_config = PathBuf::from("config.yml");
        if current_config.exists() {
            return Ok(current_config);
        }

        Ok(home_config)
    }

    fn get_home_dir() -> Result<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            return Ok(PathBuf::from(home));
        }

        if let Ok(userprofile) = std::env::var("USERPROFILE") {
            return Ok(PathBuf::from(userprofile));
        }

        Err(anyhow!("Could not determine home directory"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
        assert_eq!(config.rate_window(), Duration::from_secs(5));
        assert_eq!(config.queue_capacity, 10_000);
        assert_eq!(config.sort, SortKey::Total);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_key_values() {
        let mut config = Config::default();
        config.apply(
            "# xnettop config\n\
             interface: eth0\n\
             refresh_interval: 500\n\
             connection_refresh_interval: 2000\n\
             rate_window: 3000\n\
             queue_capacity: 64\n\
             sort: name\n\
             unknown_key: 1\n",
        );

        assert_eq!(config.interface.as_deref(), Some("eth0"));
        assert_eq!(config.refresh_interval, 500);
        assert_eq!(config.connection_refresh_interval, 2000);
        assert_eq!(config.rate_window(), Duration::from_secs(3));
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.sort, SortKey::Name);

        let aggregator = config.aggregator_config();
        assert_eq!(aggregator.queue_capacity, 64);
        assert_eq!(aggregator.window, Duration::from_secs(3));
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let mut config = Config::default();
        config.apply("refresh_interval: soon\nsort: bytes\nqueue_capacity: -1\n");
        assert_eq!(config.refresh_interval, 1000);
        assert_eq!(config.sort, SortKey::Total);
        assert_eq!(config.queue_capacity, 10_000);
    }

    #[test]
    fn test_bpf_filter_keeps_colons() {
        let mut config = Config::default();
        config.apply("bpf_filter: ip6 host fe80::1\n");
        assert_eq!(config.bpf_filter.as_deref(), Some("ip6 host fe80::1"));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = Config {
            rate_window: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(Config::load(Some("/nonexistent/xnettop/config.yml")).is_err());
    }
}
