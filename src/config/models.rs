// src/config/models.rs
use crate::health::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub timeout_ms: u64,
    pub cache_ttl_ms: u64,
    pub details_disabled: bool,
    pub max_error_message_length: usize,
    pub server: ServerConfig,
    /// Static metadata echoed in every result.
    pub info: BTreeMap<String, String>,
    pub http_checks: Vec<HttpCheckConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpCheckConfig {
    pub name: String,
    pub url: url::Url,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_contiguous_fails: u32,
    #[serde(default)]
    pub max_time_in_error_ms: u64,
    #[serde(default)]
    pub disable_panic_recovery: bool,
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub interval_ms: u64,
    #[serde(default)]
    pub initial_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            cache_ttl_ms: default_cache_ttl_ms(),
            details_disabled: false,
            max_error_message_length: default_max_error_message_length(),
            server: ServerConfig::default(),
            info: BTreeMap::new(),
            http_checks: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            path: default_path(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_cache_ttl_ms() -> u64 {
    1_000
}

fn default_max_error_message_length() -> usize {
    500
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_path() -> String {
    "/health".to_string()
}

impl Settings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "timeout_ms",
                reason: "must be positive".to_string(),
            });
        }

        if !self.server.path.starts_with('/') {
            return Err(ConfigError::InvalidSetting {
                field: "server.path",
                reason: format!("{:?} must start with '/'", self.server.path),
            });
        }

        let mut names = HashSet::new();
        for check in &self.http_checks {
            if check.name.trim().is_empty() {
                return Err(ConfigError::EmptyCheckName);
            }
            if !names.insert(check.name.as_str()) {
                return Err(ConfigError::DuplicateCheckName(check.name.clone()));
            }
            if !matches!(check.url.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidSetting {
                    field: "http_checks.url",
                    reason: format!("{} is not an http(s) url", check.url),
                });
            }
            if let Some(schedule) = &check.schedule {
                if schedule.interval_ms == 0 {
                    return Err(ConfigError::ZeroInterval(check.name.clone()));
                }
            }
        }

        Ok(())
    }
}

impl HttpCheckConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn max_time_in_error(&self) -> Duration {
        Duration::from_millis(self.max_time_in_error_ms)
    }
}

impl ScheduleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_check(name: &str) -> HttpCheckConfig {
        HttpCheckConfig {
            name: name.to_string(),
            url: "http://localhost:9000/ping".parse().unwrap(),
            timeout_ms: None,
            max_contiguous_fails: 0,
            max_time_in_error_ms: 0,
            disable_panic_recovery: false,
            schedule: None,
        }
    }

    #[test]
    fn test_defaults() {
        let settings: Settings = serde_yaml::from_str("{}").unwrap();
        assert_eq!(settings.timeout(), Duration::from_secs(10));
        assert_eq!(settings.cache_ttl(), Duration::from_secs(1));
        assert_eq!(settings.max_error_message_length, 500);
        assert_eq!(settings.server.path, "/health");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_duplicate_check_rejected() {
        let settings = Settings {
            http_checks: vec![http_check("api"), http_check("api")],
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::DuplicateCheckName(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut check = http_check("api");
        check.schedule = Some(ScheduleConfig {
            interval_ms: 0,
            initial_delay_ms: 0,
        });
        let settings = Settings {
            http_checks: vec![check],
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::ZeroInterval(_))));
    }

    #[test]
    fn test_non_http_url_rejected() {
        let mut check = http_check("files");
        check.url = "ftp://localhost/x".parse().unwrap();
        let settings = Settings {
            http_checks: vec![check],
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidSetting { field: "http_checks.url", .. })
        ));
    }
}
