//! Configuration file support for the SRTLA sender

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// One egress path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathEntry {
    /// Local address to bind the path socket to (selects the egress
    /// interface), e.g. "192.168.1.23:0".
    pub bind: SocketAddr,
    /// Human-readable tag: "wifi", "cellular", ...
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Advisory weight; reported but not used by selection.
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Explicit virtual IP from 10.0.0.0/24, or omitted for auto.
    pub virtual_ip: Option<String>,
}

fn default_kind() -> String {
    "unknown".to_string()
}

fn default_weight() -> u32 {
    1
}

/// Sender settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderSettings {
    /// Loopback UDP port the SRT encoder sends to.
    pub local_port: u16,
    /// SRTLA receiver hostname or IP.
    pub receiver_host: String,
    /// SRTLA receiver port.
    pub receiver_port: u16,
    /// Egress paths.
    pub paths: Vec<PathEntry>,
    /// Statistics interval in seconds.
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_stats_interval() -> u64 {
    1
}

impl SenderSettings {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sender: SenderSettings,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Create an example configuration.
    pub fn example() -> Self {
        Config {
            sender: SenderSettings {
                local_port: 6000,
                receiver_host: "receiver.example.com".to_string(),
                receiver_port: 5000,
                paths: vec![
                    PathEntry {
                        bind: "192.168.1.23:0".parse().unwrap(),
                        kind: "wifi".to_string(),
                        weight: 1,
                        virtual_ip: None,
                    },
                    PathEntry {
                        bind: "10.124.8.11:0".parse().unwrap(),
                        kind: "cellular".to_string(),
                        weight: 1,
                        virtual_ip: None,
                    },
                ],
                stats_interval_secs: 1,
            },
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_roundtrips_through_toml() {
        let config = Config::example();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.sender.local_port, 6000);
        assert_eq!(parsed.sender.paths.len(), 2);
        assert_eq!(parsed.sender.paths[0].kind, "wifi");
    }

    #[test]
    fn defaults_apply() {
        let toml = r#"
            [sender]
            local_port = 6000
            receiver_host = "10.1.2.3"
            receiver_port = 5000

            [[sender.paths]]
            bind = "0.0.0.0:0"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.sender.stats_interval_secs, 1);
        assert_eq!(config.sender.paths[0].weight, 1);
        assert_eq!(config.sender.paths[0].kind, "unknown");
        assert!(config.sender.paths[0].virtual_ip.is_none());
    }
}
