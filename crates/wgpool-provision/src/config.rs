//! Provisioning configuration.
//!
//! Loaded from a TOML file; every field has a default, so a missing file or a
//! partial file is fine.
//!
//! ```toml
//! state_dir = "/etc/wgpool"
//! wireguard_dir = "/etc/wireguard"
//! interface_prefix = "wg"
//! base_port = 51820
//! persistent_keepalive = 25
//! client_dns = ["1.1.1.1"]
//!
//! [firewall]
//! ipv4_tool = "iptables"
//! ipv6_tool = "ip6tables"
//! ```

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use wgpool_network::{PoolPaths, DEFAULT_BASE_PORT};

use crate::error::{ProvisionError, Result};

/// Firewall tools and the files their live rule sets are saved to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FirewallConfig {
    /// Tool named in IPv4 SNAT rules.
    pub ipv4_tool: String,
    /// Tool named in IPv6 SNAT rules.
    pub ipv6_tool: String,
    /// Destination of the saved IPv4 rule set.
    pub ipv4_rules: PathBuf,
    /// Destination of the saved IPv6 rule set.
    pub ipv6_rules: PathBuf,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            ipv4_tool: "iptables".to_string(),
            ipv6_tool: "ip6tables".to_string(),
            ipv4_rules: PathBuf::from("/etc/iptables/rules.v4"),
            ipv6_rules: PathBuf::from("/etc/iptables/rules.v6"),
        }
    }
}

/// Top-level provisioning configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Directory holding the pool files and used ledgers.
    pub state_dir: PathBuf,
    /// Directory holding interface and client artifacts.
    pub wireguard_dir: PathBuf,
    /// Prefix for derived interface names.
    pub interface_prefix: String,
    /// First port probed for a new interface.
    pub base_port: u16,
    /// Keep-alive written into client profiles, in seconds. Zero omits it.
    pub persistent_keepalive: u16,
    /// DNS servers written into client profiles.
    pub client_dns: Vec<IpAddr>,
    /// Firewall settings.
    pub firewall: FirewallConfig,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("/etc/wgpool"),
            wireguard_dir: PathBuf::from("/etc/wireguard"),
            interface_prefix: "wg".to_string(),
            base_port: DEFAULT_BASE_PORT,
            persistent_keepalive: 25,
            client_dns: vec![
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
                IpAddr::V6(Ipv6Addr::new(0x2606, 0x4700, 0x4700, 0, 0, 0, 0, 0x1111)),
            ],
            firewall: FirewallConfig::default(),
        }
    }
}

impl ProvisionConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Loads from `path` if given and present, otherwise returns defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read, parsed or validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => {
                debug!(config = %path.display(), "loading configuration");
                Self::from_file(path)
            }
            Some(path) => {
                debug!(config = %path.display(), "config file absent, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ProvisionError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.interface_prefix.is_empty() {
            return Err(ProvisionError::Config(
                "interface_prefix cannot be empty".to_string(),
            ));
        }
        if !self
            .interface_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ProvisionError::Config(
                "interface_prefix must contain only alphanumeric characters".to_string(),
            ));
        }
        if self.base_port == 0 {
            return Err(ProvisionError::Config(
                "base_port must be greater than 0".to_string(),
            ));
        }
        if self.firewall.ipv4_tool.trim().is_empty() || self.firewall.ipv6_tool.trim().is_empty() {
            return Err(ProvisionError::Config(
                "firewall tools cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Pool file locations under `state_dir`.
    #[must_use]
    pub fn pool_paths(&self) -> PoolPaths {
        PoolPaths::in_dir(&self.state_dir)
    }

    /// Keep-alive for client profiles, `None` when disabled.
    #[must_use]
    pub fn keepalive(&self) -> Option<u16> {
        (self.persistent_keepalive > 0).then_some(self.persistent_keepalive)
    }
}
