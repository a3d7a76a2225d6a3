//! Media gateway configuration.
//!
//! ```toml
//! bind_address = "10.0.0.5"
//! external_address = "203.0.113.7"
//! default_codec_order = ["PCMA", "PCMU", "telephone-event"]
//! response_timeout_ms = 5000
//! half_open_timeout_ms = 30000
//!
//! [port_range]
//! min = 40000
//! max = 40999
//! ```

use crate::media::codec::lookup_codec;
use crate::media::port_allocator::PortRange;
use rvoip_infra_common::logging::LoggingConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Prefix of environment overrides, e.g. `MGCP__RESPONSE_TIMEOUT_MS`
pub const ENV_PREFIX: &str = "MGCP";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Load(#[from] rvoip_infra_common::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MgcpConfig {
    /// Address RTP sessions bind to
    pub bind_address: IpAddr,
    /// Address advertised in SDP when behind NAT
    pub external_address: Option<IpAddr>,
    pub port_range: PortRange,
    /// Local codecs in preference order
    pub default_codec_order: Vec<String>,
    /// Deadline for opening and modifying
    pub response_timeout_ms: u64,
    /// Idle limit for a connection that never received a remote description
    pub half_open_timeout_ms: Option<u64>,
    /// Idle limit for an open connection
    pub open_timeout_ms: Option<u64>,
    /// Endpoint name prefixes that accept `$` (e.g. `mobicents/bridge/`)
    pub endpoint_namespaces: Vec<String>,
    /// Endpoints registered at startup
    pub static_endpoints: Vec<String>,
    /// RTP CNAME; a random one is generated when unset
    pub cname: Option<String>,
    pub logging: LoggingConfig,
}

impl Default for MgcpConfig {
    fn default() -> Self {
        MgcpConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            external_address: None,
            port_range: PortRange::default(),
            default_codec_order: vec![
                "PCMU".to_string(),
                "PCMA".to_string(),
                "telephone-event".to_string(),
            ],
            response_timeout_ms: 5000,
            half_open_timeout_ms: Some(30_000),
            open_timeout_ms: None,
            endpoint_namespaces: vec![
                "mobicents/bridge/".to_string(),
                "mobicents/ivr/".to_string(),
                "mobicents/cnf/".to_string(),
            ],
            static_endpoints: Vec::new(),
            cname: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl MgcpConfig {
    /// Load from a file, then apply `MGCP__*` environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: MgcpConfig = rvoip_infra_common::config::load_config(path, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: MgcpConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.port_range.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "port range {}-{} holds no even port",
                self.port_range.min, self.port_range.max
            )));
        }
        if self.response_timeout_ms == 0 {
            return Err(ConfigError::Invalid("response_timeout_ms must be positive".into()));
        }
        if self.half_open_timeout_ms == Some(0) || self.open_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("idle timeouts must be positive when set".into()));
        }
        let known = self
            .default_codec_order
            .iter()
            .filter(|name| lookup_codec(name).map_or(false, |f| !f.is_dtmf()))
            .count();
        if known == 0 {
            return Err(ConfigError::Invalid(
                "default_codec_order names no supported audio codec".into(),
            ));
        }
        if let Some(ns) = self.endpoint_namespaces.iter().find(|ns| !ns.ends_with('/')) {
            return Err(ConfigError::Invalid(format!("endpoint namespace '{}' must end with '/'", ns)));
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn half_open_timeout(&self) -> Option<Duration> {
        self.half_open_timeout_ms.map(Duration::from_millis)
    }

    pub fn open_timeout(&self) -> Option<Duration> {
        self.open_timeout_ms.map(Duration::from_millis)
    }

    /// Address written into local descriptions
    pub fn advertised_address(&self) -> IpAddr {
        self.external_address.unwrap_or(self.bind_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MgcpConfig::default();
        config.validate().unwrap();
        assert_eq!(config.response_timeout(), Duration::from_secs(5));
        assert_eq!(config.half_open_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.open_timeout(), None);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = MgcpConfig::from_toml_str(
            r#"
            bind_address = "10.0.0.5"
            external_address = "203.0.113.7"
            default_codec_order = ["PCMA"]
            half_open_timeout_ms = 1000

            [port_range]
            min = 40000
            max = 40010
            "#,
        )
        .unwrap();

        assert_eq!(config.advertised_address(), "203.0.113.7".parse::<IpAddr>().unwrap());
        assert_eq!(config.port_range, PortRange::new(40000, 40010));
        assert_eq!(config.half_open_timeout_ms, Some(1000));
        assert_eq!(config.response_timeout_ms, 5000);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(MgcpConfig::from_toml_str("response_timeout_ms = 0").is_err());
        assert!(MgcpConfig::from_toml_str("default_codec_order = [\"telephone-event\"]").is_err());
        assert!(MgcpConfig::from_toml_str("[port_range]\nmin = 9\nmax = 9").is_err());
        assert!(MgcpConfig::from_toml_str("endpoint_namespaces = [\"mobicents/ivr\"]").is_err());
        assert!(matches!(
            MgcpConfig::from_toml_str("response_timeout_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
