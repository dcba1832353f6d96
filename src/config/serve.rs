//! `[serve]`: the `atoll serve` dev server and its rebuild loop.

use super::{ConfigError, defaults};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{net::IpAddr, time::Duration};

/// Quiet period bounds for `debounce_ms`.
const DEBOUNCE_RANGE: std::ops::RangeInclusive<u64> = 10..=10_000;

/// ```toml
/// [serve]
/// interface = "0.0.0.0"
/// port = 3000
/// watch = true
/// live_reload = true
/// debounce_ms = 300
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ServeConfig {
    /// IP address to bind, `127.0.0.1` unless the site should be reachable
    /// from other machines.
    #[serde(default = "defaults::serve::interface")]
    #[educe(Default = defaults::serve::interface())]
    pub interface: String,

    /// First port tried; the next few are tried when it is taken.
    #[serde(default = "defaults::serve::port")]
    #[educe(Default = defaults::serve::port())]
    pub port: u16,

    /// Rebuild on source changes.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub watch: bool,

    /// Development pages (and the error page) connect to `/ws` and reload
    /// after every rebuild.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub live_reload: bool,

    /// How long file events must stop before a rebuild starts.
    #[serde(default = "defaults::serve::debounce_ms")]
    #[educe(Default = defaults::serve::debounce_ms())]
    pub debounce_ms: u64,
}

impl ServeConfig {
    pub fn ip(&self) -> Result<IpAddr, ConfigError> {
        self.interface.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "[serve.interface] must be an IP address, got `{}`",
                self.interface
            ))
        })
    }

    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ip()?;
        if !DEBOUNCE_RANGE.contains(&self.debounce_ms) {
            return Err(ConfigError::Validation(format!(
                "[serve.debounce_ms] must be between {} and {}, got {}",
                DEBOUNCE_RANGE.start(),
                DEBOUNCE_RANGE.end(),
                self.debounce_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use super::*;

    #[test]
    fn test_defaults() {
        let config: SiteConfig = toml::from_str("").unwrap();

        assert_eq!(config.serve.ip().unwrap(), IpAddr::from([127, 0, 0, 1]));
        assert_eq!(config.serve.port, 5277);
        assert!(config.serve.watch);
        assert!(config.serve.live_reload);
        assert_eq!(config.serve.debounce(), Duration::from_millis(300));
        assert!(config.serve.validate().is_ok());
    }

    #[test]
    fn test_live_reload_off() {
        let config: SiteConfig =
            toml::from_str("[serve]\nlive_reload = false\ndebounce_ms = 50").unwrap();

        assert!(!config.serve.live_reload);
        assert_eq!(config.serve.debounce(), Duration::from_millis(50));
    }

    #[test]
    fn test_interface_must_be_an_address() {
        let config: SiteConfig = toml::from_str("[serve]\ninterface = \"localhost\"").unwrap();
        let err = config.serve.validate().unwrap_err().to_string();
        assert!(err.contains("[serve.interface]"), "{err}");

        let config: SiteConfig = toml::from_str("[serve]\ninterface = \"::1\"").unwrap();
        assert!(config.serve.validate().is_ok());
    }

    #[test]
    fn test_debounce_bounds() {
        let config: SiteConfig = toml::from_str("[serve]\ndebounce_ms = 0").unwrap();
        let err = config.serve.validate().unwrap_err().to_string();
        assert!(err.contains("between 10 and 10000"), "{err}");
    }

    #[test]
    fn test_unknown_key() {
        assert!(toml::from_str::<SiteConfig>("[serve]\nhot = true").is_err());
    }
}
