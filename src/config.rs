//! Configuration for RelayKV
//!
//! Centralized configuration with sensible defaults. CLI flags are parsed
//! once at startup by the binaries and converted into these immutable
//! objects; nothing reads process-wide state afterwards.

use std::time::Duration;

use crate::error::{RelayError, Result};

/// Configuration for the load balancer process
#[derive(Debug, Clone)]
pub struct BalancerConfig {
    // -------------------------------------------------------------------------
    // Frontend Configuration
    // -------------------------------------------------------------------------
    /// Port the balancer listens on
    pub port: u16,

    // -------------------------------------------------------------------------
    // Upstream Configuration
    // -------------------------------------------------------------------------
    /// Backend addresses (host:port), fixed for the process lifetime
    pub backends: Vec<String>,

    /// Timeout applied to health probes and forwarded requests
    pub timeout: Duration,

    /// Whether backends are reached over HTTPS
    pub https: bool,

    /// How often each backend is probed for liveness
    pub probe_interval: Duration,

    // -------------------------------------------------------------------------
    // Tracing Configuration
    // -------------------------------------------------------------------------
    /// Whether to tag responses with the `lb-from` header
    pub trace: bool,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            port: 8090,
            backends: vec![
                "server1:8080".to_string(),
                "server2:8080".to_string(),
                "server3:8080".to_string(),
            ],
            timeout: Duration::from_secs(3),
            https: false,
            probe_interval: Duration::from_secs(10),
            trace: false,
        }
    }
}

impl BalancerConfig {
    /// Create a new config builder
    pub fn builder() -> BalancerConfigBuilder {
        BalancerConfigBuilder::default()
    }

    /// URL scheme used for all upstream traffic
    pub fn scheme(&self) -> &'static str {
        if self.https {
            "https"
        } else {
            "http"
        }
    }

    /// Reject configurations the balancer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(RelayError::Config("backend list is empty".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(RelayError::Config("timeout must be positive".to_string()));
        }
        Ok(())
    }
}

/// Builder for BalancerConfig
#[derive(Default)]
pub struct BalancerConfigBuilder {
    config: BalancerConfig,
}

impl BalancerConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn backends<I, S>(mut self, addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.backends = addrs.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn https(mut self, https: bool) -> Self {
        self.config.https = https;
        self
    }

    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.config.probe_interval = interval;
        self
    }

    pub fn trace(mut self, trace: bool) -> Self {
        self.config.trace = trace;
        self
    }

    pub fn build(self) -> BalancerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BalancerConfig::default();

        assert_eq!(config.port, 8090);
        assert_eq!(config.backends.len(), 3);
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.probe_interval, Duration::from_secs(10));
        assert!(!config.https);
        assert!(!config.trace);
    }

    #[test]
    fn test_scheme_follows_https_flag() {
        let config = BalancerConfig::builder().https(false).build();
        assert_eq!(config.scheme(), "http");

        let config = BalancerConfig::builder().https(true).build();
        assert_eq!(config.scheme(), "https");
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        assert!(BalancerConfig::default().validate().is_ok());

        let no_backends = BalancerConfig::builder().backends(Vec::<String>::new()).build();
        assert!(no_backends.validate().is_err());

        let zero_timeout = BalancerConfig::builder().timeout(Duration::ZERO).build();
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = BalancerConfig::builder()
            .port(9000)
            .backends(["a:1", "b:2"])
            .timeout(Duration::from_secs(1))
            .trace(true)
            .build();

        assert_eq!(config.port, 9000);
        assert_eq!(config.backends, vec!["a:1", "b:2"]);
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert!(config.trace);
    }
}
