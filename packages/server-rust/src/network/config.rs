//! Listener settings, kept apart from the image pipeline's [`ServerConfig`].
//!
//! [`ServerConfig`]: crate::service::config::ServerConfig

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub host: String,
    /// 0 lets the OS pick a port; `NetworkModule::start` reports it.
    pub port: u16,
    /// Origins allowed by CORS. `"*"` allows all.
    pub cors_origins: Vec<String>,
    /// Whole-request budget; slower requests are answered with 408.
    pub request_timeout: Duration,
    /// How long in-flight image requests may run once shutdown starts.
    pub drain_timeout: Duration,
}

impl NetworkConfig {
    /// `host:port` as given, for logs.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(60),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_loopback_on_any_port() {
        let config = NetworkConfig::default();
        assert_eq!(config.listen_addr(), "127.0.0.1:0");
        assert_eq!(config.cors_origins, vec!["*"]);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.drain_timeout, Duration::from_secs(30));
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let config = NetworkConfig {
            host: "::1".to_string(),
            port: 8070,
            ..NetworkConfig::default()
        };
        assert_eq!(config.listen_addr(), "[::1]:8070");
    }
}
