use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    /// 0 binds an ephemeral port.
    pub port: u16,
    /// Upper bound on handling one request, generation call included.
    pub handler_timeout: Duration,
    /// How often idle rate-limit buckets are swept.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            handler_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_all_interfaces() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn bind_addr_uses_host_and_port() {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..Default::default()
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn bind_addr_brackets_ipv6() {
        let config = ServerConfig {
            host: "::1".into(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.bind_addr(), "[::1]:8080");
    }
}
