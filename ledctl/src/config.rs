use std::time::Duration;

use crate::error::Error;

pub const DEFAULT_PORT: u16 = 5200;

/// Where the controller lives and how long to wait for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// TCP handshake plus the first probe reply
    pub connect_timeout: Duration,
    /// Wait for the reply to one command
    pub response_timeout: Duration,
    pub poll_interval: Duration,
}

impl Config {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(3),
            response_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.host.is_empty() {
            return Err(Error::InvalidConfig("host is empty".to_string()));
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig("port must not be 0".to_string()));
        }
        if self.connect_timeout.is_zero() || self.response_timeout.is_zero() {
            return Err(Error::InvalidConfig("timeouts must not be zero".to_string()));
        }
        // a probe must finish before the next tick is due
        if self.response_timeout >= self.poll_interval {
            return Err(Error::InvalidConfig(format!(
                "response timeout {:?} must be shorter than poll interval {:?}",
                self.response_timeout, self.poll_interval
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::new("10.0.0.5");
        assert_eq!(config.port, 5200);
        assert_eq!(config.addr(), "10.0.0.5:5200");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn response_timeout_must_undercut_poll_interval() {
        let mut config = Config::new("10.0.0.5");
        config.response_timeout = config.poll_interval;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_empty_host() {
        assert!(Config::new("").validate().is_err());
    }
}
