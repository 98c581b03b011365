use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use hearth_relay::DEFAULT_CALL_TIMEOUT;

// Default listening address.
const DEFAULT_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

// Default listening port.
const DEFAULT_PORT: u16 = 8080;

/// Hub configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    address: IpAddr,
    port: u16,
    call_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HubConfig {
    /// Creates a [`HubConfig`] listening on `0.0.0.0:8080`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            port: DEFAULT_PORT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Sets the listening address.
    #[must_use]
    pub const fn address(mut self, address: IpAddr) -> Self {
        self.address = address;
        self
    }

    /// Sets the listening port.
    ///
    /// Port `0` asks the operating system for a free port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the maximum time a command waits for the worker reply.
    #[must_use]
    pub const fn call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Returns the socket address to listen on.
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Returns the command timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.call_timeout
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use super::HubConfig;

    #[test]
    fn test_hub_config() {
        assert_eq!(HubConfig::default().listen_address().to_string(), "0.0.0.0:8080");

        let config = HubConfig::new()
            .address(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .port(0)
            .call_timeout(Duration::from_secs(2));

        assert_eq!(config.listen_address().to_string(), "127.0.0.1:0");
        assert_eq!(config.timeout(), Duration::from_secs(2));
    }
}
