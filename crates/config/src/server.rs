//! HTTP server configuration settings.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::Deserialize;

/// The address the proxy binds to when none is configured.
pub(crate) const DEFAULT_PORT: u16 = 3000;

/// HTTP server configuration settings.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on.
    pub listen_address: Option<SocketAddr>,
}

impl ServerConfig {
    /// The configured listen address, or the default of `0.0.0.0:3000`.
    pub fn listen_address(&self) -> SocketAddr {
        self.listen_address
            .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT))
    }

    /// Replace only the port of the listen address, keeping the host.
    pub(crate) fn set_port(&mut self, port: u16) {
        let mut address = self.listen_address();
        address.set_port(port);
        self.listen_address = Some(address);
    }
}
