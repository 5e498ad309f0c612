use std::{fmt, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Host used when the socket option is absent or has an empty host segment.
pub const DEFAULT_HOST: &str = "localhost";
/// lnd's default gRPC listen port.
pub const DEFAULT_PORT: &str = "10009";
/// Network used to locate the macaroon when only a node directory is given.
pub const DEFAULT_NETWORK: &str = "mainnet";

/// Connection options consumed by [`crate::client::build`].
///
/// Credentials come either from an lnd data directory (`node_dir` + `network`) or from
/// base64-encoded macaroon/certificate strings. When `node_dir` is set it wins.
///
/// ```
/// use lnd_grpc::config::ConnectionOptions;
///
/// let opts = ConnectionOptions::default()
///     .with_node_dir("/home/satoshi/.lnd")
///     .with_network("testnet")
///     .with_socket("127.0.0.1:10010");
/// assert_eq!(opts.network(), "testnet");
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    /// lnd data directory containing `tls.cert` and `data/chain/bitcoin/<network>/`.
    pub node_dir: Option<PathBuf>,
    /// Chain network selecting the macaroon directory (`mainnet`, `testnet`, `regtest`, ...).
    pub network: Option<String>,
    /// Base64 of the raw macaroon bytes.
    pub macaroon_base64: Option<String>,
    /// Base64 of the certificate file contents (PEM or DER).
    pub certificate_base64: Option<String>,
    /// `host:port` of the gRPC listener.
    pub socket: Option<String>,
    /// Channel tuning shared by every stub.
    pub tuning: ChannelTuning,
}

impl ConnectionOptions {
    #[must_use]
    pub fn with_node_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.node_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Supply credentials directly instead of reading them from a node directory.
    #[must_use]
    pub fn with_credentials(
        mut self,
        macaroon_base64: impl Into<String>,
        certificate_base64: impl Into<String>,
    ) -> Self {
        self.macaroon_base64 = Some(macaroon_base64.into());
        self.certificate_base64 = Some(certificate_base64.into());
        self
    }

    #[must_use]
    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    #[must_use]
    pub fn with_tuning(mut self, tuning: ChannelTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Network name, falling back to [`DEFAULT_NETWORK`].
    pub fn network(&self) -> &str {
        self.network.as_deref().unwrap_or(DEFAULT_NETWORK)
    }

    /// Resolve the socket option into a host/port pair.
    pub fn socket_address(&self) -> SocketAddress {
        self.socket
            .as_deref()
            .map_or_else(SocketAddress::default, SocketAddress::parse)
    }
}

/// Host/port pair the stubs are bound to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketAddress {
    pub host: String,
    pub port: String,
}

impl SocketAddress {
    /// Parse `host:port`, splitting on the first colon.
    ///
    /// Parsing is lenient on purpose: an empty or missing segment falls back to
    /// [`DEFAULT_HOST`] / [`DEFAULT_PORT`] instead of producing an error, and anything after
    /// a second colon is ignored. Bracketed IPv6 literals are therefore not supported.
    pub fn parse(socket: &str) -> Self {
        let mut parts = socket.split(':');
        let host = parts.next().filter(|h| !h.is_empty()).unwrap_or(DEFAULT_HOST);
        let port = parts.next().filter(|p| !p.is_empty()).unwrap_or(DEFAULT_PORT);
        Self {
            host: host.to_string(),
            port: port.to_string(),
        }
    }

    /// URI handed to the tonic endpoint. TLS is layered in by the connector, so the scheme
    /// stays `http` here.
    pub fn endpoint_uri(&self) -> String {
        format!("http://{self}")
    }
}

impl Default for SocketAddress {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT.to_string(),
        }
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// HTTP/2 channel tuning applied identically to every stub in a bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelTuning {
    /// Largest inbound message accepted. `None` disables the limit.
    pub max_receive_message_size: Option<usize>,
    /// Largest outbound message sent. `None` disables the limit.
    pub max_send_message_size: Option<usize>,
    /// Interval between HTTP/2 keepalive pings.
    pub keepalive_interval: Duration,
    /// How long to wait for a ping acknowledgement before dropping the connection.
    pub keepalive_timeout: Duration,
    /// Keep pinging while no calls are in flight.
    pub keepalive_while_idle: bool,
    /// Timeout for establishing the TCP + TLS connection.
    pub connect_timeout: Option<Duration>,
    /// Deadline applied to every request issued on the channel.
    pub request_timeout: Option<Duration>,
}

impl ChannelTuning {
    pub(crate) fn receive_limit(&self) -> usize {
        self.max_receive_message_size.unwrap_or(usize::MAX)
    }

    pub(crate) fn send_limit(&self) -> usize {
        self.max_send_message_size.unwrap_or(usize::MAX)
    }
}

impl Default for ChannelTuning {
    fn default() -> Self {
        Self {
            max_receive_message_size: None,
            max_send_message_size: None,
            keepalive_interval: Duration::from_millis(20_000),
            keepalive_timeout: Duration::from_millis(5_000),
            keepalive_while_idle: true,
            connect_timeout: None,
            request_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_with_host_and_port() {
        let addr = SocketAddress::parse("example.com:9999");
        assert_eq!(addr.host, "example.com");
        assert_eq!(addr.port, "9999");
        assert_eq!(addr.endpoint_uri(), "http://example.com:9999");
    }

    #[test]
    fn socket_omitted_uses_defaults() {
        let addr = ConnectionOptions::default().socket_address();
        assert_eq!(addr, SocketAddress::default());
        assert_eq!(addr.to_string(), "localhost:10009");
    }

    // Lenient by design: malformed sockets degrade to defaults rather than erroring.
    #[test]
    fn socket_without_port_keeps_default_port() {
        let addr = SocketAddress::parse("onlyhost");
        assert_eq!(addr.host, "onlyhost");
        assert_eq!(addr.port, DEFAULT_PORT);
    }

    #[test]
    fn socket_without_host_keeps_default_host() {
        let addr = SocketAddress::parse(":8080");
        assert_eq!(addr.host, DEFAULT_HOST);
        assert_eq!(addr.port, "8080");

        let addr = SocketAddress::parse("node:");
        assert_eq!(addr.host, "node");
        assert_eq!(addr.port, DEFAULT_PORT);
    }

    #[test]
    fn socket_ignores_trailing_segments() {
        let addr = SocketAddress::parse("a:1:2");
        assert_eq!(addr.to_string(), "a:1");
    }

    #[test]
    fn network_defaults_to_mainnet() {
        assert_eq!(ConnectionOptions::default().network(), DEFAULT_NETWORK);
    }

    #[test]
    fn tuning_defaults_are_unbounded() {
        let tuning = ChannelTuning::default();
        assert_eq!(tuning.receive_limit(), usize::MAX);
        assert_eq!(tuning.send_limit(), usize::MAX);
        assert_eq!(tuning.keepalive_interval, Duration::from_secs(20));
        assert_eq!(tuning.keepalive_timeout, Duration::from_secs(5));
        assert!(tuning.keepalive_while_idle);
    }
}
