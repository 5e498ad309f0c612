use std::{error::Error as StdError, sync::Arc};

use http::{uri::Scheme, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use tonic::transport::{Channel, Endpoint};
use tower::{service_fn, Service};
use tracing::debug;

use super::TransportError;
use crate::config::{ChannelTuning, SocketAddress};

type BoxError = Box<dyn StdError + Send + Sync>;

/// Create a lazily connecting TLS channel to `address`.
///
/// Nothing touches the network here; the first RPC dials the node. The endpoint URI keeps the
/// `http` scheme so tonic does not try to layer its own TLS. The connector upgrades each dial
/// to `https` and performs the handshake with `tls`.
///
/// # Errors
/// [`TransportError::NoRuntime`] outside a Tokio runtime (tonic spawns the channel worker on
/// creation), [`TransportError::InvalidEndpoint`] when `address` does not form a valid URI.
pub fn lazy_channel(
    address: &SocketAddress,
    tuning: &ChannelTuning,
    tls: Arc<rustls::ClientConfig>,
) -> Result<Channel, TransportError> {
    if tokio::runtime::Handle::try_current().is_err() {
        return Err(TransportError::NoRuntime);
    }
    let uri = address.endpoint_uri();
    let mut ep = Endpoint::from_shared(uri.clone())
        .map_err(|source| TransportError::InvalidEndpoint { uri, source })?
        .http2_keep_alive_interval(tuning.keepalive_interval)
        .keep_alive_timeout(tuning.keepalive_timeout)
        .keep_alive_while_idle(tuning.keepalive_while_idle);
    if let Some(timeout) = tuning.connect_timeout {
        ep = ep.connect_timeout(timeout);
    }
    if let Some(timeout) = tuning.request_timeout {
        ep = ep.timeout(timeout);
    }

    let connector = https_connector(tls.as_ref().clone());
    let svc = service_fn(move |uri: Uri| {
        let mut inner = connector.clone();
        async move {
            let mut parts = uri.into_parts();
            parts.scheme = Some(Scheme::HTTPS);
            let https_target_uri =
                Uri::from_parts(parts).map_err(|e| -> BoxError { BoxError::from(e) })?;
            debug!(target: "lnd_grpc::transport", uri = %https_target_uri, "dialing node");
            inner
                .call(https_target_uri)
                .await
                .map_err(|e| -> BoxError { BoxError::from(e) })
        }
    });

    Ok(ep.connect_with_connector_lazy(svc))
}

fn https_connector(tls: rustls::ClientConfig) -> HttpsConnector<HttpConnector> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(true);
    HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_only()
        .enable_http2()
        .wrap_connector(http)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls;
    use std::time::Duration;

    fn tls_config() -> Arc<rustls::ClientConfig> {
        let certs = tls::parse_certificates(&[0x30, 0x03, 0x02, 0x01, 0x00]).expect("der");
        Arc::new(tls::client_config(tls::init_process_tls(), certs).expect("config"))
    }

    #[test]
    fn requires_a_runtime() {
        let err = lazy_channel(
            &SocketAddress::default(),
            &ChannelTuning::default(),
            tls_config(),
        )
        .unwrap_err();
        assert!(matches!(err, TransportError::NoRuntime));
    }

    #[tokio::test]
    async fn invalid_host_is_rejected() {
        let address = SocketAddress::parse("bad host:10009");
        let err = lazy_channel(&address, &ChannelTuning::default(), tls_config()).unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint { .. }));
    }

    #[tokio::test]
    async fn channel_is_created_without_dialing() {
        let tuning = ChannelTuning {
            connect_timeout: Some(Duration::from_secs(1)),
            request_timeout: Some(Duration::from_secs(30)),
            ..ChannelTuning::default()
        };
        assert!(lazy_channel(&SocketAddress::parse("127.0.0.1:1"), &tuning, tls_config()).is_ok());
    }
}
