//! Process-wide TLS state and the pinned-certificate verifier used for lnd connections.
//!
//! lnd serves a self-signed ECDSA certificate by default. Clients are expected to trust
//! exactly that certificate, and only ECDSA-authenticated cipher suites are offered during
//! the handshake.

use std::sync::{Arc, OnceLock};

use rustls::{
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider},
    pki_types::{pem::PemObject, CertificateDer, ServerName, UnixTime},
    CipherSuite, DigitallySignedStruct, SignatureScheme, SupportedCipherSuite,
};
use tracing::debug;

use crate::client::Error;

static PROCESS_PROVIDER: OnceLock<Arc<CryptoProvider>> = OnceLock::new();

/// Initialise the process-wide TLS provider and return it.
///
/// The first call builds the restricted provider and tries to install it as the rustls
/// process default. Later calls return the same provider without touching global state,
/// so this is safe to call from every bundle construction. A default installed by the
/// host application beforehand is left in place.
pub fn init_process_tls() -> Arc<CryptoProvider> {
    PROCESS_PROVIDER
        .get_or_init(|| {
            let provider = Arc::new(restricted_provider());
            if CryptoProvider::get_default().is_none() {
                if (*provider).clone().install_default().is_err() {
                    debug!(target: "lnd_grpc::tls", "crypto provider installed concurrently; keeping it");
                }
            } else {
                debug!(target: "lnd_grpc::tls", "process crypto provider already set; not replacing it");
            }
            debug!(
                target: "lnd_grpc::tls",
                suites = provider.cipher_suites.len(),
                "restricted TLS provider ready"
            );
            provider
        })
        .clone()
}

/// aws-lc-rs provider limited to TLS 1.3 suites and ECDHE-ECDSA TLS 1.2 suites.
pub fn restricted_provider() -> CryptoProvider {
    let mut provider = rustls::crypto::aws_lc_rs::default_provider();
    provider.cipher_suites.retain(is_allowed_suite);
    provider
}

fn is_allowed_suite(suite: &SupportedCipherSuite) -> bool {
    match suite {
        SupportedCipherSuite::Tls13(_) => true,
        SupportedCipherSuite::Tls12(_) => matches!(
            suite.suite(),
            CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
                | CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384
                | CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256
        ),
    }
}

/// Decode certificate file contents. PEM input may carry several certificates; anything
/// without a PEM header is treated as a single DER certificate.
pub fn parse_certificates(raw: &[u8]) -> Result<Vec<CertificateDer<'static>>, Error> {
    if raw.is_empty() {
        return Err(Error::InvalidCertificate("certificate is empty".into()));
    }
    if !raw.windows(11).any(|w| w == b"-----BEGIN ") {
        return Ok(vec![CertificateDer::from(raw.to_vec())]);
    }
    let certs = CertificateDer::pem_slice_iter(raw)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::InvalidCertificate(format!("malformed PEM: {e:?}")))?;
    if certs.is_empty() {
        return Err(Error::InvalidCertificate(
            "no CERTIFICATE section in PEM input".into(),
        ));
    }
    Ok(certs)
}

/// Build a client config that trusts exactly `certs`.
pub fn client_config(
    provider: Arc<CryptoProvider>,
    certs: Vec<CertificateDer<'static>>,
) -> Result<rustls::ClientConfig, Error> {
    let verifier = Arc::new(PinnedCertVerifier::new(certs, provider.clone()));
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::InvalidCertificate(format!("unusable TLS provider: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    Ok(config)
}

/// Accepts a server only if its end-entity certificate is byte-identical to one of the
/// pinned certificates. Host names are not checked: lnd certificates are commonly reached
/// through addresses that are missing from their SAN list, and the pin is strictly narrower.
#[derive(Debug)]
pub struct PinnedCertVerifier {
    pinned: Vec<CertificateDer<'static>>,
    provider: Arc<CryptoProvider>,
}

impl PinnedCertVerifier {
    pub fn new(pinned: Vec<CertificateDer<'static>>, provider: Arc<CryptoProvider>) -> Self {
        Self { pinned, provider }
    }
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if self
            .pinned
            .iter()
            .any(|cert| cert.as_ref() == end_entity.as_ref())
        {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::InvalidCertificate(
                rustls::CertificateError::UnknownIssuer,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
