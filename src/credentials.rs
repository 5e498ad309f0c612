use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tonic::{
    metadata::{AsciiMetadataKey, AsciiMetadataValue},
    service::Interceptor,
    Request, Status,
};
use tracing::debug;

use crate::{client::Error, config::ConnectionOptions, tls};

/// Metadata key lnd reads the macaroon from.
pub const MACAROON_HEADER: &str = "macaroon";

/// Conventional macaroon location below an lnd data directory.
pub fn macaroon_path(node_dir: &Path, network: &str) -> PathBuf {
    node_dir
        .join("data")
        .join("chain")
        .join("bitcoin")
        .join(network)
        .join("admin.macaroon")
}

/// Conventional TLS certificate location below an lnd data directory.
pub fn certificate_path(node_dir: &Path) -> PathBuf {
    node_dir.join("tls.cert")
}

/// Base64-encoded credential material, either read from disk or supplied by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedCredentials {
    pub macaroon_base64: String,
    pub certificate_base64: String,
}

impl EncodedCredentials {
    /// Resolve credential bytes from `opts`. The macaroon is read before the certificate.
    ///
    /// # Errors
    /// [`Error::FileAccess`] when a conventional file cannot be read, or
    /// [`Error::MissingCredential`] when neither a node directory nor both strings are set.
    pub fn resolve(opts: &ConnectionOptions) -> Result<Self, Error> {
        if let Some(dir) = &opts.node_dir {
            let macaroon = read_file(&macaroon_path(dir, opts.network()))?;
            let certificate = read_file(&certificate_path(dir))?;
            return Ok(Self {
                macaroon_base64: STANDARD.encode(macaroon),
                certificate_base64: STANDARD.encode(certificate),
            });
        }
        let macaroon_base64 = opts
            .macaroon_base64
            .clone()
            .ok_or(Error::MissingCredential("macaroon"))?;
        let certificate_base64 = opts
            .certificate_base64
            .clone()
            .ok_or(Error::MissingCredential("certificate"))?;
        Ok(Self {
            macaroon_base64,
            certificate_base64,
        })
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, Error> {
    let bytes = fs::read(path).map_err(|source| Error::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(target: "lnd_grpc::credentials", path = %path.display(), len = bytes.len(), "read credential file");
    Ok(bytes)
}

fn decode(credential: &'static str, value: &str) -> Result<Vec<u8>, Error> {
    STANDARD
        .decode(value.trim())
        .map_err(|source| Error::CredentialFormat { credential, source })
}

/// Static per-call credential: the macaroon rendered as a hex metadata value.
#[derive(Clone)]
pub struct MacaroonCredential {
    hex: String,
    value: AsciiMetadataValue,
}

impl MacaroonCredential {
    /// Decode a base64 macaroon and prepare its header value.
    ///
    /// # Errors
    /// [`Error::CredentialFormat`] when `macaroon_base64` is not valid base64.
    pub fn from_base64(macaroon_base64: &str) -> Result<Self, Error> {
        let raw = decode("macaroon", macaroon_base64)?;
        Ok(Self::from_bytes(&raw))
    }

    pub fn from_bytes(raw: &[u8]) -> Self {
        let hex = hex::encode(raw);
        // Lowercase hex is always a valid ASCII header value.
        let value = AsciiMetadataValue::try_from(hex.as_str())
            .unwrap_or_else(|_| AsciiMetadataValue::from_static(""));
        Self { hex, value }
    }

    /// Hex encoding of the raw macaroon, exactly as sent on the wire.
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Header pair attached to each call.
    pub fn header(&self) -> (&'static str, &str) {
        (MACAROON_HEADER, &self.hex)
    }
}

impl fmt::Debug for MacaroonCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacaroonCredential")
            .field("len", &(self.hex.len() / 2))
            .finish_non_exhaustive()
    }
}

/// TLS credential derived from the node certificate.
#[derive(Clone, Debug)]
pub struct TlsCredential {
    config: Arc<rustls::ClientConfig>,
    certificates: usize,
}

impl TlsCredential {
    /// Decode a base64 certificate (PEM or DER) and pin it.
    ///
    /// # Errors
    /// [`Error::CredentialFormat`] for invalid base64, [`Error::InvalidCertificate`] when no
    /// certificate can be extracted.
    pub fn from_base64(certificate_base64: &str) -> Result<Self, Error> {
        let raw = decode("certificate", certificate_base64)?;
        let certs = tls::parse_certificates(&raw)?;
        let certificates = certs.len();
        let config = tls::client_config(tls::init_process_tls(), certs)?;
        Ok(Self {
            config: Arc::new(config),
            certificates,
        })
    }

    pub fn client_config(&self) -> Arc<rustls::ClientConfig> {
        self.config.clone()
    }

    /// Number of pinned certificates.
    pub fn pinned_certificates(&self) -> usize {
        self.certificates
    }
}

/// Transport and per-call credentials combined; one instance is shared by a whole bundle.
#[derive(Debug)]
pub struct ChannelCredential {
    tls: TlsCredential,
    macaroon: MacaroonCredential,
}

impl ChannelCredential {
    pub fn new(tls: TlsCredential, macaroon: MacaroonCredential) -> Arc<Self> {
        Arc::new(Self { tls, macaroon })
    }

    /// Build both halves from resolved credential strings.
    ///
    /// # Errors
    /// Propagates decoding failures from either credential.
    pub fn from_encoded(creds: &EncodedCredentials) -> Result<Arc<Self>, Error> {
        let macaroon = MacaroonCredential::from_base64(&creds.macaroon_base64)?;
        let tls = TlsCredential::from_base64(&creds.certificate_base64)?;
        Ok(Self::new(tls, macaroon))
    }

    pub fn tls(&self) -> &TlsCredential {
        &self.tls
    }

    pub fn macaroon(&self) -> &MacaroonCredential {
        &self.macaroon
    }
}

/// Attaches the macaroon header to every outgoing request.
#[derive(Clone, Debug)]
pub struct MacaroonInterceptor {
    credential: Arc<ChannelCredential>,
}

impl MacaroonInterceptor {
    pub fn new(credential: Arc<ChannelCredential>) -> Self {
        Self { credential }
    }

    pub fn credential(&self) -> &Arc<ChannelCredential> {
        &self.credential
    }
}

impl Interceptor for MacaroonInterceptor {
    fn call(&mut self, mut req: Request<()>) -> Result<Request<()>, Status> {
        req.metadata_mut().insert(
            AsciiMetadataKey::from_static(MACAROON_HEADER),
            self.credential.macaroon.value.clone(),
        );
        Ok(req)
    }
}
