use std::{fmt, io, path::PathBuf, sync::Arc};

use thiserror::Error;
use tonic::{service::interceptor::InterceptedService, transport::Channel, Status};
use tracing::debug;

use crate::{
    config::{ChannelTuning, ConnectionOptions, SocketAddress},
    credentials::{ChannelCredential, EncodedCredentials, MacaroonInterceptor},
    proto::{chainrpc, invoicesrpc, lnrpc, routerrpc, signrpc, verrpc, walletrpc},
    registry::{self, ServiceDescriptor, ServiceEntry, ServiceKey, REGISTRY},
    transport::{direct, TransportError},
};

/// Library-level error type.
///
/// Construction failures are reported synchronously by [`build`]. Authentication and
/// handshake problems only show up once a call is made, as [`Error::GrpcStatus`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read {}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{credential} is not valid base64")]
    CredentialFormat {
        credential: &'static str,
        #[source]
        source: base64::DecodeError,
    },
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),
    #[error("no {0} supplied: set a node directory or both base64 credentials")]
    MissingCredential(&'static str),
    #[error("failed to load the {service} service definition: {reason}")]
    ProtoLoad { service: ServiceKey, reason: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    GrpcStatus(#[from] Box<Status>),
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Self::GrpcStatus(Box::new(status))
    }
}

/// Result alias that defaults to [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Channel wrapped with the macaroon interceptor; every stub in a bundle runs on one.
pub type AuthService = InterceptedService<Channel, MacaroonInterceptor>;

pub type LightningClient = lnrpc::lightning_client::LightningClient<AuthService>;
pub type WalletUnlockerClient = lnrpc::wallet_unlocker_client::WalletUnlockerClient<AuthService>;
pub type StateClient = lnrpc::state_client::StateClient<AuthService>;
pub type RouterClient = routerrpc::router_client::RouterClient<AuthService>;
pub type InvoicesClient = invoicesrpc::invoices_client::InvoicesClient<AuthService>;
pub type WalletKitClient = walletrpc::wallet_kit_client::WalletKitClient<AuthService>;
pub type SignerClient = signrpc::signer_client::SignerClient<AuthService>;
pub type ChainNotifierClient = chainrpc::chain_notifier_client::ChainNotifierClient<AuthService>;
pub type VersionerClient = verrpc::versioner_client::VersionerClient<AuthService>;

/// What a single stub was bound to when the bundle was built.
#[derive(Clone, Debug)]
pub struct ServiceBinding {
    pub entry: &'static ServiceEntry,
    pub descriptor: ServiceDescriptor,
    address: SocketAddress,
    credential: Arc<ChannelCredential>,
}

impl ServiceBinding {
    pub fn key(&self) -> ServiceKey {
        self.entry.key
    }

    pub fn address(&self) -> &SocketAddress {
        &self.address
    }

    pub fn credential(&self) -> &Arc<ChannelCredential> {
        &self.credential
    }
}

/// One client stub per registered service, all sharing a channel and credential.
///
/// Stubs are cheap to clone; clone one to issue calls concurrently. Dropping the bundle (and
/// every cloned stub) closes the underlying connection.
#[derive(Clone)]
pub struct ClientBundle {
    pub lightning: LightningClient,
    pub wallet_unlocker: WalletUnlockerClient,
    pub state: StateClient,
    pub router: RouterClient,
    pub invoices: InvoicesClient,
    pub wallet_kit: WalletKitClient,
    pub signer: SignerClient,
    pub chain_notifier: ChainNotifierClient,
    pub versioner: VersionerClient,
    address: SocketAddress,
    credential: Arc<ChannelCredential>,
    tuning: ChannelTuning,
    bindings: Vec<ServiceBinding>,
}

macro_rules! stub {
    ($client:ty, $svc:expr, $tuning:expr) => {
        <$client>::new($svc)
            .max_decoding_message_size($tuning.receive_limit())
            .max_encoding_message_size($tuning.send_limit())
    };
}

/// Build a [`ClientBundle`] from `options`.
///
/// Credentials are resolved first, so a missing macaroon or certificate fails before any
/// service definition is loaded. Must be called from within a Tokio runtime; no connection
/// is opened until the first call.
///
/// # Errors
/// See [`Error`]. No partial bundle is ever returned.
pub fn build(options: &ConnectionOptions) -> Result<ClientBundle> {
    let encoded = EncodedCredentials::resolve(options)?;
    let address = options.socket_address();

    let credential = ChannelCredential::from_encoded(&encoded)?;
    let tuning = options.tuning.clone();
    debug!(
        target: "lnd_grpc::client",
        %address,
        macaroon_len = credential.macaroon().hex().len() / 2,
        pinned_certificates = credential.tls().pinned_certificates(),
        "credentials ready"
    );

    let channel = direct::lazy_channel(&address, &tuning, credential.tls().client_config())?;
    let interceptor = MacaroonInterceptor::new(credential.clone());

    let mut bindings = Vec::with_capacity(REGISTRY.len());
    for entry in REGISTRY {
        let descriptor = registry::load_descriptor(entry)?;
        debug!(
            target: "lnd_grpc::client",
            service = %entry.key,
            proto = %entry.proto_path().display(),
            methods = descriptor.methods.len(),
            "service definition loaded"
        );
        bindings.push(ServiceBinding {
            entry,
            descriptor,
            address: address.clone(),
            credential: credential.clone(),
        });
    }

    let svc = || InterceptedService::new(channel.clone(), interceptor.clone());
    Ok(ClientBundle {
        lightning: stub!(LightningClient, svc(), tuning),
        wallet_unlocker: stub!(WalletUnlockerClient, svc(), tuning),
        state: stub!(StateClient, svc(), tuning),
        router: stub!(RouterClient, svc(), tuning),
        invoices: stub!(InvoicesClient, svc(), tuning),
        wallet_kit: stub!(WalletKitClient, svc(), tuning),
        signer: stub!(SignerClient, svc(), tuning),
        chain_notifier: stub!(ChainNotifierClient, svc(), tuning),
        versioner: stub!(VersionerClient, svc(), tuning),
        address,
        credential,
        tuning,
        bindings,
    })
}

impl ClientBundle {
    /// Keys of every service in the bundle, in registry order.
    pub fn services(&self) -> impl Iterator<Item = ServiceKey> + '_ {
        self.bindings.iter().map(ServiceBinding::key)
    }

    pub fn bindings(&self) -> &[ServiceBinding] {
        &self.bindings
    }

    pub fn binding(&self, key: ServiceKey) -> Option<&ServiceBinding> {
        self.bindings.iter().find(|b| b.key() == key)
    }

    pub fn address(&self) -> &SocketAddress {
        &self.address
    }

    /// The credential shared by every stub.
    pub fn credential(&self) -> &Arc<ChannelCredential> {
        &self.credential
    }

    pub fn tuning(&self) -> &ChannelTuning {
        &self.tuning
    }

    /// Call lnrpc.Lightning.GetInfo.
    ///
    /// # Errors
    /// Returns [`Error::GrpcStatus`] when the node rejects the call or cannot be reached.
    pub async fn get_info(&self) -> Result<lnrpc::GetInfoResponse> {
        let mut client = self.lightning.clone();
        let res = client.get_info(lnrpc::GetInfoRequest {}).await?;
        Ok(res.into_inner())
    }

    /// Call verrpc.Versioner.GetVersion.
    ///
    /// # Errors
    /// Returns [`Error::GrpcStatus`] when the node rejects the call or cannot be reached.
    pub async fn get_version(&self) -> Result<verrpc::Version> {
        let mut client = self.versioner.clone();
        let res = client.get_version(verrpc::VersionRequest {}).await?;
        Ok(res.into_inner())
    }
}

impl fmt::Debug for ClientBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBundle")
            .field("address", &self.address)
            .field("services", &self.services().collect::<Vec<_>>())
            .field("tuning", &self.tuning)
            .finish_non_exhaustive()
    }
}
