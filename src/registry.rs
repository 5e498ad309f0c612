//! Static table of the lnd services exposed by a [`crate::ClientBundle`].

use std::{fmt, path::PathBuf, str::FromStr, sync::OnceLock};

use prost::{DecodeError, Message};
use prost_types::FileDescriptorSet;

use crate::{client::Error, proto};

/// Short name of a registered service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKey {
    Lightning,
    WalletUnlocker,
    State,
    Router,
    Invoices,
    WalletKit,
    Signer,
    ChainNotifier,
    Versioner,
}

impl ServiceKey {
    pub const ALL: [ServiceKey; 9] = [
        ServiceKey::Lightning,
        ServiceKey::WalletUnlocker,
        ServiceKey::State,
        ServiceKey::Router,
        ServiceKey::Invoices,
        ServiceKey::WalletKit,
        ServiceKey::Signer,
        ServiceKey::ChainNotifier,
        ServiceKey::Versioner,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceKey::Lightning => "lightning",
            ServiceKey::WalletUnlocker => "walletUnlocker",
            ServiceKey::State => "state",
            ServiceKey::Router => "router",
            ServiceKey::Invoices => "invoices",
            ServiceKey::WalletKit => "walletKit",
            ServiceKey::Signer => "signer",
            ServiceKey::ChainNotifier => "chainNotifier",
            ServiceKey::Versioner => "versioner",
        }
    }

    /// Registry entry for this key. [`REGISTRY`] is laid out in declaration order.
    pub fn entry(self) -> &'static ServiceEntry {
        &REGISTRY[self as usize]
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown service key: {0}")]
pub struct UnknownServiceKey(pub String);

impl FromStr for ServiceKey {
    type Err = UnknownServiceKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownServiceKey(s.to_string()))
    }
}

/// One registered service: key, package-qualified type and defining proto file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceEntry {
    pub key: ServiceKey,
    pub type_name: &'static str,
    pub proto_file: &'static str,
}

impl ServiceEntry {
    /// Protobuf package, e.g. `routerrpc` for `routerrpc.Router`.
    pub fn package(&self) -> &'static str {
        self.type_name
            .rsplit_once('.')
            .map_or("", |(package, _)| package)
    }

    /// Unqualified service name, e.g. `Router`.
    pub fn service_name(&self) -> &'static str {
        self.type_name
            .rsplit_once('.')
            .map_or(self.type_name, |(_, name)| name)
    }

    /// Location of the bundled definition: `<install dir>/proto/<file>`.
    pub fn proto_path(&self) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("proto")
            .join(self.proto_file)
    }
}

/// Every service a bundle exposes, in construction order.
pub static REGISTRY: &[ServiceEntry] = &[
    ServiceEntry {
        key: ServiceKey::Lightning,
        type_name: "lnrpc.Lightning",
        proto_file: "lightning.proto",
    },
    ServiceEntry {
        key: ServiceKey::WalletUnlocker,
        type_name: "lnrpc.WalletUnlocker",
        proto_file: "walletunlocker.proto",
    },
    ServiceEntry {
        key: ServiceKey::State,
        type_name: "lnrpc.State",
        proto_file: "stateservice.proto",
    },
    ServiceEntry {
        key: ServiceKey::Router,
        type_name: "routerrpc.Router",
        proto_file: "router.proto",
    },
    ServiceEntry {
        key: ServiceKey::Invoices,
        type_name: "invoicesrpc.Invoices",
        proto_file: "invoices.proto",
    },
    ServiceEntry {
        key: ServiceKey::WalletKit,
        type_name: "walletrpc.WalletKit",
        proto_file: "walletkit.proto",
    },
    ServiceEntry {
        key: ServiceKey::Signer,
        type_name: "signrpc.Signer",
        proto_file: "signer.proto",
    },
    ServiceEntry {
        key: ServiceKey::ChainNotifier,
        type_name: "chainrpc.ChainNotifier",
        proto_file: "chainnotifier.proto",
    },
    ServiceEntry {
        key: ServiceKey::Versioner,
        type_name: "verrpc.Versioner",
        proto_file: "verrpc.proto",
    },
];

/// Compiled view of one registered service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub type_name: &'static str,
    pub proto_file: &'static str,
    /// RPC method names in declaration order.
    pub methods: Vec<String>,
}

/// Load the descriptor of `entry` from the descriptor set embedded at build time. The set is
/// decoded on first use and shared by every later lookup in the process.
///
/// # Errors
/// [`Error::ProtoLoad`] when the set does not decode, the file is absent, or it does not
/// declare the expected package and service.
pub fn load_descriptor(entry: &ServiceEntry) -> Result<ServiceDescriptor, Error> {
    static BUNDLED: OnceLock<Result<FileDescriptorSet, DecodeError>> = OnceLock::new();
    load_descriptor_from(&BUNDLED, proto::FILE_DESCRIPTOR_SET, entry)
}

/// Look `entry` up in the set cached in `cache`, decoding `encoded` into it if it is empty.
pub(crate) fn load_descriptor_from(
    cache: &OnceLock<Result<FileDescriptorSet, DecodeError>>,
    encoded: &[u8],
    entry: &ServiceEntry,
) -> Result<ServiceDescriptor, Error> {
    let fail = |reason: String| Error::ProtoLoad {
        service: entry.key,
        reason,
    };
    let set = cache
        .get_or_init(|| FileDescriptorSet::decode(encoded))
        .as_ref()
        .map_err(|e| fail(format!("descriptor set does not decode: {e}")))?;
    let file = set
        .file
        .iter()
        .find(|f| f.name() == entry.proto_file)
        .ok_or_else(|| fail(format!("{} is not bundled", entry.proto_path().display())))?;
    if file.package() != entry.package() {
        return Err(fail(format!(
            "{} declares package {:?}, expected {:?}",
            entry.proto_file,
            file.package(),
            entry.package()
        )));
    }
    let service = file
        .service
        .iter()
        .find(|s| s.name() == entry.service_name())
        .ok_or_else(|| fail(format!("{} has no service {}", entry.proto_file, entry.type_name)))?;
    Ok(ServiceDescriptor {
        type_name: entry.type_name,
        proto_file: entry.proto_file,
        methods: service.method.iter().map(|m| m.name().to_string()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_key_has_exactly_one_entry() {
        assert_eq!(REGISTRY.len(), ServiceKey::ALL.len());
        let keys: HashSet<_> = REGISTRY.iter().map(|e| e.key).collect();
        assert_eq!(keys.len(), REGISTRY.len());
        for (key, entry) in ServiceKey::ALL.into_iter().zip(REGISTRY) {
            assert_eq!(entry.key, key);
            assert_eq!(key.entry(), entry);
        }
    }

    #[test]
    fn key_names_round_trip() {
        for key in ServiceKey::ALL {
            assert_eq!(key.as_str().parse::<ServiceKey>().expect("parse"), key);
        }
        assert!("lnd".parse::<ServiceKey>().is_err());
    }

    #[test]
    fn package_and_service_split() {
        let entry = ServiceKey::Router.entry();
        assert_eq!(entry.package(), "routerrpc");
        assert_eq!(entry.service_name(), "Router");
    }

    #[test]
    fn bundled_proto_files_exist() {
        for entry in REGISTRY {
            assert!(
                entry.proto_path().is_file(),
                "missing {}",
                entry.proto_path().display()
            );
        }
    }

    #[test]
    fn descriptors_load_for_every_entry() {
        for entry in REGISTRY {
            let desc = load_descriptor(entry).expect("descriptor");
            assert_eq!(desc.type_name, entry.type_name);
            assert!(!desc.methods.is_empty());
        }
        let lightning = load_descriptor(ServiceKey::Lightning.entry()).expect("lightning");
        assert!(lightning.methods.iter().any(|m| m == "GetInfo"));
    }

    #[test]
    fn upstream_methods_are_bundled() {
        let expected = [
            (ServiceKey::WalletUnlocker, "InitWallet"),
            (ServiceKey::Lightning, "SendPaymentSync"),
            (ServiceKey::ChainNotifier, "RegisterSpendNtfn"),
            (ServiceKey::Router, "SendPaymentV2"),
            (ServiceKey::WalletKit, "FundPsbt"),
            (ServiceKey::Signer, "MuSig2Sign"),
            (ServiceKey::Invoices, "AddHoldInvoice"),
        ];
        for (key, method) in expected {
            let desc = load_descriptor(key.entry()).expect("descriptor");
            assert!(
                desc.methods.iter().any(|m| m == method),
                "{} lacks {method}",
                desc.type_name
            );
        }
    }

    #[test]
    fn corrupt_descriptor_set_is_a_proto_load_error() {
        let cache = OnceLock::new();
        let err = load_descriptor_from(&cache, &[0xff, 0xff, 0xff], ServiceKey::Signer.entry())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ProtoLoad {
                service: ServiceKey::Signer,
                ..
            }
        ));
    }

    #[test]
    fn missing_file_is_a_proto_load_error() {
        let empty = FileDescriptorSet::default().encode_to_vec();
        let err = load_descriptor_from(&OnceLock::new(), &empty, ServiceKey::Versioner.entry())
            .unwrap_err();
        assert!(err.to_string().contains("verrpc.proto"));
    }

    #[test]
    fn descriptor_set_is_decoded_once_per_cache() {
        let cache = OnceLock::new();
        for entry in REGISTRY {
            load_descriptor_from(&cache, proto::FILE_DESCRIPTOR_SET, entry).expect("descriptor");
        }
        // Later lookups reuse the cached set and never look at the bytes again.
        let desc = load_descriptor_from(&cache, &[0xff, 0xff], ServiceKey::Lightning.entry())
            .expect("cached descriptor");
        assert!(desc.methods.iter().any(|m| m == "GetInfo"));
    }
}
