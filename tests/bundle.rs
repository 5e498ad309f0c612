use std::{collections::HashSet, fs, path::Path, sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use lnd_grpc::{
    config::{DEFAULT_HOST, DEFAULT_PORT},
    credentials::macaroon_path,
    ChannelTuning, ConnectionOptions, Error, ServiceKey, REGISTRY,
};

// Structurally valid PEM; the bytes are never parsed as X.509 until a handshake happens.
const CERT_PEM: &str = "-----BEGIN CERTIFICATE-----\nMAMCAQA=\n-----END CERTIFICATE-----\n";
const MACAROON: &[u8] = &[0x02, 0x01, 0x03, 0x6c, 0x6e, 0x64, 0xff];

fn direct_options() -> ConnectionOptions {
    ConnectionOptions::default().with_credentials(STANDARD.encode(MACAROON), STANDARD.encode(CERT_PEM))
}

fn write_node_dir(root: &Path, network: &str) {
    let macaroon = macaroon_path(root, network);
    fs::create_dir_all(macaroon.parent().expect("parent")).expect("mkdir");
    fs::write(&macaroon, MACAROON).expect("macaroon");
    fs::write(root.join("tls.cert"), CERT_PEM).expect("cert");
}

#[tokio::test]
async fn bundle_exposes_exactly_the_registered_services() {
    let bundle = lnd_grpc::build(&direct_options()).expect("build");
    let got: Vec<ServiceKey> = bundle.services().collect();
    let want: Vec<ServiceKey> = REGISTRY.iter().map(|e| e.key).collect();
    assert_eq!(got, want);
    assert_eq!(got.iter().collect::<HashSet<_>>().len(), REGISTRY.len());
}

#[tokio::test]
async fn node_dir_macaroon_becomes_hex_header() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_node_dir(dir.path(), "regtest");
    let opts = ConnectionOptions::default()
        .with_node_dir(dir.path())
        .with_network("regtest");

    let bundle = lnd_grpc::build(&opts).expect("build");
    assert_eq!(bundle.credential().macaroon().hex(), hex::encode(MACAROON));
    assert_eq!(bundle.credential().macaroon().hex(), "0201036c6e64ff");
    assert_eq!(bundle.credential().tls().pinned_certificates(), 1);
}

#[tokio::test]
async fn socket_binds_every_stub() {
    let bundle = lnd_grpc::build(&direct_options().with_socket("example.com:9999")).expect("build");
    for binding in bundle.bindings() {
        assert_eq!(binding.address().host, "example.com");
        assert_eq!(binding.address().port, "9999");
    }
}

#[tokio::test]
async fn omitted_socket_uses_defaults() {
    let bundle = lnd_grpc::build(&direct_options()).expect("build");
    assert_eq!(bundle.address().host, DEFAULT_HOST);
    assert_eq!(bundle.address().port, DEFAULT_PORT);
}

// Deliberate leniency: a socket without a port is accepted and the default port is used.
#[tokio::test]
async fn socket_without_port_is_lenient() {
    let bundle = lnd_grpc::build(&direct_options().with_socket("onlyhost")).expect("build");
    assert_eq!(bundle.address().host, "onlyhost");
    assert_eq!(bundle.address().port, DEFAULT_PORT);
}

#[test]
fn missing_macaroon_fails_before_anything_else() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Only the certificate exists.
    fs::write(dir.path().join("tls.cert"), CERT_PEM).expect("cert");
    let opts = ConnectionOptions::default()
        .with_node_dir(dir.path())
        .with_network("testnet");

    // No runtime here: reaching channel or stub construction would report a transport error.
    match lnd_grpc::build(&opts) {
        Err(Error::FileAccess { path, source }) => {
            assert_eq!(path, macaroon_path(dir.path(), "testnet"));
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected FileAccess, got {other:?}"),
    }
}

#[test]
fn missing_certificate_is_a_file_access_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_node_dir(dir.path(), "mainnet");
    fs::remove_file(dir.path().join("tls.cert")).expect("rm");
    let opts = ConnectionOptions::default().with_node_dir(dir.path());
    match lnd_grpc::build(&opts) {
        Err(Error::FileAccess { path, .. }) => assert!(path.ends_with("tls.cert")),
        other => panic!("expected FileAccess, got {other:?}"),
    }
}

#[test]
fn malformed_base64_is_a_credential_format_error() {
    let opts = ConnectionOptions::default().with_credentials("@@not base64@@", STANDARD.encode(CERT_PEM));
    assert!(matches!(
        lnd_grpc::build(&opts),
        Err(Error::CredentialFormat {
            credential: "macaroon",
            ..
        })
    ));
}

#[tokio::test]
async fn services_sharing_a_package_share_the_credential() {
    let bundle = lnd_grpc::build(&direct_options()).expect("build");
    let lnrpc: Vec<_> = bundle
        .bindings()
        .iter()
        .filter(|b| b.entry.package() == "lnrpc")
        .collect();
    assert!(lnrpc.len() >= 2);
    for binding in bundle.bindings() {
        assert!(Arc::ptr_eq(binding.credential(), bundle.credential()));
    }
    let lightning = bundle.binding(ServiceKey::Lightning).expect("lightning");
    let state = bundle.binding(ServiceKey::State).expect("state");
    assert_ne!(lightning.descriptor, state.descriptor);
    assert!(Arc::ptr_eq(lightning.credential(), state.credential()));
}

#[tokio::test]
async fn rebuilding_keeps_process_tls_state() {
    let first = lnd_grpc::tls::init_process_tls();
    let a = lnd_grpc::build(&direct_options()).expect("first build");
    let b = lnd_grpc::build(&direct_options()).expect("second build");
    assert!(Arc::ptr_eq(&first, &lnd_grpc::tls::init_process_tls()));
    // Separate bundles never share a credential.
    assert!(!Arc::ptr_eq(a.credential(), b.credential()));
}

#[tokio::test]
async fn tuning_is_carried_into_the_bundle() {
    let tuning = ChannelTuning {
        max_receive_message_size: Some(8 * 1024 * 1024),
        keepalive_interval: Duration::from_secs(60),
        ..ChannelTuning::default()
    };
    let bundle = lnd_grpc::build(&direct_options().with_tuning(tuning.clone())).expect("build");
    assert_eq!(bundle.tuning(), &tuning);
}

#[test]
fn options_deserialize_from_toml() {
    let opts: ConnectionOptions = toml::from_str(
        r#"
        node_dir = "/var/lib/lnd"
        network = "signet"
        socket = "10.0.0.2:10019"

        [tuning]
        keepalive_while_idle = false
        "#,
    )
    .expect("toml");
    assert_eq!(opts.network(), "signet");
    assert_eq!(opts.socket_address().port, "10019");
    assert!(!opts.tuning.keepalive_while_idle);
    assert_eq!(opts.tuning.keepalive_timeout, ChannelTuning::default().keepalive_timeout);
}
