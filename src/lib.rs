#![deny(unsafe_code)]

//! Authenticated gRPC client bundle for LND.
//!
//! [`client::build`] reads the node's TLS certificate and admin macaroon (from an lnd data
//! directory or from base64 strings), pins the certificate, attaches the macaroon to every
//! call and returns a [`ClientBundle`] with one typed tonic stub per bundled service:
//! `lightning`, `walletUnlocker`, `state`, `router`, `invoices`, `walletKit`, `signer`,
//! `chainNotifier` and `versioner`.
//!
//! TLS, HTTP/2 and protobuf encoding come from `rustls`, `hyper` and `tonic`/`prost`. The
//! stubs are generated at build time from the files under `proto/`. Generated messages also
//! implement serde with the proto3 JSON mapping described in [`json`].
//!
//! Example
//! ```no_run
//! use lnd_grpc::{config::ConnectionOptions, proto::lnrpc};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let opts = ConnectionOptions::default()
//!     .with_node_dir("/home/satoshi/.lnd")
//!     .with_network("mainnet")
//!     .with_socket("127.0.0.1:10009");
//! let mut lnd = lnd_grpc::build(&opts)?;
//! let info = lnd.get_info().await?;
//! println!("{} at height {}", info.alias, info.block_height);
//! let balance = lnd
//!     .lightning
//!     .wallet_balance(lnrpc::WalletBalanceRequest::default())
//!     .await?
//!     .into_inner();
//! println!("confirmed: {} sat", balance.confirmed_balance);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod credentials;
pub mod json;
pub mod proto;
pub mod registry;
pub mod tls;
pub mod transport;

pub use client::{build, ClientBundle, Error, Result};
pub use config::{ChannelTuning, ConnectionOptions, SocketAddress};
pub use registry::{ServiceKey, REGISTRY};
