use base64::{engine::general_purpose::STANDARD, Engine as _};
use lnd_grpc::{proto::lnrpc, ConnectionOptions};
use tokio::fs;

/// Builds a client bundle and prints `GetInfo` plus the wallet balance.
///
/// Usage:
///   cargo run --example getinfo -- --lnddir ~/.lnd --network testnet [--socket host:port]
///   cargo run --example getinfo -- --macaroon admin.macaroon --tls-cert tls.cert
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let args: Vec<String> = std::env::args().collect();
    let mut opts = ConnectionOptions::default();
    if let Some(dir) = flag_value(&args, "--lnddir") {
        opts = opts.with_node_dir(dir);
    }
    if let Some(network) = flag_value(&args, "--network") {
        opts = opts.with_network(network);
    }
    if let (Some(macaroon), Some(cert)) = (
        flag_value(&args, "--macaroon"),
        flag_value(&args, "--tls-cert"),
    ) {
        opts = opts.with_credentials(
            STANDARD.encode(fs::read(macaroon).await?),
            STANDARD.encode(fs::read(cert).await?),
        );
    }
    if let Some(socket) = flag_value(&args, "--socket") {
        opts = opts.with_socket(socket);
    }

    let mut lnd = lnd_grpc::build(&opts)?;
    println!("services: {:?}", lnd.services().collect::<Vec<_>>());

    let info = lnd.get_info().await?;
    println!("{}", serde_json::to_string_pretty(&info)?);

    let balance = lnd
        .lightning
        .wallet_balance(lnrpc::WalletBalanceRequest::default())
        .await?
        .into_inner();
    println!(
        "confirmed {} sat, unconfirmed {} sat",
        balance.confirmed_balance, balance.unconfirmed_balance
    );
    Ok(())
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.windows(2)
        .find(|pair| pair[0] == flag)
        .map(|pair| pair[1].clone())
}
