//! electrum-cli: issue a few Electrum protocol calls against a server.
//!
//! # Usage
//!
//! ```bash
//! electrum-cli --server electrum.example.org:50001 version
//! electrum-cli --server 127.0.0.1:50001 balance --address bc1q...
//! RUST_LOG=electrum_core=debug electrum-cli --server 127.0.0.1:50001 watch-headers
//! ```
//!
//! Session knobs (`ELECTRUM_REQUEST_TIMEOUT_MS` and friends) are read from
//! the environment.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use electrum_client::{address_to_scripthash, Client, RpcError, SessionConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "electrum-cli")]
#[command(about = "Query an Electrum protocol server")]
struct Args {
    /// Server address as host:port (plain TCP)
    #[arg(long, short)]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Negotiate the protocol version and print the server software
    Version,
    /// Print the server banner
    Banner,
    /// Print the server's feature list
    Features,
    /// Estimate the fee rate for confirmation within N blocks
    Fee {
        #[arg(long, default_value_t = 6)]
        target: u32,
    },
    /// Print the block header at a height
    Header {
        #[arg(long)]
        height: u32,
    },
    /// Print the balance of an address
    Balance {
        #[arg(long)]
        address: String,
    },
    /// Follow the chain tip until interrupted
    WatchHeaders,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "electrum_core=info,electrum_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(kind = %e.kind(), "{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), RpcError> {
    let client = Client::connect_tcp(args.server.as_str(), SessionConfig::from_env()).await?;
    tracing::info!(server = %args.server, "connected");

    // Servers expect the version handshake before anything else.
    let (server_version, protocol) = client.server_version().await?;

    match args.command {
        Command::Version => println!("{server_version} (protocol {protocol})"),
        Command::Banner => println!("{}", client.server_banner().await?),
        Command::Features => {
            let features = client.server_features().await?;
            println!("server:   {}", features.server_version);
            println!("genesis:  {}", features.genesis_hash);
            println!(
                "protocol: {} - {}",
                features.protocol_min, features.protocol_max
            );
            for (host, ports) in &features.hosts {
                println!("host:     {host} tcp={:?} ssl={:?}", ports.tcp_port, ports.ssl_port);
            }
        }
        Command::Fee { target } => {
            let fee = client.estimate_fee(target).await?;
            println!("{fee} per kB within {target} blocks");
        }
        Command::Header { height } => {
            println!("{}", client.block_header(height, None).await?.header);
        }
        Command::Balance { address } => {
            let scripthash = address_to_scripthash(&address)?;
            let balance = client.balance(&scripthash).await?;
            println!(
                "confirmed: {} unconfirmed: {}",
                balance.confirmed, balance.unconfirmed
            );
        }
        Command::WatchHeaders => {
            let mut tips = client.subscribe_headers().await?;
            while let Some(tip) = tips.recv().await {
                println!("{} {}", tip.height, tip.hex);
            }
            tracing::info!("header stream ended");
        }
    }

    client.shutdown();
    Ok(())
}
