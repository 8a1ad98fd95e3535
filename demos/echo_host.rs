//! Echo host example.
//!
//! Listens on a local socket and answers `echo/ping` with `pong`; any other
//! `echo/*` action returns its payload unchanged.
//!
//! Run with: cargo run --example echo_host
//!
//! The socket address comes from `LOCALRPC_SOCKET` (default
//! `@/tmp/localrpc.sock`, an abstract name on Linux).

use bytes::Bytes;
use localrpc::{LinkConfig, LinkError, SocketAddress, SocketHost};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let address = std::env::var("LOCALRPC_SOCKET").unwrap_or_else(|_| "@/tmp/localrpc.sock".to_string());
    let address = SocketAddress::parse(&address)?;

    let (host, queues) = SocketHost::bind(address.clone(), LinkConfig::new("echo-host")).await?;
    println!("listening on {address}");

    let serving = host.serve(queues, |target: String, action: String, payload: Bytes| async move {
        // ---
        match (target.as_str(), action.as_str()) {
            ("echo", "ping") => Ok(Bytes::from_static(b"pong")),
            ("echo", _) => Ok(payload),
            _ => Err(LinkError::Dispatch(format!("unknown target {target}"))),
        }
    });

    tokio::signal::ctrl_c().await?;
    println!("Received Ctrl+C, shutting down...");
    host.shutdown();
    serving.await?;

    Ok(())
}
