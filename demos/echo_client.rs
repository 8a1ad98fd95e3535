//! Echo client example.
//!
//! Connects to the echo host and sends `echo/ping` once a second, printing
//! each reply. Keeps running across host restarts; the client redials on
//! its own.
//!
//! Run with: cargo run --example echo_client
//!
//! Start `echo_host` first (or later; requests fail with "not connected"
//! until it is up).

use std::time::Duration;

use localrpc::{ConnectionState, LinkConfig, Packet, SocketAddress, SocketClientBuilder};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let address = std::env::var("LOCALRPC_SOCKET").unwrap_or_else(|_| "@/tmp/localrpc.sock".to_string());

    let client = SocketClientBuilder::new()
        .address(SocketAddress::parse(&address)?)
        .config(LinkConfig::new("echo-client"))
        .build()?;

    tokio::time::timeout(
        Duration::from_secs(10),
        client.wait_for_state(ConnectionState::Connected),
    )
    .await
    .map_err(|_| anyhow::anyhow!("no host at {address}"))?;

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }

        match client.send(Packet::request("echo", "ping", "hi"), 1000).await {
            Ok(reply) => println!(
                "reply #{}: {}",
                reply.header.message_id,
                String::from_utf8_lossy(&reply.data)
            ),
            Err(err) => println!("request failed: {err}"),
        }
    }

    client.close();
    Ok(())
}
