//! TCP listener setup.

use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};

use chroma_core::config::NetworkConfig;

/// Bind the service socket with SO_REUSEADDR and the configured backlog.
pub fn bind(network: &NetworkConfig) -> Result<tokio::net::TcpListener> {
    let ip: IpAddr = network
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {:?}", network.bind_addr))?;
    let addr = SocketAddr::new(ip, network.port);

    let socket =
        Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP)).context("socket()")?;
    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("bind({addr})"))?;
    socket.listen(network.backlog).context("listen()")?;

    let std_listener: std::net::TcpListener = socket.into();
    tokio::net::TcpListener::from_std(std_listener).context("register listener with runtime")
}
