//! UDP socket wrappers

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    ops::{Deref, DerefMut},
};

use crate::{config::ServerAddr, context::Context};

/// Wrapper for outbound `UdpSocket`
pub struct UdpSocket(tokio::net::UdpSocket);

impl UdpSocket {
    /// Connects to the remote proxy server
    ///
    /// The socket is bound to the unspecified address of the same address
    /// family as the remote, then connected, so `send` and `recv` only
    /// exchange datagrams with that one peer.
    pub async fn connect_server(context: &Context, addr: &ServerAddr) -> io::Result<UdpSocket> {
        let socket = match *addr {
            ServerAddr::SocketAddr(ref remote_addr) => connect_socket_addr(remote_addr).await?,
            ServerAddr::DomainName(ref dname, port) => {
                lookup_then!(context, dname, port, |remote_addr| {
                    connect_socket_addr(&remote_addr).await
                })?
                .1
            }
        };

        Ok(UdpSocket(socket))
    }
}

async fn connect_socket_addr(addr: &SocketAddr) -> io::Result<tokio::net::UdpSocket> {
    let bind_addr = match *addr {
        SocketAddr::V4(..) => SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0),
        SocketAddr::V6(..) => SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0),
    };

    let socket = tokio::net::UdpSocket::bind(bind_addr).await?;
    socket.connect(addr).await?;
    Ok(socket)
}

impl Deref for UdpSocket {
    type Target = tokio::net::UdpSocket;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for UdpSocket {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<tokio::net::UdpSocket> for UdpSocket {
    fn from(s: tokio::net::UdpSocket) -> UdpSocket {
        UdpSocket(s)
    }
}
