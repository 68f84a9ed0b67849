//! UDP socket for communicating with the remote proxy server

use std::{
    io::{self, ErrorKind},
    net::SocketAddr,
};

use bytes::BytesMut;
use log::{trace, warn};

use crate::{config::ServerConfig, context::Context, crypto::CipherKind, net::UdpSocket};

use super::crypto_io::{self, ProtocolError};

/// `ProxySocket` error type
#[derive(thiserror::Error, Debug)]
pub enum ProxySocketError {
    /// std::io::Error
    #[error(transparent)]
    IoError(#[from] io::Error),
    #[error(transparent)]
    ProtocolError(#[from] ProtocolError),
}

impl From<ProxySocketError> for io::Error {
    fn from(e: ProxySocketError) -> io::Error {
        match e {
            ProxySocketError::IoError(e) => e,
            e => io::Error::new(ErrorKind::Other, e),
        }
    }
}

/// `ProxySocket` result type
pub type ProxySocketResult<T> = Result<T, ProxySocketError>;

/// UDP client for communicating with the remote proxy server
///
/// Every packet sent through it is encrypted, and every received packet
/// decrypted, with a cipher instance constructed fresh for that one packet.
pub struct ProxySocket {
    io: UdpSocket,
    method: CipherKind,
    key: Box<[u8]>,
}

impl ProxySocket {
    /// Create a socket connected to the configured remote server (outbound)
    ///
    /// Literal server addresses are connected directly; domain names are
    /// resolved through the context's resolver first.
    pub async fn connect(context: &Context, svr_cfg: &ServerConfig) -> ProxySocketResult<ProxySocket> {
        let socket = UdpSocket::connect_server(context, svr_cfg.addr()).await?;

        trace!(
            "connected udp remote server {} (outbound: {})",
            svr_cfg.addr(),
            socket.local_addr()?
        );

        Ok(ProxySocket::from_socket(svr_cfg, socket))
    }

    /// Create a `ProxySocket` from a connected socket
    pub fn from_socket(svr_cfg: &ServerConfig, socket: UdpSocket) -> ProxySocket {
        ProxySocket {
            io: socket,
            method: svr_cfg.method(),
            key: svr_cfg.key().to_vec().into_boxed_slice(),
        }
    }

    /// Send a UDP packet to the remote server, encrypting `payload`
    pub async fn send(&self, payload: &[u8]) -> ProxySocketResult<usize> {
        let mut send_buf = BytesMut::with_capacity(payload.len() + 256);
        crypto_io::encrypt_payload(self.method, &self.key, payload, &mut send_buf);

        trace!(
            "UDP proxy client send payload length {} bytes, packet length {} bytes",
            payload.len(),
            send_buf.len()
        );

        let send_len = self.io.send(&send_buf).await?;

        if send_buf.len() != send_len {
            warn!(
                "UDP proxy client send {} bytes, but actually sent {} bytes",
                send_buf.len(),
                send_len
            );
        }

        Ok(send_len)
    }

    /// Receive a UDP packet from the remote server, decrypting it in place
    ///
    /// `recv_buf` has to be big enough for a whole encrypted packet. It is
    /// recommended to allocate a buffer of at least 65536 bytes.
    pub async fn recv(&self, recv_buf: &mut [u8]) -> ProxySocketResult<usize> {
        let recv_n = self.io.recv(recv_buf).await?;
        let n = crypto_io::decrypt_payload(self.method, &self.key, &mut recv_buf[..recv_n])?;

        trace!(
            "UDP proxy client receive packet length {} bytes, payload length {} bytes",
            recv_n,
            n
        );

        Ok(n)
    }

    /// Get local addr of the outbound socket
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.io.local_addr()
    }
}
