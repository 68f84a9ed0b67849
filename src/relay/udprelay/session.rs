//! UDP relay sessions keyed by client endpoint
//!
//! Working like a NAT proxy: every distinct client endpoint gets its own
//! outbound socket connected to the remote server, cached with LRU order so
//! the total number of open outbound sockets stays bounded.

use std::{
    io::{self, Cursor},
    net::SocketAddr,
    sync::Arc,
};

use byte_string::ByteStr;
use bytes::{BufMut, BytesMut};
use futures::future::{self, AbortHandle};
use log::{debug, error, trace, warn};
use lru_time_cache::{Entry, LruCache};
use tokio::{net::UdpSocket, sync::Mutex};

use crate::{config::ServerConfig, context::SharedContext, relay::socks5::UdpAssociateHeader};

use super::{
    DEFAULT_SESSION_CAPACITY, MAXIMUM_UDP_PAYLOAD_SIZE, UDP_ASSOCIATE_HEADER_LEN, proxy_socket::ProxySocket,
};

type SessionMap = LruCache<SocketAddr, UdpSession>;

/// UDP relay, dispatching datagrams received by the listener onto per-client sessions
pub struct UdpRelay {
    context: SharedContext,
    svr_cfg: ServerConfig,
    session_map: Mutex<SessionMap>,
}

impl UdpRelay {
    /// Create a relay forwarding to the currently selected server
    ///
    /// `capacity` bounds the number of simultaneously cached sessions, and
    /// with them the number of open outbound sockets. Exceeding it evicts
    /// and closes the least recently used session.
    pub fn new(context: SharedContext, svr_cfg: ServerConfig, capacity: Option<usize>) -> UdpRelay {
        let capacity = capacity.unwrap_or(DEFAULT_SESSION_CAPACITY);

        UdpRelay {
            context,
            svr_cfg,
            session_map: Mutex::new(LruCache::with_capacity(capacity)),
        }
    }

    /// Handle one datagram the listener received on the shared local socket
    ///
    /// `data` is the raw UDP ASSOCIATE packet, `peer_addr` the client that
    /// sent it, `inbound` the socket replies are written back to. Returns
    /// `Ok(false)` for datagrams too short to carry the 3-byte RSV + FRAG
    /// prefix and a payload, without touching the session cache.
    pub async fn handle_packet(&self, inbound: &Arc<UdpSocket>, peer_addr: SocketAddr, data: &[u8]) -> io::Result<bool> {
        if data.len() < UDP_ASSOCIATE_HEADER_LEN + 1 {
            debug!(
                "udp relay {} received short packet {:?}",
                peer_addr,
                ByteStr::new(data)
            );
            return Ok(false);
        }

        let session = {
            let mut session_map = self.session_map.lock().await;
            session_map.get(&peer_addr).map(|session| session.context.clone())
        };

        let session = match session {
            Some(session) => session,
            None => self.create_session(inbound, peer_addr).await?,
        };

        session.send_to_remote(data).await?;
        Ok(true)
    }

    async fn create_session(&self, inbound: &Arc<UdpSocket>, peer_addr: SocketAddr) -> io::Result<Arc<UdpSessionContext>> {
        // Resolving the server address and connecting the outbound socket may
        // suspend, so both happen before taking the map lock. A failure here
        // leaves the cache untouched.
        let session = UdpSession::new(self.context.clone(), &self.svr_cfg, inbound.clone(), peer_addr).await?;

        let mut session_map = self.session_map.lock().await;
        match session_map.entry(peer_addr) {
            Entry::Occupied(occ) => {
                // Another dispatch for the same peer raced us through
                // construction. Keep the cached session, ours is dropped and
                // its receive loop aborted.
                Ok(occ.into_mut().context.clone())
            }
            Entry::Vacant(vac) => {
                debug!("created udp session for {}", peer_addr);

                // Inserting into a full cache drops the least recently used
                // session first, closing it while the lock is still held.
                Ok(vac.insert(session).context.clone())
            }
        }
    }

    /// Number of currently cached sessions
    pub async fn session_count(&self) -> usize {
        self.session_map.lock().await.len()
    }
}

/// One relay session, bound to a single client endpoint
///
/// The session owns the outbound socket and the receive loop forwarding
/// replies back to its client. Dropping it, on LRU eviction or relay
/// shutdown, closes both exactly once.
pub struct UdpSession {
    context: Arc<UdpSessionContext>,
    recv_abortable: AbortHandle,
}

impl Drop for UdpSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl UdpSession {
    async fn new(
        context: SharedContext,
        svr_cfg: &ServerConfig,
        inbound: Arc<UdpSocket>,
        peer_addr: SocketAddr,
    ) -> io::Result<UdpSession> {
        let outbound = ProxySocket::connect(&context, svr_cfg).await?;

        let session_context = Arc::new(UdpSessionContext {
            peer_addr,
            inbound,
            outbound,
        });

        // CLIENT <- REMOTE
        let (recv_task, recv_abortable) = {
            let session_context = session_context.clone();
            future::abortable(session_context.copy_remote_to_local())
        };
        tokio::spawn(async move {
            let _ = recv_task.await;
            trace!("udp session {} <- .. receive task is closing", peer_addr);
        });

        Ok(UdpSession {
            context: session_context,
            recv_abortable,
        })
    }

    /// Stop relaying for this session
    ///
    /// Closing is idempotent. A receive pending on the outbound socket
    /// resolves by cancellation instead of reporting an error.
    pub fn close(&self) {
        self.recv_abortable.abort();
    }
}

struct UdpSessionContext {
    peer_addr: SocketAddr,
    inbound: Arc<UdpSocket>,
    outbound: ProxySocket,
}

impl Drop for UdpSessionContext {
    fn drop(&mut self) {
        debug!("udp session for {} is closed", self.peer_addr);
    }
}

impl UdpSessionContext {
    /// CLIENT -> REMOTE
    async fn send_to_remote(&self, data: &[u8]) -> io::Result<()> {
        let payload = &data[UDP_ASSOCIATE_HEADER_LEN..];

        match UdpAssociateHeader::read_cursor(&mut Cursor::new(data)) {
            Ok(header) => trace!(
                "udp relay {} -> {} with {} bytes",
                self.peer_addr,
                header.address,
                payload.len()
            ),
            // The address block is relayed opaque, failing to decode it only
            // affects this log line
            Err(..) => trace!("udp relay {} -> .. with {} bytes", self.peer_addr, payload.len()),
        }

        self.outbound.send(payload).await?;
        Ok(())
    }

    /// CLIENT <- REMOTE
    async fn copy_remote_to_local(self: Arc<Self>) {
        let mut buffer = [0u8; MAXIMUM_UDP_PAYLOAD_SIZE];
        let mut reply_buffer = BytesMut::new();

        loop {
            let n = match self.outbound.recv(&mut buffer).await {
                Ok(n) => n,
                Err(err) => {
                    // One transport or protocol failure ends inbound relaying
                    // for this session, there are no retries. The dead session
                    // stays cached until LRU pressure removes it.
                    error!("udp session {} <- .. failed, error: {}", self.peer_addr, err);
                    break;
                }
            };

            let payload = &buffer[..n];

            reply_buffer.clear();
            reply_buffer.reserve(UDP_ASSOCIATE_HEADER_LEN + n);
            // RSV x2 + FRAG, fragmentation is not supported
            reply_buffer.put_slice(&[0x00, 0x00, 0x00]);
            reply_buffer.put_slice(payload);

            if let Err(err) = self.inbound.send_to(&reply_buffer, self.peer_addr).await {
                warn!(
                    "udp failed to send back {} bytes to client {}, error: {}",
                    reply_buffer.len(),
                    self.peer_addr,
                    err
                );
            }

            trace!("udp relay {} <- .. with {} bytes", self.peer_addr, payload.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io::ErrorKind, time::Duration};

    use async_trait::async_trait;
    use tokio::time;

    use crate::{
        context::Context,
        crypto::CipherKind,
        dns_resolver::{DnsResolve, DnsResolver},
    };

    use super::*;

    const PACKET: &[u8] = &[0x00, 0x00, 0x00, 0xff];

    async fn relay_fixture(capacity: usize) -> (UdpRelay, Arc<UdpSocket>, UdpSocket) {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let svr_cfg = ServerConfig::new(server.local_addr().unwrap(), "pas$$", CipherKind::NONE);

        let relay = UdpRelay::new(Context::new_shared(), svr_cfg, Some(capacity));
        let inbound = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());

        (relay, inbound, server)
    }

    #[tokio::test]
    async fn short_datagram_not_handled() {
        let (relay, inbound, _server) = relay_fixture(4).await;
        let peer_addr = "127.0.0.1:40001".parse().unwrap();

        let handled = relay
            .handle_packet(&inbound, peer_addr, &[0x00, 0x00, 0x00])
            .await
            .unwrap();
        assert!(!handled);
        assert_eq!(relay.session_count().await, 0);
    }

    #[tokio::test]
    async fn session_reused_for_same_peer() {
        let (relay, inbound, _server) = relay_fixture(4).await;
        let peer_addr = "127.0.0.1:40002".parse().unwrap();

        assert!(relay.handle_packet(&inbound, peer_addr, PACKET).await.unwrap());
        let first = {
            let mut session_map = relay.session_map.lock().await;
            session_map.get(&peer_addr).unwrap().context.clone()
        };

        assert!(relay.handle_packet(&inbound, peer_addr, PACKET).await.unwrap());
        let second = {
            let mut session_map = relay.session_map.lock().await;
            session_map.get(&peer_addr).unwrap().context.clone()
        };

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(relay.session_count().await, 1);
    }

    #[tokio::test]
    async fn lru_eviction_closes_oldest_session() {
        let (relay, inbound, _server) = relay_fixture(2).await;
        let peer_a = "127.0.0.1:40011".parse().unwrap();
        let peer_b = "127.0.0.1:40012".parse().unwrap();
        let peer_c = "127.0.0.1:40013".parse().unwrap();

        assert!(relay.handle_packet(&inbound, peer_a, PACKET).await.unwrap());
        let evicted = {
            let mut session_map = relay.session_map.lock().await;
            Arc::downgrade(&session_map.get(&peer_a).unwrap().context)
        };

        assert!(relay.handle_packet(&inbound, peer_b, PACKET).await.unwrap());
        assert!(relay.handle_packet(&inbound, peer_c, PACKET).await.unwrap());

        {
            let mut session_map = relay.session_map.lock().await;
            assert!(session_map.get(&peer_a).is_none());
            assert!(session_map.get(&peer_b).is_some());
            assert!(session_map.get(&peer_c).is_some());
        }
        assert_eq!(relay.session_count().await, 2);

        // The aborted receive task releases its half of the session context
        // once the runtime collects it, closing the outbound socket
        time::sleep(Duration::from_millis(50)).await;
        assert!(evicted.upgrade().is_none());
    }

    #[tokio::test]
    async fn concurrent_dispatch_stays_bounded() {
        let (relay, inbound, _server) = relay_fixture(4).await;

        let mut dispatches = Vec::new();
        for port in 40100..40108 {
            let peer_addr = format!("127.0.0.1:{}", port).parse().unwrap();
            dispatches.push(relay.handle_packet(&inbound, peer_addr, PACKET));
        }
        for handled in future::join_all(dispatches).await {
            assert!(handled.unwrap());
        }

        assert_eq!(relay.session_count().await, 4);
    }

    #[tokio::test]
    async fn resolution_failure_leaves_no_session() {
        struct UnreachableDns;

        #[async_trait]
        impl DnsResolve for UnreachableDns {
            async fn resolve(&self, _addr: &str, _port: u16) -> io::Result<Vec<SocketAddr>> {
                Err(io::Error::new(ErrorKind::Other, "no resolver available"))
            }
        }

        let mut context = Context::new();
        context.set_dns_resolver(Arc::new(DnsResolver::custom_resolver(UnreachableDns)));

        let svr_cfg = ServerConfig::new(("server.invalid", 8388), "pas$$", CipherKind::NONE);
        let relay = UdpRelay::new(Arc::new(context), svr_cfg, None);
        let inbound = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());

        let peer_addr = "127.0.0.1:40021".parse().unwrap();
        assert!(relay.handle_packet(&inbound, peer_addr, PACKET).await.is_err());
        assert_eq!(relay.session_count().await, 0);
    }
}
