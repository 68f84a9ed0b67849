//! Relay service context

use std::{io, net::SocketAddr, sync::Arc};

use crate::dns_resolver::DnsResolver;

/// Service context
pub struct Context {
    // DNS resolver, customizable. The default runs getaddrinfo on tokio's
    // blocking pool.
    dns_resolver: Arc<DnsResolver>,
}

/// `Context` for sharing between services
pub type SharedContext = Arc<Context>;

impl Context {
    /// Create a new `Context`
    pub fn new() -> Context {
        Context {
            dns_resolver: Arc::new(DnsResolver::system_resolver()),
        }
    }

    /// Create a new `Context` shared
    pub fn new_shared() -> SharedContext {
        SharedContext::new(Context::new())
    }

    /// Set a DNS resolver
    ///
    /// The resolver should be wrapped in an `Arc`, because it could be shared with the other services
    pub fn set_dns_resolver(&mut self, resolver: Arc<DnsResolver>) {
        self.dns_resolver = resolver;
    }

    /// Get the DNS resolver
    pub fn dns_resolver(&self) -> &Arc<DnsResolver> {
        &self.dns_resolver
    }

    /// Resolves DNS address to `SocketAddr`s
    #[allow(clippy::needless_lifetimes)]
    pub async fn dns_resolve<'a>(&self, addr: &'a str, port: u16) -> io::Result<impl Iterator<Item = SocketAddr> + 'a> {
        self.dns_resolver.resolve(addr, port).await
    }
}

impl Default for Context {
    fn default() -> Context {
        Context::new()
    }
}
