#![crate_type = "lib"]

pub use self::{
    config::{ServerAddr, ServerConfig},
    relay::udprelay::{UdpRelay, proxy_socket::ProxySocket},
};

pub use shadowsocks_crypto as crypto;

pub mod config;
pub mod context;
pub mod dns_resolver;
pub mod net;
pub mod relay;
