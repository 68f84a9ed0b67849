//! Network wrappers for outbound connections

pub use self::udp::UdpSocket;

mod udp;
