//! Relay for UDP implementation
//!
//! ## UDP relay protocol
//!
//! SOCKS5 UDP Request and Response, received from and sent back to the local client
//! ```plain
//! +----+------+------+----------+----------+----------+
//! |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
//! +----+------+------+----------+----------+----------+
//! | 2  |  1   |  1   | Variable |    2     | Variable |
//! +----+------+------+----------+----------+----------+
//! ```
//!
//! Relayed UDP packet, exchanged with the remote server (after encryption, *ciphertext*)
//! ```plain
//! +-------+--------------+
//! |  IV   |   PAYLOAD    |
//! +-------+--------------+
//! | Fixed |   Variable   |
//! +-------+--------------+
//! ```
//!
//! The ciphertext payload decrypts to everything after the 3-byte RSV + FRAG
//! prefix, address block included. The relay never reassembles fragments, and
//! never interprets the address block on the data path.

pub use self::session::{UdpRelay, UdpSession};

pub mod crypto_io;
pub mod proxy_socket;
pub mod session;

/// The maximum UDP payload size (defined in the original shadowsocks Python)
///
/// *I cannot find any references about why clowwindy used this value as the maximum
/// Socks5 UDP ASSOCIATE packet size. The only thing I can find is
/// [here](http://support.microsoft.com/kb/822061/)*
pub const MAXIMUM_UDP_PAYLOAD_SIZE: usize = 65536;

/// RSV (2 bytes) + FRAG (1 byte) prefix of every UDP ASSOCIATE packet
pub const UDP_ASSOCIATE_HEADER_LEN: usize = 3;

/// Default bound on simultaneously cached sessions, and with them open
/// outbound sockets
pub const DEFAULT_SESSION_CAPACITY: usize = 512;
