//! SOCKS5 UDP ASSOCIATE wire format (RFC1928)
//!
//! Only the pieces of [SOCKS Protocol Version 5](https://www.ietf.org/rfc/rfc1928.txt)
//! that appear inside UDP ASSOCIATE datagrams are implemented here: the
//! address encoding and the per-datagram request header.

use std::{
    fmt::{self, Debug, Formatter},
    io::{self, Cursor, ErrorKind},
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6},
};

use bytes::{Buf, BufMut};

#[rustfmt::skip]
mod consts {
    pub const SOCKS5_ADDR_TYPE_IPV4:        u8 = 0x01;
    pub const SOCKS5_ADDR_TYPE_DOMAIN_NAME: u8 = 0x03;
    pub const SOCKS5_ADDR_TYPE_IPV6:        u8 = 0x04;
}

/// SOCKS5 protocol error
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    IoError(#[from] io::Error),
    #[error("address type {0:#x} not supported")]
    AddressTypeNotSupported(u8),
    #[error("domain name in address is invalid encoding")]
    AddressDomainInvalidEncoding,
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        match err {
            Error::IoError(err) => err,
            e => io::Error::new(ErrorKind::Other, e),
        }
    }
}

/// SOCKS5 address type
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    /// Socket address (IP Address)
    SocketAddress(SocketAddr),
    /// Domain name address
    DomainNameAddress(String, u16),
}

impl Address {
    /// Read from a cursor over an in-memory packet
    pub fn read_cursor<T: AsRef<[u8]>>(cur: &mut Cursor<T>) -> Result<Address, Error> {
        if cur.remaining() < 2 {
            return Err(io::Error::new(ErrorKind::UnexpectedEof, "invalid buf").into());
        }

        let atyp = cur.get_u8();
        match atyp {
            consts::SOCKS5_ADDR_TYPE_IPV4 => {
                if cur.remaining() < 4 + 2 {
                    return Err(io::Error::new(ErrorKind::UnexpectedEof, "invalid buf").into());
                }
                let addr = Ipv4Addr::from(cur.get_u32());
                let port = cur.get_u16();
                Ok(Address::SocketAddress(SocketAddr::V4(SocketAddrV4::new(addr, port))))
            }
            consts::SOCKS5_ADDR_TYPE_IPV6 => {
                if cur.remaining() < 16 + 2 {
                    return Err(io::Error::new(ErrorKind::UnexpectedEof, "invalid buf").into());
                }
                let addr = Ipv6Addr::from(cur.get_u128());
                let port = cur.get_u16();
                Ok(Address::SocketAddress(SocketAddr::V6(SocketAddrV6::new(
                    addr, port, 0, 0,
                ))))
            }
            consts::SOCKS5_ADDR_TYPE_DOMAIN_NAME => {
                if cur.remaining() < 1 {
                    return Err(io::Error::new(ErrorKind::UnexpectedEof, "invalid buf").into());
                }
                let domain_len = cur.get_u8() as usize;
                if cur.remaining() < domain_len + 2 {
                    return Err(Error::AddressDomainInvalidEncoding);
                }
                let mut buf = vec![0u8; domain_len];
                cur.copy_to_slice(&mut buf);
                let port = cur.get_u16();
                let addr = String::from_utf8(buf).map_err(|_| Error::AddressDomainInvalidEncoding)?;
                Ok(Address::DomainNameAddress(addr, port))
            }
            _ => Err(Error::AddressTypeNotSupported(atyp)),
        }
    }

    /// Writes to buffer
    #[inline]
    pub fn write_to_buf<B: BufMut>(&self, buf: &mut B) {
        write_address(self, buf)
    }

    /// Get required buffer size for serializing
    #[inline]
    pub fn serialized_len(&self) -> usize {
        get_addr_len(self)
    }
}

impl Debug for Address {
    #[inline]
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            Address::SocketAddress(ref addr) => write!(f, "{}", addr),
            Address::DomainNameAddress(ref addr, ref port) => write!(f, "{}:{}", addr, port),
        }
    }
}

impl fmt::Display for Address {
    #[inline]
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            Address::SocketAddress(ref addr) => write!(f, "{}", addr),
            Address::DomainNameAddress(ref addr, ref port) => write!(f, "{}:{}", addr, port),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(s: SocketAddr) -> Address {
        Address::SocketAddress(s)
    }
}

fn write_ipv4_address<B: BufMut>(addr: &SocketAddrV4, buf: &mut B) {
    buf.put_u8(consts::SOCKS5_ADDR_TYPE_IPV4); // Address type
    buf.put_slice(&addr.ip().octets()); // Ipv4 bytes
    buf.put_u16(addr.port()); // Port
}

fn write_ipv6_address<B: BufMut>(addr: &SocketAddrV6, buf: &mut B) {
    buf.put_u8(consts::SOCKS5_ADDR_TYPE_IPV6); // Address type
    for seg in &addr.ip().segments() {
        buf.put_u16(*seg); // Ipv6 bytes
    }
    buf.put_u16(addr.port()); // Port
}

fn write_domain_name_address<B: BufMut>(dnaddr: &str, port: u16, buf: &mut B) {
    assert!(
        dnaddr.len() <= u8::MAX as usize,
        "domain name length must be smaller than 256"
    );
    buf.put_u8(consts::SOCKS5_ADDR_TYPE_DOMAIN_NAME);
    buf.put_u8(dnaddr.len() as u8);
    buf.put_slice(dnaddr[..].as_bytes());
    buf.put_u16(port);
}

fn write_address<B: BufMut>(addr: &Address, buf: &mut B) {
    match *addr {
        Address::SocketAddress(SocketAddr::V4(ref addr)) => write_ipv4_address(addr, buf),
        Address::SocketAddress(SocketAddr::V6(ref addr)) => write_ipv6_address(addr, buf),
        Address::DomainNameAddress(ref dnaddr, ref port) => write_domain_name_address(dnaddr, *port, buf),
    }
}

#[inline]
fn get_addr_len(atyp: &Address) -> usize {
    match *atyp {
        Address::SocketAddress(SocketAddr::V4(..)) => 1 + 4 + 2,
        Address::SocketAddress(SocketAddr::V6(..)) => 1 + 8 * 2 + 2,
        Address::DomainNameAddress(ref dmname, _) => 1 + 1 + dmname.len() + 2,
    }
}

/// UDP ASSOCIATE request header
///
/// ```plain
/// +----+------+------+----------+----------+----------+
/// |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
/// +----+------+------+----------+----------+----------+
/// | 2  |  1   |  1   | Variable |    2     | Variable |
/// +----+------+------+----------+----------+----------+
/// ```
#[derive(Clone, Debug)]
pub struct UdpAssociateHeader {
    /// Fragment
    ///
    /// The relay does not support fragment, so this frag must be 0x00
    pub frag: u8,
    /// Remote address
    pub address: Address,
}

impl UdpAssociateHeader {
    /// Creates a header
    pub fn new(frag: u8, address: Address) -> UdpAssociateHeader {
        UdpAssociateHeader { frag, address }
    }

    /// Read from a cursor over an in-memory packet
    pub fn read_cursor<T: AsRef<[u8]>>(cur: &mut Cursor<T>) -> Result<UdpAssociateHeader, Error> {
        if cur.remaining() < 3 {
            return Err(io::Error::new(ErrorKind::UnexpectedEof, "invalid buf").into());
        }

        let _rsv = cur.get_u16(); // Reserved, ignored
        let frag = cur.get_u8();
        let address = Address::read_cursor(cur)?;
        Ok(UdpAssociateHeader::new(frag, address))
    }

    /// Write to buffer
    pub fn write_to_buf<B: BufMut>(&self, buf: &mut B) {
        let UdpAssociateHeader { ref frag, ref address } = *self;
        buf.put_slice(&[0x00, 0x00, *frag]);
        address.write_to_buf(buf);
    }

    /// Length in bytes
    #[inline]
    pub fn serialized_len(&self) -> usize {
        3 + self.address.serialized_len()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    fn roundtrip_address(addr: Address) {
        let mut buf = BytesMut::with_capacity(addr.serialized_len());
        addr.write_to_buf(&mut buf);
        assert_eq!(buf.len(), addr.serialized_len());

        let decoded = Address::read_cursor(&mut Cursor::new(&buf[..])).unwrap();
        assert_eq!(decoded, addr);
    }

    #[test]
    fn address_codec() {
        roundtrip_address(Address::SocketAddress("127.0.0.1:8080".parse::<SocketAddr>().unwrap()));
        roundtrip_address(Address::SocketAddress("[2001:db8::1]:443".parse::<SocketAddr>().unwrap()));
        roundtrip_address(Address::DomainNameAddress("www.example.com".to_owned(), 80));
    }

    #[test]
    fn address_invalid_type() {
        let packet = [0x05u8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        match Address::read_cursor(&mut Cursor::new(&packet[..])) {
            Err(Error::AddressTypeNotSupported(0x05)) => {}
            r => panic!("unexpected result {:?}", r),
        }
    }

    #[test]
    fn udp_associate_header_codec() {
        let header = UdpAssociateHeader::new(0, Address::SocketAddress("192.0.2.1:53".parse().unwrap()));

        let mut buf = BytesMut::with_capacity(header.serialized_len());
        header.write_to_buf(&mut buf);
        assert_eq!(&buf[..3], &[0x00, 0x00, 0x00]);

        let decoded = UdpAssociateHeader::read_cursor(&mut Cursor::new(&buf[..])).unwrap();
        assert_eq!(decoded.frag, 0);
        assert_eq!(decoded.address, header.address);
    }
}
