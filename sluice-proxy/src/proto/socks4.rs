//! SOCKS4 CONNECT frames.
//!
//! SOCKS4 has no formal RFC, see
//! <https://www.openssh.com/txt/socks4.protocol>.

use super::{ProtocolError, ensure_remaining};
use bytes::{Buf, BufMut};
use sluice_utils::macros::enum_builder;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Version byte of a SOCKS4 request.
pub const VERSION: u8 = 0x04;

enum_builder! {
    /// Command requested by a SOCKS4 client.
    @U8
    pub enum Command {
        Connect => 0x01,
        Bind => 0x02,
    }
}

enum_builder! {
    /// Result code of a SOCKS4 reply.
    @U8
    pub enum ReplyCode {
        /// request granted
        Granted => 0x5A,
        /// request rejected or failed
        Rejected => 0x5B,
        /// request rejected because the server cannot reach the client's identd
        IdentdUnreachable => 0x5C,
        /// request rejected because identd reported a different user id
        IdentdMismatch => 0x5D,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Request sent by the client to open a tunnel.
///
/// ```plain
/// +----+----+----+----+----+----+----+----+----+----+....+----+
/// | VN | CD | DSTPORT |      DSTIP        | USERID       |NULL|
/// +----+----+----+----+----+----+----+----+----+----+....+----+
/// | 1  | 1  |    2    |        4          | variable     | 1  |
/// +----+----+----+----+----+----+----+----+----+----+....+----+
/// ```
pub struct ConnectRequest<'a> {
    pub destination: SocketAddrV4,
    /// Empty unless authenticating.
    pub user_id: &'a [u8],
}

impl ConnectRequest<'_> {
    /// Write the [`ConnectRequest`] in binary format into the buffer.
    pub fn write_to_buf<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(VERSION);
        buf.put_u8(Command::Connect.into());
        buf.put_u16(self.destination.port());
        buf.put_slice(&self.destination.ip().octets());
        buf.put_slice(self.user_id);
        buf.put_u8(0x00);
    }

    /// Number of bytes written by [`ConnectRequest::write_to_buf`].
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        1 + 1 + 2 + 4 + self.user_id.len() + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Reply sent by the server.
///
/// ```plain
/// +----+----+----+----+----+----+----+----+
/// | VN | CD | DSTPORT |      DSTIP        |
/// +----+----+----+----+----+----+----+----+
/// | 1  | 1  |    2    |        4          |
/// +----+----+----+----+----+----+----+----+
/// ```
///
/// `VN` is `0x00` per protocol, `0x04` is accepted as well.
/// `DSTPORT` and `DSTIP` are read but carry no meaning for CONNECT.
pub struct Reply {
    pub version: u8,
    pub code: ReplyCode,
    pub port: u16,
    pub ip: Ipv4Addr,
}

impl Reply {
    /// Length of a reply in bytes.
    pub const LEN: usize = 8;

    /// Read the [`Reply`] from a buffer holding at least [`Reply::LEN`] bytes.
    pub fn read_from_buf<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        ensure_remaining(buf, Self::LEN)?;

        let version = buf.get_u8();
        if version != 0x00 && version != VERSION {
            return Err(ProtocolError::UnexpectedByte {
                pos: 0,
                byte: version,
            });
        }

        Ok(Self {
            version,
            code: buf.get_u8().into(),
            port: buf.get_u16(),
            ip: Ipv4Addr::from(buf.get_u32()),
        })
    }

    /// Whether or not the tunnel was granted.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        self.code == ReplyCode::Granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn connect_request_without_user_id() {
        let request = ConnectRequest {
            destination: SocketAddrV4::new(Ipv4Addr::new(1, 2, 3, 4), 80),
            user_id: b"",
        };
        let mut buf = BytesMut::new();
        request.write_to_buf(&mut buf);
        assert_eq!(&buf[..], b"\x04\x01\x00\x50\x01\x02\x03\x04\x00");
        assert_eq!(request.serialized_len(), buf.len());
    }

    #[test]
    fn connect_request_with_user_id() {
        let request = ConnectRequest {
            destination: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 6346),
            user_id: b"john",
        };
        let mut buf = BytesMut::new();
        request.write_to_buf(&mut buf);
        assert_eq!(&buf[..], b"\x04\x01\x18\xca\x0a\x00\x00\x01john\x00");
    }

    #[test]
    fn reply_granted() {
        let mut raw = &b"\x00\x5a\x00\x00\x00\x00\x00\x00"[..];
        let reply = Reply::read_from_buf(&mut raw).unwrap();
        assert!(reply.is_granted());
        assert!(raw.is_empty());
    }

    #[test]
    fn reply_accepts_version_four() {
        let mut raw = &b"\x04\x5b\x00\x00\x00\x00\x00\x00"[..];
        let reply = Reply::read_from_buf(&mut raw).unwrap();
        assert_eq!(reply.code, ReplyCode::Rejected);
    }

    #[test]
    fn reply_unexpected_version() {
        let mut raw = &b"\x05\x5a\x00\x00\x00\x00\x00\x00"[..];
        assert_eq!(
            Reply::read_from_buf(&mut raw).unwrap_err(),
            ProtocolError::UnexpectedByte { pos: 0, byte: 0x05 }
        );
    }

    #[test]
    fn reply_incomplete() {
        let mut raw = &b"\x00\x5a\x00"[..];
        assert_eq!(
            Reply::read_from_buf(&mut raw).unwrap_err(),
            ProtocolError::Incomplete {
                needed: 8,
                available: 3
            }
        );
    }
}
