//! SOCKS5 client frames, as specified by [RFC 1928] and [RFC 1929].
//!
//! Only the CONNECT command towards IPv4 destinations is emitted.
//!
//! [RFC 1928]: https://datatracker.ietf.org/doc/html/rfc1928
//! [RFC 1929]: https://datatracker.ietf.org/doc/html/rfc1929

use super::{ProtocolError, ensure_remaining, length_prefix};
use bytes::{Buf, BufMut};
use sluice_utils::macros::enum_builder;
use std::net::SocketAddrV4;

enum_builder! {
    /// Version of the SOCKS protocol.
    @U8
    pub enum ProtocolVersion {
        Socks5 => 0x05,
    }
}

enum_builder! {
    /// Version of the username/password sub-negotiation.
    @U8
    pub enum UsernamePasswordSubnegotiationVersion {
        One => 0x01,
    }
}

enum_builder! {
    /// Authentication method negotiated in the greeting.
    @U8
    pub enum SocksMethod {
        NoAuthenticationRequired => 0x00,
        Gssapi => 0x01,
        UsernamePassword => 0x02,
        NoAcceptableMethods => 0xFF,
    }
}

enum_builder! {
    /// Command requested by the client.
    @U8
    pub enum Command {
        Connect => 0x01,
        Bind => 0x02,
        UdpAssociate => 0x03,
    }
}

enum_builder! {
    /// Type of an address within a request or reply.
    @U8
    pub enum AddressType {
        IpV4 => 0x01,
        DomainName => 0x03,
        IpV6 => 0x04,
    }
}

enum_builder! {
    /// Reply field of the server's reply.
    @U8
    pub enum ReplyKind {
        Succeeded => 0x00,
        GeneralServerFailure => 0x01,
        ConnectionNotAllowed => 0x02,
        NetworkUnreachable => 0x03,
        HostUnreachable => 0x04,
        ConnectionRefused => 0x05,
        TtlExpired => 0x06,
        CommandNotSupported => 0x07,
        AddressTypeNotSupported => 0x08,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Length of the bound address (and port) trailing a reply.
pub enum BoundAddressLen {
    /// The address and port take exactly this many bytes.
    Fixed(usize),
    /// A single length byte follows, the address and port
    /// take that many bytes plus two.
    LengthPrefixed,
}

impl AddressType {
    /// Length of a bound address of this type, including its port.
    #[must_use]
    pub fn bound_address_len(self) -> Option<BoundAddressLen> {
        match self {
            Self::IpV4 => Some(BoundAddressLen::Fixed(4 + 2)),
            Self::IpV6 => Some(BoundAddressLen::Fixed(16 + 2)),
            Self::DomainName => Some(BoundAddressLen::LengthPrefixed),
            Self::Unknown(_) => None,
        }
    }
}

fn read_version<B: Buf>(buf: &mut B, pos: usize) -> Result<ProtocolVersion, ProtocolError> {
    let version: ProtocolVersion = buf.get_u8().into();
    match version {
        ProtocolVersion::Socks5 => Ok(version),
        ProtocolVersion::Unknown(byte) => Err(ProtocolError::UnexpectedByte { pos, byte }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The client connects to the server, and sends a header which
/// contains the protocol version desired and SOCKS methods supported by the client.
///
/// ```plain
/// +-----+----------+----------+
/// | VER | NMETHODS | METHODS  |
/// +-----+----------+----------+
/// |  1  |    1     | 1 to 255 |
/// +-----+----------+----------+
/// ```
pub struct Greeting {
    /// Whether or not the username/password method is offered
    /// next to "no authentication required".
    pub offer_username_password: bool,
}

impl Greeting {
    /// Write the [`Greeting`] in binary format into the buffer.
    pub fn write_to_buf<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(ProtocolVersion::Socks5.into());
        if self.offer_username_password {
            buf.put_u8(2);
            buf.put_u8(SocksMethod::NoAuthenticationRequired.into());
            buf.put_u8(SocksMethod::UsernamePassword.into());
        } else {
            buf.put_u8(1);
            buf.put_u8(SocksMethod::NoAuthenticationRequired.into());
        }
    }

    /// Number of bytes written by [`Greeting::write_to_buf`].
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        if self.offer_username_password { 4 } else { 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The server selects from one of the methods given in METHODS.
///
/// ```plain
/// +-----+--------+
/// | VER | METHOD |
/// +-----+--------+
/// |  1  |   1    |
/// +-----+--------+
/// ```
pub struct MethodSelection {
    pub version: ProtocolVersion,
    pub method: SocksMethod,
}

impl MethodSelection {
    /// Length of a method selection in bytes.
    pub const LEN: usize = 2;

    /// Read the [`MethodSelection`] from the buffer.
    pub fn read_from_buf<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        ensure_remaining(buf, Self::LEN)?;
        let version = read_version(buf, 0)?;
        Ok(Self {
            version,
            method: buf.get_u8().into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Username/password request sent by the client, as specified by [RFC 1929].
///
/// ```plain
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
///
/// [RFC 1929]: https://datatracker.ietf.org/doc/html/rfc1929
pub struct UsernamePasswordRequest<'a> {
    username: &'a [u8],
    username_len: u8,
    password: &'a [u8],
    password_len: u8,
}

impl<'a> UsernamePasswordRequest<'a> {
    /// Create a new [`UsernamePasswordRequest`],
    /// failing if either field exceeds 255 bytes.
    pub fn new(username: &'a [u8], password: &'a [u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            username_len: length_prefix("username", username)?,
            username,
            password_len: length_prefix("password", password)?,
            password,
        })
    }

    /// Write the [`UsernamePasswordRequest`] in binary format into the buffer.
    pub fn write_to_buf<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(UsernamePasswordSubnegotiationVersion::One.into());
        buf.put_u8(self.username_len);
        buf.put_slice(self.username);
        buf.put_u8(self.password_len);
        buf.put_slice(self.password);
    }

    /// Number of bytes written by [`UsernamePasswordRequest::write_to_buf`].
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        1 + 1 + self.username.len() + 1 + self.password.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Username/password status sent by the server.
///
/// ```plain
/// +----+--------+
/// |VER | STATUS |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
/// ```
///
/// A `STATUS` field of `0x00` indicates success.
pub struct UsernamePasswordResponse {
    pub version: UsernamePasswordSubnegotiationVersion,
    pub status: u8,
}

impl UsernamePasswordResponse {
    /// Length of the response in bytes.
    pub const LEN: usize = 2;

    /// Read the [`UsernamePasswordResponse`] from the buffer.
    pub fn read_from_buf<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        ensure_remaining(buf, Self::LEN)?;
        let version: UsernamePasswordSubnegotiationVersion = buf.get_u8().into();
        if let UsernamePasswordSubnegotiationVersion::Unknown(byte) = version {
            return Err(ProtocolError::UnexpectedByte { pos: 0, byte });
        }
        Ok(Self {
            version,
            status: buf.get_u8(),
        })
    }

    /// Whether or not the server accepted the credentials.
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// CONNECT request sent by the client.
///
/// ```plain
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub struct ConnectRequest {
    pub destination: SocketAddrV4,
}

impl ConnectRequest {
    /// Write the [`ConnectRequest`] in binary format into the buffer.
    pub fn write_to_buf<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(ProtocolVersion::Socks5.into());
        buf.put_u8(Command::Connect.into());
        buf.put_u8(0x00);
        buf.put_u8(AddressType::IpV4.into());
        buf.put_slice(&self.destination.ip().octets());
        buf.put_u16(self.destination.port());
    }

    /// Number of bytes written by [`ConnectRequest::write_to_buf`].
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        4 + 4 + 2
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Fixed head of the server's reply, the bound address follows it.
///
/// ```plain
/// +----+-----+-------+------+
/// |VER | REP |  RSV  | ATYP |
/// +----+-----+-------+------+
/// | 1  |  1  | X'00' |  1   |
/// +----+-----+-------+------+
/// ```
///
/// The reserved byte is not validated.
pub struct ReplyHead {
    pub version: ProtocolVersion,
    pub reply: ReplyKind,
    pub address_type: AddressType,
}

impl ReplyHead {
    /// Length of the reply head in bytes.
    pub const LEN: usize = 4;

    /// Read the [`ReplyHead`] from the buffer.
    pub fn read_from_buf<B: Buf>(buf: &mut B) -> Result<Self, ProtocolError> {
        ensure_remaining(buf, Self::LEN)?;
        let version = read_version(buf, 0)?;
        let reply = buf.get_u8().into();
        let _reserved = buf.get_u8();
        Ok(Self {
            version,
            reply,
            address_type: buf.get_u8().into(),
        })
    }
}
