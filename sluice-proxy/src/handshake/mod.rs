//! Client-side proxy handshakes.
//!
//! A [`HandshakeTransaction`] holds the state of a single handshake
//! without performing any I/O itself: it tells its driver what to do
//! next through an [`Action`] and is fed the bytes the driver reads.
//! Reads never ask for more bytes than the current step needs, so bytes
//! the proxy tunnels from the target after the handshake stay in the
//! transport.
//!
//! Two drivers are provided:
//!
//! - [`handshake_blocking`] over a [`std::io::Read`] + [`std::io::Write`] stream;
//! - [`handshake()`] over a [`tokio::io::AsyncRead`] + [`tokio::io::AsyncWrite`] stream.
//!
//! Both take ownership of the stream and only hand it back on success,
//! a failed handshake drops (and thus closes) it.
//!
//! # Example
//!
//! ```
//! use sluice_proxy::handshake::{Action, HandshakeTarget, HandshakeTransaction};
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! let target = HandshakeTarget::new("example.com", 80, Some(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))));
//! let mut transaction = HandshakeTransaction::socks4(target, None).unwrap();
//!
//! let Action::Write(request) = transaction.poll_action().unwrap() else { unreachable!() };
//! assert_eq!(&request[..], b"\x04\x01\x00\x50\x01\x02\x03\x04\x00");
//!
//! assert_eq!(transaction.poll_action().unwrap(), Action::Read(8));
//! transaction.feed(b"\x00\x5a\x00\x00\x00\x00\x00\x00");
//! assert_eq!(transaction.poll_action().unwrap(), Action::Done);
//! ```

use crate::{Credentials, ProxyKind};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::net::{IpAddr, SocketAddrV4};

mod error;
#[doc(inline)]
pub use error::{HandshakeError, HandshakeErrorKind, RejectReason};

mod http;
#[doc(inline)]
pub use http::HttpStep;

mod socks4;
#[doc(inline)]
pub use socks4::Socks4Step;

mod socks5;
#[doc(inline)]
pub use socks5::Socks5Step;

mod blocking;
#[doc(inline)]
pub use blocking::handshake_blocking;

mod io;
#[doc(inline)]
pub use io::handshake;

#[derive(Debug, Clone, PartialEq, Eq)]
/// What the driver of a [`HandshakeTransaction`] has to do next.
pub enum Action {
    /// Write all of these bytes to the proxy.
    Write(Bytes),
    /// Read at most this many bytes from the proxy and
    /// [`feed`](HandshakeTransaction::feed) them to the transaction.
    Read(usize),
    /// The tunnel is established.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Current step of a [`HandshakeTransaction`].
pub enum HandshakeStep {
    /// HTTP CONNECT step.
    Http(HttpStep),
    /// SOCKS4 step.
    Socks4(Socks4Step),
    /// SOCKS5 step.
    Socks5(Socks5Step),
}

impl HandshakeStep {
    /// Short static description of the step.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http(step) => step.as_str(),
            Self::Socks4(step) => step.as_str(),
            Self::Socks5(step) => step.as_str(),
        }
    }

    /// Whether or not the handshake completed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            Self::Http(HttpStep::Done) | Self::Socks4(Socks4Step::Done) | Self::Socks5(Socks5Step::Done)
        )
    }
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The target the proxy is asked to open a tunnel to.
pub struct HandshakeTarget {
    host: String,
    port: u16,
    ip: Option<IpAddr>,
}

impl HandshakeTarget {
    /// Create a new [`HandshakeTarget`].
    ///
    /// HTTP CONNECT sends `host` as given,
    /// SOCKS requires `ip` to be an IPv4 address.
    pub fn new(host: impl Into<String>, port: u16, ip: Option<IpAddr>) -> Self {
        Self {
            host: host.into(),
            port,
            ip,
        }
    }

    /// The target host as given by the caller.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The target port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The resolved target address, if any.
    #[must_use]
    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    fn socket_addr_v4(&self) -> Result<SocketAddrV4, HandshakeError> {
        match self.ip {
            Some(IpAddr::V4(ip)) => Ok(SocketAddrV4::new(ip, self.port)),
            Some(IpAddr::V6(_)) => Err(HandshakeError::invalid_input("socks requires an ipv4 target")),
            None => Err(HandshakeError::invalid_input("socks requires a resolved target")),
        }
    }
}

impl fmt::Display for HandshakeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug)]
enum Machine {
    Http(http::HttpMachine),
    Socks4(socks4::Socks4Machine),
    Socks5(socks5::Socks5Machine),
}

#[derive(Debug)]
/// State of a single proxy handshake.
pub struct HandshakeTransaction {
    machine: Machine,
    inbox: BytesMut,
    target: HandshakeTarget,
    failed: bool,
}

impl HandshakeTransaction {
    /// Create a [`HandshakeTransaction`] for the given proxy kind.
    ///
    /// Fails for [`ProxyKind::None`], and for SOCKS targets
    /// without IPv4 address or with oversized credentials.
    pub fn new(
        kind: ProxyKind,
        target: HandshakeTarget,
        credentials: Option<Credentials<'_>>,
    ) -> Result<Self, HandshakeError> {
        match kind {
            ProxyKind::None => Err(HandshakeError::invalid_input("no proxy configured")),
            ProxyKind::Http => Ok(Self::http(target)),
            ProxyKind::Socks4 => Self::socks4(target, credentials.map(|c| c.username)),
            ProxyKind::Socks5 => Self::socks5(target, credentials),
        }
    }

    /// Create an HTTP CONNECT [`HandshakeTransaction`].
    #[must_use]
    pub fn http(target: HandshakeTarget) -> Self {
        let machine = Machine::Http(http::HttpMachine::new(&target.host, target.port));
        Self::with_machine(machine, target)
    }

    /// Create a SOCKS4 [`HandshakeTransaction`], sending `user_id` if given.
    pub fn socks4(target: HandshakeTarget, user_id: Option<&str>) -> Result<Self, HandshakeError> {
        let destination = target.socket_addr_v4()?;
        let machine = Machine::Socks4(socks4::Socks4Machine::new(destination, user_id));
        Ok(Self::with_machine(machine, target))
    }

    /// Create a SOCKS5 [`HandshakeTransaction`],
    /// offering username/password authentication if `credentials` are given.
    pub fn socks5(target: HandshakeTarget, credentials: Option<Credentials<'_>>) -> Result<Self, HandshakeError> {
        let destination = target.socket_addr_v4()?;
        let machine = Machine::Socks5(socks5::Socks5Machine::new(destination, credentials)?);
        Ok(Self::with_machine(machine, target))
    }

    fn with_machine(machine: Machine, target: HandshakeTarget) -> Self {
        Self {
            machine,
            inbox: BytesMut::new(),
            target,
            failed: false,
        }
    }

    /// The proxy kind this handshake speaks.
    #[must_use]
    pub fn kind(&self) -> ProxyKind {
        match self.machine {
            Machine::Http(_) => ProxyKind::Http,
            Machine::Socks4(_) => ProxyKind::Socks4,
            Machine::Socks5(_) => ProxyKind::Socks5,
        }
    }

    /// The target the tunnel is requested for.
    #[must_use]
    pub fn target(&self) -> &HandshakeTarget {
        &self.target
    }

    /// The current step.
    #[must_use]
    pub fn step(&self) -> HandshakeStep {
        match &self.machine {
            Machine::Http(m) => HandshakeStep::Http(m.step()),
            Machine::Socks4(m) => HandshakeStep::Socks4(m.step()),
            Machine::Socks5(m) => HandshakeStep::Socks5(m.step()),
        }
    }

    /// Whether or not the tunnel is established.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.step().is_done()
    }

    /// Hand bytes read from the proxy to the transaction.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.inbox.extend_from_slice(bytes);
    }

    /// Advance the handshake as far as the fed bytes allow.
    ///
    /// Once an error is returned the transaction is spent,
    /// polling it again keeps failing.
    pub fn poll_action(&mut self) -> Result<Action, HandshakeError> {
        if self.failed {
            return Err(HandshakeError::invalid_input("handshake already failed")
                .with_context(self.step().as_str()));
        }

        let result = match &mut self.machine {
            Machine::Http(m) => m.advance(&mut self.inbox),
            Machine::Socks4(m) => m.advance(&mut self.inbox),
            Machine::Socks5(m) => m.advance(&mut self.inbox),
        };
        self.failed = result.is_err();
        result
    }

    /// The error to report when the proxy closes the transport mid-handshake.
    #[must_use]
    pub fn unexpected_eof(&self) -> HandshakeError {
        HandshakeError::unexpected_eof().with_context(self.step().as_str())
    }
}
