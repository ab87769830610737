use sluice_utils::macros::static_str_error;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Trait used by the [`Connector`](super::Connector) to establish the raw
/// transport to either the target or the proxy in front of it.
///
/// The blocking form is used by
/// [`BlockingConnectionAttempt`](super::BlockingConnectionAttempt)s,
/// the async form by [`AsyncConnectionAttempt`](super::AsyncConnectionAttempt)s.
pub trait RawConnector: Clone + Send + Sync + 'static {
    /// Connect to `addr`, blocking the current thread at most `timeout`
    /// (`None` meaning the OS default).
    fn connect_blocking(&self, addr: SocketAddr, timeout: Option<Duration>) -> io::Result<std::net::TcpStream>;

    /// Connect to `addr` without blocking the current thread.
    fn connect(&self, addr: SocketAddr) -> impl Future<Output = io::Result<tokio::net::TcpStream>> + Send + '_;
}

impl RawConnector for () {
    fn connect_blocking(&self, addr: SocketAddr, timeout: Option<Duration>) -> io::Result<std::net::TcpStream> {
        match timeout {
            Some(timeout) => std::net::TcpStream::connect_timeout(&addr, timeout),
            None => std::net::TcpStream::connect(addr),
        }
    }

    async fn connect(&self, addr: SocketAddr) -> io::Result<tokio::net::TcpStream> {
        tokio::net::TcpStream::connect(addr).await
    }
}

impl<T: RawConnector> RawConnector for Arc<T> {
    fn connect_blocking(&self, addr: SocketAddr, timeout: Option<Duration>) -> io::Result<std::net::TcpStream> {
        (**self).connect_blocking(addr, timeout)
    }

    fn connect(&self, addr: SocketAddr) -> impl Future<Output = io::Result<tokio::net::TcpStream>> + Send + '_ {
        (**self).connect(addr)
    }
}

#[derive(Debug, Clone, Default)]
#[non_exhaustive]
/// a [`RawConnector`] implementation which
/// denies all connect requests with a [`RawConnectDenied`] error.
pub struct DenyRawConnector;

impl DenyRawConnector {
    /// Create a new [`Default`] [`DenyRawConnector`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

static_str_error! {
    pub struct RawConnectDenied = "raw tcp connect denied";
}

fn denied() -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, RawConnectDenied::new())
}

impl RawConnector for DenyRawConnector {
    fn connect_blocking(&self, _: SocketAddr, _: Option<Duration>) -> io::Result<std::net::TcpStream> {
        Err(denied())
    }

    async fn connect(&self, _: SocketAddr) -> io::Result<tokio::net::TcpStream> {
        Err(denied())
    }
}
