use sluice_core::admission::AdmissionError;
use sluice_core::error::BoxError;
use sluice_proxy::handshake::{HandshakeError, HandshakeErrorKind};
use std::fmt;

#[derive(Debug)]
/// Error returned when an outbound connection could not be established.
///
/// By the time this error is observed the transport of the attempt
/// is closed and its admission slot released.
pub struct ConnectError {
    kind: ConnectErrorKind,
    context: Option<&'static str>,
    source: Option<BoxError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The kind of [`ConnectError`].
pub enum ConnectErrorKind {
    /// The time budget of the attempt ran out,
    /// while waiting for admission or on the transport.
    Timeout,
    /// The proxy violated its protocol or closed the transport mid-handshake.
    Protocol,
    /// The proxy refused to open a tunnel to the target.
    ProxyRejected,
    /// The proxy refused the configured credentials.
    AuthFailed,
    /// Resolving, connecting, reading or writing failed.
    Transport,
    /// The attempt was cancelled, or refused by a closed admission controller.
    Cancelled,
    /// The request cannot be attempted as given.
    InvalidInput,
}

impl ConnectErrorKind {
    /// Short static description of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Protocol => "proxy protocol error",
            Self::ProxyRejected => "rejected by proxy",
            Self::AuthFailed => "proxy authentication failed",
            Self::Transport => "transport error",
            Self::Cancelled => "cancelled",
            Self::InvalidInput => "invalid input",
        }
    }
}

impl fmt::Display for ConnectErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConnectError {
    pub(crate) fn new(kind: ConnectErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    pub(crate) fn timeout() -> Self {
        Self::new(ConnectErrorKind::Timeout)
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(ConnectErrorKind::Cancelled)
    }

    pub(crate) fn invalid_input(context: &'static str) -> Self {
        Self::new(ConnectErrorKind::InvalidInput).with_context(context)
    }

    /// Transport failure, timeouts reported as [`ConnectErrorKind::Timeout`].
    pub(crate) fn transport(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => ConnectErrorKind::Timeout,
            _ => ConnectErrorKind::Transport,
        };
        Self::new(kind).with_source(err)
    }

    pub(crate) fn with_context(mut self, context: &'static str) -> Self {
        self.context = Some(context);
        self
    }

    pub(crate) fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The kind of this error.
    #[must_use]
    pub fn kind(&self) -> ConnectErrorKind {
        self.kind
    }

    /// Where the attempt failed, if known.
    #[must_use]
    pub fn context(&self) -> Option<&'static str> {
        self.context
    }

    /// Whether or not the attempt ran out of time.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind == ConnectErrorKind::Timeout
    }

    /// Whether or not the attempt was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind == ConnectErrorKind::Cancelled
    }
}

impl From<AdmissionError> for ConnectError {
    fn from(err: AdmissionError) -> Self {
        let kind = match err {
            AdmissionError::Timeout => ConnectErrorKind::Timeout,
            AdmissionError::Cancelled => ConnectErrorKind::Cancelled,
        };
        Self::new(kind).with_context("admission")
    }
}

impl From<HandshakeError> for ConnectError {
    fn from(err: HandshakeError) -> Self {
        let kind = if err.is_timeout() {
            ConnectErrorKind::Timeout
        } else {
            match err.kind() {
                HandshakeErrorKind::Io(_) => ConnectErrorKind::Transport,
                HandshakeErrorKind::UnexpectedEof | HandshakeErrorKind::Protocol(_) => ConnectErrorKind::Protocol,
                HandshakeErrorKind::Rejected(_) => ConnectErrorKind::ProxyRejected,
                HandshakeErrorKind::AuthFailed(_) => ConnectErrorKind::AuthFailed,
                HandshakeErrorKind::InvalidInput(_) => ConnectErrorKind::InvalidInput,
            }
        };
        let mut connect_err = Self::new(kind);
        connect_err.context = err.context();
        connect_err.with_source(err)
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connect error: {}", self.kind)?;
        if let Some(context) = self.context {
            write!(f, " ({context})")?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_proxy::handshake::{Action, HandshakeTarget, HandshakeTransaction};
    use std::error::Error as _;
    use std::net::{IpAddr, Ipv4Addr};

    fn failed_socks4(reply: &[u8]) -> HandshakeError {
        let target = HandshakeTarget::new("peer", 80, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        let mut transaction = HandshakeTransaction::socks4(target, None).unwrap();
        assert!(matches!(transaction.poll_action().unwrap(), Action::Write(_)));
        transaction.feed(reply);
        transaction.poll_action().unwrap_err()
    }

    #[test]
    fn io_timeouts_are_timeouts() {
        let err = ConnectError::transport(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"));
        assert!(err.is_timeout());
        assert!(err.source().is_some());

        let err = ConnectError::transport(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "no"));
        assert_eq!(err.kind(), ConnectErrorKind::Transport);
    }

    #[test]
    fn handshake_errors_map_to_kinds() {
        let err = ConnectError::from(failed_socks4(b"\x00\x5b\x00\x00\x00\x00\x00\x00"));
        assert_eq!(err.kind(), ConnectErrorKind::ProxyRejected);
        assert_eq!(err.context(), Some("socks4: read reply"));
        assert!(err.source().is_some());

        let err = ConnectError::from(failed_socks4(b"\x07\x5a\x00\x00\x00\x00\x00\x00"));
        assert_eq!(err.kind(), ConnectErrorKind::Protocol);
    }

    #[test]
    fn admission_errors_map_to_kinds() {
        assert!(ConnectError::from(AdmissionError::Timeout).is_timeout());
        assert!(ConnectError::from(AdmissionError::Cancelled).is_cancelled());
    }

    #[test]
    fn display_includes_context() {
        let err = ConnectError::invalid_input("port 0");
        assert_eq!(err.to_string(), "connect error: invalid input (port 0)");
    }
}
