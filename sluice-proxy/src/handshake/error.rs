use crate::proto::{ProtocolError, socks4, socks5};
use std::fmt;

#[derive(Debug)]
/// Error returned when a proxy handshake fails.
///
/// The transport the handshake ran over is closed
/// by the time this error is observed.
pub struct HandshakeError {
    kind: HandshakeErrorKind,
    context: Option<&'static str>,
}

#[derive(Debug)]
/// The kind of [`HandshakeError`].
pub enum HandshakeErrorKind {
    /// I/O error on the transport, including read and write timeouts.
    Io(std::io::Error),
    /// The proxy closed the transport before the handshake completed.
    UnexpectedEof,
    /// The proxy sent bytes violating the protocol.
    Protocol(ProtocolError),
    /// The proxy refused to open the tunnel.
    Rejected(RejectReason),
    /// The proxy refused the offered credentials, with the status it sent.
    AuthFailed(u8),
    /// The handshake cannot be performed for the given target or configuration.
    InvalidInput(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Why a proxy refused to open a tunnel.
pub enum RejectReason {
    /// HTTP CONNECT response whose status line does not accept the tunnel.
    Http(String),
    /// SOCKS4 reply code other than granted.
    Socks4(socks4::ReplyCode),
    /// SOCKS5 reply other than succeeded.
    Socks5(socks5::ReplyKind),
    /// SOCKS5 proxy accepting none of the offered methods.
    NoAcceptableMethods,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(status_line) => write!(f, "http status line {status_line:?}"),
            Self::Socks4(code) => write!(f, "socks4 reply {code}"),
            Self::Socks5(reply) => write!(f, "socks5 reply {reply}"),
            Self::NoAcceptableMethods => f.write_str("socks5: no acceptable methods"),
        }
    }
}

impl HandshakeError {
    pub(crate) fn io(err: std::io::Error) -> Self {
        Self::new(HandshakeErrorKind::Io(err))
    }

    pub(crate) fn unexpected_eof() -> Self {
        Self::new(HandshakeErrorKind::UnexpectedEof)
    }

    pub(crate) fn protocol(err: ProtocolError) -> Self {
        Self::new(HandshakeErrorKind::Protocol(err))
    }

    pub(crate) fn rejected(reason: RejectReason) -> Self {
        Self::new(HandshakeErrorKind::Rejected(reason))
    }

    pub(crate) fn auth_failed(status: u8) -> Self {
        Self::new(HandshakeErrorKind::AuthFailed(status))
    }

    pub(crate) fn invalid_input(msg: &'static str) -> Self {
        Self::new(HandshakeErrorKind::InvalidInput(msg))
    }

    fn new(kind: HandshakeErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub(crate) fn with_context(mut self, context: &'static str) -> Self {
        self.context = Some(context);
        self
    }

    /// The kind of this error.
    #[must_use]
    pub fn kind(&self) -> &HandshakeErrorKind {
        &self.kind
    }

    /// Consume the error, returning its kind.
    #[must_use]
    pub fn into_kind(self) -> HandshakeErrorKind {
        self.kind
    }

    /// Where in the handshake the error occurred, if known.
    #[must_use]
    pub fn context(&self) -> Option<&'static str> {
        self.context
    }

    /// Whether or not the error is caused by an I/O timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            &self.kind,
            HandshakeErrorKind::Io(err)
                if matches!(err.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock)
        )
    }
}

impl From<ProtocolError> for HandshakeError {
    fn from(err: ProtocolError) -> Self {
        Self::protocol(err)
    }
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let context = self.context.unwrap_or("no context");
        match &self.kind {
            HandshakeErrorKind::Io(err) => {
                write!(f, "proxy handshake error: I/O: {err} ({context})")
            }
            HandshakeErrorKind::UnexpectedEof => {
                write!(f, "proxy handshake error: unexpected end of stream ({context})")
            }
            HandshakeErrorKind::Protocol(err) => {
                write!(f, "proxy handshake error: protocol error: {err} ({context})")
            }
            HandshakeErrorKind::Rejected(reason) => {
                write!(f, "proxy handshake error: rejected: {reason} ({context})")
            }
            HandshakeErrorKind::AuthFailed(status) => {
                write!(
                    f,
                    "proxy handshake error: authentication failed: status {status:#04x} ({context})"
                )
            }
            HandshakeErrorKind::InvalidInput(msg) => {
                write!(f, "proxy handshake error: invalid input: {msg} ({context})")
            }
        }
    }
}

impl std::error::Error for HandshakeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            HandshakeErrorKind::Io(err) => Some(err as &(dyn std::error::Error + 'static)),
            HandshakeErrorKind::Protocol(err) => Some(err as &(dyn std::error::Error + 'static)),
            HandshakeErrorKind::UnexpectedEof
            | HandshakeErrorKind::Rejected(_)
            | HandshakeErrorKind::AuthFailed(_)
            | HandshakeErrorKind::InvalidInput(_) => None,
        }
    }
}
