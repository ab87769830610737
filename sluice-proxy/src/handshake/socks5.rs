use super::{Action, HandshakeError, RejectReason};
use crate::Credentials;
use crate::proto::{
    ProtocolError,
    socks5::{
        AddressType, BoundAddressLen, ConnectRequest, Greeting, MethodSelection, ReplyHead, ReplyKind,
        SocksMethod, UsernamePasswordRequest, UsernamePasswordResponse,
    },
};
use bytes::{Buf, Bytes, BytesMut};
use std::fmt;
use std::net::SocketAddrV4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Progress of a SOCKS5 handshake.
pub enum Socks5Step {
    /// Nothing sent yet.
    Start,
    /// Greeting written, awaiting the method selection.
    GreetingSent,
    /// The proxy selected a method.
    MethodChosen(SocksMethod),
    /// Username/password written, awaiting the status.
    AuthSent,
    /// Authentication is done (or was not required).
    AuthExchanged,
    /// Connect request written, awaiting the reply head.
    ConnectSent,
    /// Reply head accepted, the bound address is of the given type.
    ReplyParsed(AddressType),
    /// Skipping the bound address and port.
    SkippingAddress {
        /// Bytes left to skip.
        remaining: usize,
    },
    /// Bound address and port skipped.
    AddressSkipped,
    /// Tunnel established.
    Done,
}

impl Socks5Step {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Start => "socks5: start",
            Self::GreetingSent => "socks5: greeting sent",
            Self::MethodChosen(_) => "socks5: method chosen",
            Self::AuthSent => "socks5: auth sent",
            Self::AuthExchanged => "socks5: auth exchanged",
            Self::ConnectSent => "socks5: connect sent",
            Self::ReplyParsed(_) => "socks5: reply parsed",
            Self::SkippingAddress { .. } => "socks5: skipping bound address",
            Self::AddressSkipped => "socks5: address skipped",
            Self::Done => "socks5: done",
        }
    }
}

impl fmt::Display for Socks5Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub(super) struct Socks5Machine {
    step: Socks5Step,
    greeting: Bytes,
    auth: Option<Bytes>,
    connect: Bytes,
}

impl Socks5Machine {
    pub(super) fn new(
        destination: SocketAddrV4,
        credentials: Option<Credentials<'_>>,
    ) -> Result<Self, HandshakeError> {
        let greeting = Greeting {
            offer_username_password: credentials.is_some(),
        };
        let mut buf = BytesMut::with_capacity(greeting.serialized_len());
        greeting.write_to_buf(&mut buf);
        let greeting = buf.freeze();

        let auth = match credentials {
            Some(credentials) => {
                let request =
                    UsernamePasswordRequest::new(credentials.username.as_bytes(), credentials.password.as_bytes())
                        .map_err(|err| HandshakeError::protocol(err).with_context("socks5: credentials"))?;
                let mut buf = BytesMut::with_capacity(request.serialized_len());
                request.write_to_buf(&mut buf);
                Some(buf.freeze())
            }
            None => None,
        };

        let request = ConnectRequest { destination };
        let mut buf = BytesMut::with_capacity(request.serialized_len());
        request.write_to_buf(&mut buf);

        Ok(Self {
            step: Socks5Step::Start,
            greeting,
            auth,
            connect: buf.freeze(),
        })
    }

    pub(super) fn step(&self) -> Socks5Step {
        self.step
    }

    pub(super) fn advance(&mut self, inbox: &mut BytesMut) -> Result<Action, HandshakeError> {
        loop {
            match self.step {
                Socks5Step::Start => {
                    self.step = Socks5Step::GreetingSent;
                    return Ok(Action::Write(self.greeting.clone()));
                }
                Socks5Step::GreetingSent => {
                    if let Some(missing) = missing(inbox, MethodSelection::LEN) {
                        return Ok(Action::Read(missing));
                    }
                    let selection = MethodSelection::read_from_buf(inbox)
                        .map_err(|err| self.protocol_error(err))?;
                    self.step = Socks5Step::MethodChosen(selection.method);
                }
                Socks5Step::MethodChosen(method) => match method {
                    SocksMethod::NoAuthenticationRequired => {
                        self.step = Socks5Step::AuthExchanged;
                    }
                    SocksMethod::UsernamePassword => {
                        let Some(auth) = self.auth.clone() else {
                            return Err(self.protocol_error(ProtocolError::UnexpectedByte {
                                pos: 1,
                                byte: method.into(),
                            }));
                        };
                        self.step = Socks5Step::AuthSent;
                        return Ok(Action::Write(auth));
                    }
                    SocksMethod::NoAcceptableMethods => {
                        return Err(HandshakeError::rejected(RejectReason::NoAcceptableMethods)
                            .with_context(self.step.as_str()));
                    }
                    SocksMethod::Gssapi | SocksMethod::Unknown(_) => {
                        return Err(self.protocol_error(ProtocolError::UnexpectedByte {
                            pos: 1,
                            byte: method.into(),
                        }));
                    }
                },
                Socks5Step::AuthSent => {
                    if let Some(missing) = missing(inbox, UsernamePasswordResponse::LEN) {
                        return Ok(Action::Read(missing));
                    }
                    let response = UsernamePasswordResponse::read_from_buf(inbox)
                        .map_err(|err| self.protocol_error(err))?;
                    if !response.success() {
                        return Err(HandshakeError::auth_failed(response.status)
                            .with_context(self.step.as_str()));
                    }
                    self.step = Socks5Step::AuthExchanged;
                }
                Socks5Step::AuthExchanged => {
                    self.step = Socks5Step::ConnectSent;
                    return Ok(Action::Write(self.connect.clone()));
                }
                Socks5Step::ConnectSent => {
                    if let Some(missing) = missing(inbox, ReplyHead::LEN) {
                        return Ok(Action::Read(missing));
                    }
                    let head = ReplyHead::read_from_buf(inbox).map_err(|err| self.protocol_error(err))?;
                    if head.reply != ReplyKind::Succeeded {
                        return Err(HandshakeError::rejected(RejectReason::Socks5(head.reply))
                            .with_context(self.step.as_str()));
                    }
                    self.step = Socks5Step::ReplyParsed(head.address_type);
                }
                Socks5Step::ReplyParsed(address_type) => match address_type.bound_address_len() {
                    Some(BoundAddressLen::Fixed(remaining)) => {
                        self.step = Socks5Step::SkippingAddress { remaining };
                    }
                    Some(BoundAddressLen::LengthPrefixed) => {
                        if let Some(missing) = missing(inbox, 1) {
                            return Ok(Action::Read(missing));
                        }
                        let remaining = usize::from(inbox.get_u8()) + 2;
                        self.step = Socks5Step::SkippingAddress { remaining };
                    }
                    None => {
                        return Err(self.protocol_error(ProtocolError::UnexpectedByte {
                            pos: 3,
                            byte: address_type.into(),
                        }));
                    }
                },
                Socks5Step::SkippingAddress { remaining } => {
                    let skip = remaining.min(inbox.len());
                    inbox.advance(skip);
                    let remaining = remaining - skip;
                    if remaining > 0 {
                        self.step = Socks5Step::SkippingAddress { remaining };
                        return Ok(Action::Read(remaining));
                    }
                    self.step = Socks5Step::AddressSkipped;
                }
                Socks5Step::AddressSkipped => {
                    self.step = Socks5Step::Done;
                }
                Socks5Step::Done => return Ok(Action::Done),
            }
        }
    }

    fn protocol_error(&self, err: ProtocolError) -> HandshakeError {
        HandshakeError::protocol(err).with_context(self.step.as_str())
    }
}

fn missing(inbox: &BytesMut, needed: usize) -> Option<usize> {
    (inbox.len() < needed).then(|| needed - inbox.len())
}
