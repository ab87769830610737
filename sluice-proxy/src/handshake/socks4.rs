use super::{Action, HandshakeError, RejectReason};
use crate::proto::socks4::{ConnectRequest, Reply};
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::net::SocketAddrV4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Progress of a SOCKS4 handshake.
pub enum Socks4Step {
    /// Nothing sent yet.
    Start,
    /// Connect request written, awaiting the 8 byte reply.
    RequestSent,
    /// Tunnel granted.
    Done,
}

impl Socks4Step {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Start => "socks4: start",
            Self::RequestSent => "socks4: request sent",
            Self::Done => "socks4: done",
        }
    }
}

impl fmt::Display for Socks4Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub(super) struct Socks4Machine {
    step: Socks4Step,
    request: Bytes,
}

impl Socks4Machine {
    pub(super) fn new(destination: SocketAddrV4, user_id: Option<&str>) -> Self {
        let request = ConnectRequest {
            destination,
            user_id: user_id.map(str::as_bytes).unwrap_or_default(),
        };
        let mut buf = BytesMut::with_capacity(request.serialized_len());
        request.write_to_buf(&mut buf);
        Self {
            step: Socks4Step::Start,
            request: buf.freeze(),
        }
    }

    pub(super) fn step(&self) -> Socks4Step {
        self.step
    }

    pub(super) fn advance(&mut self, inbox: &mut BytesMut) -> Result<Action, HandshakeError> {
        match self.step {
            Socks4Step::Start => {
                self.step = Socks4Step::RequestSent;
                Ok(Action::Write(self.request.clone()))
            }
            Socks4Step::RequestSent => {
                if inbox.len() < Reply::LEN {
                    return Ok(Action::Read(Reply::LEN - inbox.len()));
                }
                let mut raw = inbox.split_to(Reply::LEN);
                let reply = Reply::read_from_buf(&mut raw)
                    .map_err(|err| HandshakeError::protocol(err).with_context("socks4: read reply"))?;
                if !reply.is_granted() {
                    return Err(HandshakeError::rejected(RejectReason::Socks4(reply.code))
                        .with_context("socks4: read reply"));
                }
                self.step = Socks4Step::Done;
                Ok(Action::Done)
            }
            Socks4Step::Done => Ok(Action::Done),
        }
    }
}
