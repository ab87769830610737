use super::{Action, HandshakeError, RejectReason};
use crate::proto::{
    ProtocolError,
    http::{ConnectRequest, MAX_RESPONSE_HEAD_LEN, find_line_end, line_lookahead, status_line_accepted},
};
use bytes::{Bytes, BytesMut};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Progress of an HTTP CONNECT handshake.
pub enum HttpStep {
    /// Nothing sent yet.
    Start,
    /// Request written, awaiting the status line.
    RequestSent,
    /// Status line accepted, skipping headers until the empty line.
    ReadingHeaders,
    /// Tunnel established.
    Done,
}

impl HttpStep {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Start => "http: start",
            Self::RequestSent => "http: request sent",
            Self::ReadingHeaders => "http: reading headers",
            Self::Done => "http: done",
        }
    }
}

impl fmt::Display for HttpStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub(super) struct HttpMachine {
    step: HttpStep,
    request: Bytes,
    head_len: usize,
}

impl HttpMachine {
    pub(super) fn new(host: &str, port: u16) -> Self {
        let mut buf = BytesMut::new();
        ConnectRequest { host, port }.write_to_buf(&mut buf);
        Self {
            step: HttpStep::Start,
            request: buf.freeze(),
            head_len: 0,
        }
    }

    pub(super) fn step(&self) -> HttpStep {
        self.step
    }

    pub(super) fn advance(&mut self, inbox: &mut BytesMut) -> Result<Action, HandshakeError> {
        loop {
            match self.step {
                HttpStep::Start => {
                    self.step = HttpStep::RequestSent;
                    return Ok(Action::Write(self.request.clone()));
                }
                HttpStep::RequestSent | HttpStep::ReadingHeaders => {
                    let Some(end) = find_line_end(inbox) else {
                        self.check_head_len(inbox.len())?;
                        return Ok(Action::Read(line_lookahead(inbox)));
                    };

                    let line = inbox.split_to(end + 2);
                    self.head_len += line.len();
                    self.check_head_len(0)?;
                    let line = &line[..end];

                    if self.step == HttpStep::RequestSent {
                        if !status_line_accepted(line) {
                            return Err(HandshakeError::rejected(RejectReason::Http(
                                String::from_utf8_lossy(line).into_owned(),
                            ))
                            .with_context("http: read status line"));
                        }
                        self.step = HttpStep::ReadingHeaders;
                    } else if line.is_empty() {
                        self.step = HttpStep::Done;
                    }
                }
                HttpStep::Done => return Ok(Action::Done),
            }
        }
    }

    fn check_head_len(&self, pending: usize) -> Result<(), HandshakeError> {
        if self.head_len + pending > MAX_RESPONSE_HEAD_LEN {
            return Err(HandshakeError::protocol(ProtocolError::ResponseTooLarge {
                max: MAX_RESPONSE_HEAD_LEN,
            })
            .with_context(self.step.as_str()));
        }
        Ok(())
    }
}
