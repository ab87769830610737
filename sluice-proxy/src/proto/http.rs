//! HTTP CONNECT tunneling frames.

use bytes::BufMut;

/// Maximum size of a CONNECT response head (status line and headers).
pub const MAX_RESPONSE_HEAD_LEN: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
/// CONNECT request sent by the client.
///
/// ```plain
/// CONNECT <host>:<port> HTTP/1.0\r\n
/// \r\n
/// ```
///
/// IPv6 literals are written between brackets.
pub struct ConnectRequest<'a> {
    pub host: &'a str,
    pub port: u16,
}

impl ConnectRequest<'_> {
    fn bracketed(&self) -> bool {
        self.host.contains(':') && !self.host.starts_with('[')
    }

    /// Write the [`ConnectRequest`] into the buffer.
    pub fn write_to_buf<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(b"CONNECT ");
        if self.bracketed() {
            buf.put_u8(b'[');
            buf.put_slice(self.host.as_bytes());
            buf.put_u8(b']');
        } else {
            buf.put_slice(self.host.as_bytes());
        }
        buf.put_u8(b':');
        buf.put_slice(self.port.to_string().as_bytes());
        buf.put_slice(b" HTTP/1.0\r\n\r\n");
    }
}

/// Whether or not the status line of a CONNECT response accepts the tunnel.
///
/// Any status line containing `200` is accepted.
#[must_use]
pub fn status_line_accepted(line: &[u8]) -> bool {
    line.windows(3).any(|w| w == b"200")
}

/// Position of the first `\r\n` in `buf`.
#[must_use]
pub fn find_line_end(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Number of bytes that can be read without reading past the
/// end of the line currently buffered in `buf`.
///
/// A partial line not ending in `\r` cannot end within the next byte,
/// so two bytes are safe to read, otherwise only one.
#[must_use]
pub fn line_lookahead(buf: &[u8]) -> usize {
    if buf.last() == Some(&b'\r') { 1 } else { 2 }
}
