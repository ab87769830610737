use super::{Action, HandshakeError, HandshakeTransaction};
use sluice_core::telemetry::tracing;
use std::io::{ErrorKind, Read, Write};

const READ_CHUNK: usize = 512;

/// Drive a [`HandshakeTransaction`] to completion over a blocking stream.
///
/// Read and write timeouts of the stream, if any, bound each individual
/// operation and surface as an I/O error satisfying
/// [`HandshakeError::is_timeout`].
///
/// On success the stream is returned positioned right after the
/// handshake, on failure it is dropped.
pub fn handshake_blocking<S: Read + Write>(
    mut stream: S,
    mut transaction: HandshakeTransaction,
) -> Result<S, HandshakeError> {
    match drive(&mut stream, &mut transaction) {
        Ok(()) => {
            tracing::trace!(
                proxy.kind = %transaction.kind(),
                target = %transaction.target(),
                "proxy handshake: tunnel established",
            );
            Ok(stream)
        }
        Err(err) => {
            tracing::debug!(
                proxy.kind = %transaction.kind(),
                target = %transaction.target(),
                error = %err,
                "proxy handshake: failed",
            );
            Err(err)
        }
    }
}

fn drive<S: Read + Write>(stream: &mut S, transaction: &mut HandshakeTransaction) -> Result<(), HandshakeError> {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match transaction.poll_action()? {
            Action::Write(bytes) => {
                stream
                    .write_all(&bytes)
                    .and_then(|()| stream.flush())
                    .map_err(|err| HandshakeError::io(err).with_context(transaction.step().as_str()))?;
                tracing::trace!(
                    proxy.kind = %transaction.kind(),
                    step = %transaction.step(),
                    len = bytes.len(),
                    "proxy handshake: request written",
                );
            }
            Action::Read(n) => {
                let n = n.min(READ_CHUNK);
                let read = loop {
                    match stream.read(&mut buf[..n]) {
                        Ok(read) => break read,
                        Err(err) if err.kind() == ErrorKind::Interrupted => {}
                        Err(err) => {
                            return Err(HandshakeError::io(err).with_context(transaction.step().as_str()));
                        }
                    }
                };
                if read == 0 {
                    return Err(transaction.unexpected_eof());
                }
                transaction.feed(&buf[..read]);
            }
            Action::Done => return Ok(()),
        }
    }
}
