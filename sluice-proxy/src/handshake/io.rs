use super::{Action, HandshakeError, HandshakeTransaction};
use sluice_core::telemetry::tracing;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 512;

/// Drive a [`HandshakeTransaction`] to completion over an async stream.
///
/// The handshake is not bounded in time by itself,
/// wrap the returned future in a timeout to bound it.
///
/// On success the stream is returned positioned right after the
/// handshake, on failure it is shut down and dropped.
pub async fn handshake<S>(mut stream: S, mut transaction: HandshakeTransaction) -> Result<S, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match drive(&mut stream, &mut transaction).await {
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
            if let Err(shutdown_err) = stream.shutdown().await {
                tracing::trace!(error = %shutdown_err, "proxy handshake: shutdown after failure");
            }
            Err(err)
        }
    }
}

async fn drive<S>(stream: &mut S, transaction: &mut HandshakeTransaction) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match transaction.poll_action()? {
            Action::Write(bytes) => {
                stream
                    .write_all(&bytes)
                    .await
                    .map_err(|err| HandshakeError::io(err).with_context(transaction.step().as_str()))?;
                stream
                    .flush()
                    .await
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
                let read = stream
                    .read(&mut buf[..n])
                    .await
                    .map_err(|err| HandshakeError::io(err).with_context(transaction.step().as_str()))?;
                if read == 0 {
                    return Err(transaction.unexpected_eof());
                }
                transaction.feed(&buf[..read]);
            }
            Action::Done => return Ok(()),
        }
    }
}
