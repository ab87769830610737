use super::route::{self, Route};
use super::{ConnectRequest, Connector, RawConnector, TimeoutPolicy, remaining_budget};
use crate::ConnectError;
use sluice_core::telemetry::tracing;
use sluice_proxy::ProxySettings;
use sluice_proxy::handshake::handshake_blocking;
use sluice_utils::time::Deadline;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Instant;

/// A single connection attempt which blocks the calling thread,
/// created by [`Connector::blocking_attempt`].
///
/// The attempt waits for an admission slot, connects to the target
/// or its proxy and runs the proxy handshake, all bounded by the
/// timeout of its [`ConnectRequest`]. The slot is released before
/// [`run`](Self::run) returns, whatever the outcome.
#[derive(Debug)]
pub struct BlockingConnectionAttempt<'a, C, P> {
    connector: &'a Connector<C, P>,
    request: ConnectRequest,
}

impl<'a, C, P> BlockingConnectionAttempt<'a, C, P>
where
    C: RawConnector,
    P: ProxySettings,
{
    pub(super) fn new(connector: &'a Connector<C, P>, request: ConnectRequest) -> Self {
        Self { connector, request }
    }

    /// The request this attempt serves.
    #[must_use]
    pub fn request(&self) -> &ConnectRequest {
        &self.request
    }

    /// Run the attempt to completion.
    ///
    /// This must not be called from within an async context.
    pub fn run(self) -> Result<TcpStream, ConnectError> {
        let Self { connector, request } = self;
        request.validate()?;

        let started = Instant::now();
        let permit = connector.admission().acquire_blocking(request.timeout())?;
        let deadline = match request.policy() {
            TimeoutPolicy::Soft => Deadline::after(request.timeout()),
            TimeoutPolicy::Hard => Deadline::starting_at(started, request.timeout()),
        };

        tracing::trace!(
            ticket = %permit.ticket(),
            target = %request,
            policy = %request.policy(),
            waited_ms = started.elapsed().as_millis(),
            "blocking connect: admitted",
        );

        let result = establish(connector, &request, deadline);
        permit.release();

        if let Err(err) = &result {
            tracing::debug!(target = %request, error = %err, "blocking connect: failed");
        }
        result
    }
}

fn establish<C, P>(
    connector: &Connector<C, P>,
    request: &ConnectRequest,
    deadline: Deadline,
) -> Result<TcpStream, ConnectError>
where
    C: RawConnector,
    P: ProxySettings,
{
    // budget left after admission, checked before any work is started
    remaining_budget(&deadline)?;

    let config = connector.proxy_config();
    let resolved = route::resolve_blocking_within(request.host(), request.port(), &deadline);
    // a slow resolver must not stretch the attempt past its deadline
    remaining_budget(&deadline)?;
    match Route::plan(&config, request.host(), request.port(), resolved)? {
        Route::Direct(addr) => connector.raw_connect_blocking(addr, &deadline),
        Route::Proxied {
            proxy_host,
            proxy_port,
            transaction,
        } => {
            let proxy_ip = route::resolve_blocking_within(&proxy_host, proxy_port, &deadline);
            remaining_budget(&deadline)?;
            let proxy_ip = proxy_ip.map_err(|err| ConnectError::transport(err).with_context("resolve proxy"))?;
            let stream = connector.raw_connect_blocking(SocketAddr::new(proxy_ip, proxy_port), &deadline)?;

            handshake_blocking(DeadlineStream::new(&stream, deadline), transaction)?;

            stream
                .set_read_timeout(None)
                .and_then(|()| stream.set_write_timeout(None))
                .map_err(|err| ConnectError::transport(err).with_context("clear handshake timeouts"))?;
            Ok(stream)
        }
    }
}

/// Bounds every read and write on a [`TcpStream`] by what is left of a deadline.
struct DeadlineStream<'a> {
    stream: &'a TcpStream,
    deadline: Deadline,
}

impl<'a> DeadlineStream<'a> {
    fn new(stream: &'a TcpStream, deadline: Deadline) -> Self {
        Self { stream, deadline }
    }

    fn remaining(&self) -> io::Result<Option<std::time::Duration>> {
        match self.deadline.remaining() {
            Some(left) if left.is_zero() => Err(io::Error::new(io::ErrorKind::TimedOut, "connect budget exhausted")),
            left => Ok(left),
        }
    }
}

impl Read for DeadlineStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.set_read_timeout(self.remaining()?)?;
        self.stream.read(buf)
    }
}

impl Write for DeadlineStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.set_write_timeout(self.remaining()?)?;
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectErrorKind;
    use crate::client::DenyRawConnector;
    use sluice_core::admission::AdmissionController;
    use sluice_proxy::ProxyConfig;
    use std::net::{Ipv4Addr, TcpListener};
    use std::time::Duration;

    #[test]
    fn direct_connect_releases_slot() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let connector = Connector::new().with_admission(AdmissionController::bounded(1));
        let request = ConnectRequest::soft("127.0.0.1", port, Duration::from_secs(5));
        let stream = connector.blocking_attempt(request).run().unwrap();

        assert_eq!(stream.peer_addr().unwrap().port(), port);
        assert_eq!(connector.admission().active(), 0);
        assert_eq!(connector.attempts(), 1);
    }

    #[test]
    fn failed_raw_connect_releases_slot() {
        let connector = Connector::new()
            .with_raw_connector(DenyRawConnector::new())
            .with_admission(AdmissionController::bounded(1));

        let err = connector
            .blocking_attempt(ConnectRequest::new("127.0.0.1", 80))
            .run()
            .unwrap_err();
        assert_eq!(err.kind(), ConnectErrorKind::Transport);
        assert_eq!(connector.admission().active(), 0);
    }

    #[test]
    fn admission_wait_is_bounded_by_timeout() {
        let admission = AdmissionController::bounded(1);
        let connector = Connector::new()
            .with_raw_connector(DenyRawConnector::new())
            .with_admission(admission.clone());

        let held = admission.acquire_blocking(None).unwrap();
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            drop(held);
        });

        let request = ConnectRequest::hard("127.0.0.1", 80, Duration::from_millis(50));
        let err = connector.blocking_attempt(request).run().unwrap_err();
        releaser.join().unwrap();

        assert!(err.is_timeout());
        assert_eq!(admission.active(), 0);
        assert_eq!(admission.waiting(), 0);
        assert_eq!(connector.attempts(), 0);
    }

    #[test]
    fn proxy_stalling_handshake_times_out() {
        let proxy = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let proxy_port = proxy.local_addr().unwrap().port();
        let stall = std::thread::spawn(move || {
            let (mut conn, _) = proxy.accept().unwrap();
            let mut buf = [0u8; 9];
            conn.read_exact(&mut buf).unwrap();
            // never reply, wait for the client to give up
            let mut rest = Vec::new();
            let _read = conn.read_to_end(&mut rest);
            buf
        });

        let config = ProxyConfig::socks4("127.0.0.1", proxy_port).with_use_proxy_for_private(true);
        let connector = Connector::new()
            .with_proxy_settings(config)
            .with_admission(AdmissionController::bounded(1));

        let request = ConnectRequest::soft("127.0.0.1", 80, Duration::from_millis(100));
        let err = connector.blocking_attempt(request).run().unwrap_err();
        assert!(err.is_timeout(), "{err}");
        assert_eq!(connector.admission().active(), 0);
        assert_eq!(&stall.join().unwrap(), b"\x04\x01\x00\x50\x7f\x00\x00\x01\x00");
    }
}
