use super::{
    AsyncConnectionAttempt, AttemptHandle, BlockingConnectionAttempt, Completion, ConnectRequest, RawConnector,
    remaining_budget,
};
use crate::ConnectError;
use sluice_core::admission::AdmissionController;
use sluice_core::rt::Executor;
use sluice_core::telemetry::tracing;
use sluice_proxy::{ProxyConfig, ProxySettings};
use sluice_utils::macros::generate_set_and_with;
use sluice_utils::time::Deadline;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;

/// A connector which establishes outbound TCP connections,
/// transparently tunneling through the configured proxy.
///
/// All attempts made through a connector (and its clones) share one
/// [`AdmissionController`], bounding how many of them are in flight.
/// The [`ProxyConfig`] is read from the [`ProxySettings`] once per attempt.
pub struct Connector<C = (), P = ProxyConfig> {
    admission: AdmissionController,
    settings: Arc<P>,
    raw: C,
    executor: Executor,
    keep_alive: bool,
    attempts: Arc<AtomicU64>,
}

impl Connector {
    /// Create a new [`Connector`] connecting directly,
    /// without bounding the number of attempts in flight.
    ///
    /// Async attempts are spawned on the runtime of the caller, if any.
    #[must_use]
    pub fn new() -> Self {
        Self {
            admission: AdmissionController::unlimited(),
            settings: Arc::new(ProxyConfig::direct()),
            raw: (),
            executor: Executor::current(),
            keep_alive: false,
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for Connector {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, P> Connector<C, P> {
    /// Consume `self` to attach the given [`RawConnector`] as a new [`Connector`].
    pub fn with_raw_connector<OtherC: RawConnector>(self, raw: OtherC) -> Connector<OtherC, P> {
        Connector {
            admission: self.admission,
            settings: self.settings,
            raw,
            executor: self.executor,
            keep_alive: self.keep_alive,
            attempts: self.attempts,
        }
    }

    /// Consume `self` to attach the given [`ProxySettings`] as a new [`Connector`].
    pub fn with_proxy_settings<OtherP: ProxySettings>(self, settings: OtherP) -> Connector<C, OtherP> {
        Connector {
            admission: self.admission,
            settings: Arc::new(settings),
            raw: self.raw,
            executor: self.executor,
            keep_alive: self.keep_alive,
            attempts: self.attempts,
        }
    }

    generate_set_and_with! {
        /// Share the given [`AdmissionController`] with this connector.
        pub fn admission(mut self, admission: AdmissionController) -> Self {
            self.admission = admission;
            self
        }
    }

    generate_set_and_with! {
        /// Spawn async attempts on the given [`Executor`].
        pub fn executor(mut self, executor: Executor) -> Self {
            self.executor = executor;
            self
        }
    }

    generate_set_and_with! {
        /// Enable or disable TCP keep-alive on established connections.
        pub fn keep_alive(mut self, keep_alive: bool) -> Self {
            self.keep_alive = keep_alive;
            self
        }
    }

    /// The [`AdmissionController`] of this connector.
    #[must_use]
    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// The [`Executor`] async attempts are spawned on.
    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// The maximum number of attempts allowed in flight at once,
    /// `usize::MAX` if unbounded.
    #[must_use]
    pub fn num_allowed_sockets(&self) -> usize {
        self.admission.max_allowed()
    }

    /// Number of raw connections started by this connector and its clones.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Reset the counter reported by [`attempts`](Self::attempts).
    pub fn clear_attempts(&self) {
        self.attempts.store(0, Ordering::Relaxed);
    }

    /// Cancel the attempt behind the given handle,
    /// see [`AttemptHandle::cancel`].
    pub fn cancel(&self, handle: &AttemptHandle) -> bool {
        handle.cancel()
    }
}

impl<C, P> Connector<C, P>
where
    C: RawConnector,
    P: ProxySettings,
{
    /// Prepare a [`BlockingConnectionAttempt`] for the given request.
    pub fn blocking_attempt(&self, request: ConnectRequest) -> BlockingConnectionAttempt<'_, C, P> {
        BlockingConnectionAttempt::new(self, request)
    }

    /// Connect, blocking the calling thread until the connection is
    /// established or the attempt failed.
    ///
    /// This must not be called from within an async context.
    pub fn connect_blocking(&self, request: ConnectRequest) -> Result<std::net::TcpStream, ConnectError> {
        self.blocking_attempt(request).run()
    }

    /// Submit a non-blocking attempt, `on_complete` being invoked with its outcome.
    ///
    /// Returns right away, either admitted or queued. Invalid requests and
    /// requests refused by a closed admission controller fail here, without
    /// `on_complete` being invoked.
    pub fn connect_async<F>(&self, request: ConnectRequest, on_complete: F) -> Result<AttemptHandle, ConnectError>
    where
        F: FnOnce(Result<tokio::net::TcpStream, ConnectError>) + Send + 'static,
    {
        request.validate()?;
        let executor = if self.executor.handle().is_some() {
            self.executor.clone()
        } else {
            Executor::current()
        };
        if executor.handle().is_none() {
            return Err(ConnectError::invalid_input("no tokio runtime to drive the attempt"));
        }

        let connector = self.clone().with_executor(executor);
        AsyncConnectionAttempt::new(connector, request, on_complete).submit()
    }

    /// Submit a non-blocking attempt, returning a future of its outcome.
    pub fn connect(&self, request: ConnectRequest) -> Result<Completion, ConnectError> {
        let (tx, rx) = oneshot::channel();
        let handle = self.connect_async(request, move |result| {
            if let Err(Ok(stream)) = tx.send(result) {
                tracing::trace!(
                    peer = ?stream.peer_addr().ok(),
                    "connect: completion dropped, closing established stream",
                );
            }
        })?;
        Ok(Completion::new(rx, handle))
    }

    pub(super) fn proxy_config(&self) -> Arc<ProxyConfig> {
        self.settings.proxy_config()
    }

    pub(super) fn raw_connect_blocking(
        &self,
        addr: SocketAddr,
        deadline: &Deadline,
    ) -> Result<std::net::TcpStream, ConnectError> {
        let timeout = remaining_budget(deadline)?;
        self.attempts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(%addr, ?timeout, "raw connect (blocking)");

        let stream = self
            .raw
            .connect_blocking(addr, timeout)
            .map_err(|err| ConnectError::transport(err).with_context("raw connect"))?;
        self.apply_keep_alive(&stream)?;
        Ok(stream)
    }

    pub(super) async fn raw_connect(&self, addr: SocketAddr) -> Result<tokio::net::TcpStream, ConnectError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(%addr, "raw connect");

        let stream = self
            .raw
            .connect(addr)
            .await
            .map_err(|err| ConnectError::transport(err).with_context("raw connect"))?;
        self.apply_keep_alive(&stream)?;
        Ok(stream)
    }
}

impl<C, P> Connector<C, P> {
    #[cfg(unix)]
    fn apply_keep_alive<S: std::os::fd::AsFd>(&self, stream: &S) -> Result<(), ConnectError> {
        if self.keep_alive {
            socket2::SockRef::from(stream)
                .set_keepalive(true)
                .map_err(|err| ConnectError::transport(err).with_context("enable keep-alive"))?;
        }
        Ok(())
    }

    #[cfg(windows)]
    fn apply_keep_alive<S: std::os::windows::io::AsSocket>(&self, stream: &S) -> Result<(), ConnectError> {
        if self.keep_alive {
            socket2::SockRef::from(stream)
                .set_keepalive(true)
                .map_err(|err| ConnectError::transport(err).with_context("enable keep-alive"))?;
        }
        Ok(())
    }
}

impl<C: Clone, P> Clone for Connector<C, P> {
    fn clone(&self) -> Self {
        Self {
            admission: self.admission.clone(),
            settings: self.settings.clone(),
            raw: self.raw.clone(),
            executor: self.executor.clone(),
            keep_alive: self.keep_alive,
            attempts: self.attempts.clone(),
        }
    }
}

impl<C: fmt::Debug, P> fmt::Debug for Connector<C, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("admission", &self.admission)
            .field("raw", &self.raw)
            .field("executor", &self.executor)
            .field("keep_alive", &self.keep_alive)
            .field("attempts", &self.attempts())
            .finish_non_exhaustive()
    }
}
