use super::route::{self, Route};
use super::{ConnectRequest, Connector, RawConnector, TimeoutPolicy, remaining_budget};
use crate::ConnectError;
use parking_lot::Mutex;
use sluice_core::admission::{AdmissionController, AdmissionPermit, CancelOutcome, Dispatch, Ticket};
use sluice_core::telemetry::tracing;
use sluice_proxy::ProxySettings;
use sluice_proxy::handshake::handshake;
use sluice_utils::time::Deadline;
use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Lifecycle of an [`AsyncConnectionAttempt`].
///
/// ```plain
/// Queued -> Admitted -> RawConnecting -> DirectDone
///                                     -> Handshaking -> Connected
///
/// any non-terminal state -> Failed | Cancelled
/// ```
pub enum AttemptState {
    /// Waiting for an admission slot.
    Queued,
    /// Holding a slot, not started yet.
    Admitted,
    /// Resolving and connecting to the target or the proxy.
    RawConnecting,
    /// Connected directly to the target.
    DirectDone,
    /// Running the proxy handshake.
    Handshaking,
    /// Tunnel through the proxy established.
    Connected,
    /// The attempt failed.
    Failed,
    /// The attempt was cancelled.
    Cancelled,
}

impl AttemptState {
    /// Whether or not the attempt has finished.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::DirectDone | Self::Connected | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Queued => "queued",
            Self::Admitted => "admitted",
            Self::RawConnecting => "raw connecting",
            Self::DirectDone => "direct done",
            Self::Handshaking => "handshaking",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug)]
struct AttemptShared {
    state: Mutex<AttemptState>,
    cancel: CancellationToken,
}

impl AttemptShared {
    fn new() -> Self {
        Self {
            state: Mutex::new(AttemptState::Queued),
            cancel: CancellationToken::new(),
        }
    }

    fn state(&self) -> AttemptState {
        *self.state.lock()
    }

    fn advance(&self, next: AttemptState) {
        let mut state = self.state.lock();
        if !state.is_terminal() {
            *state = next;
        }
    }

    /// Settle the outcome of the attempt.
    ///
    /// A cancellation wins over any other outcome it races with, so that a
    /// `true` returned by [`AttemptHandle::cancel`] always means a
    /// [`Cancelled`] outcome.
    ///
    /// [`Cancelled`]: crate::ConnectErrorKind::Cancelled
    fn finish(&self, result: Result<TcpStream, ConnectError>) -> Result<TcpStream, ConnectError> {
        let mut state = self.state.lock();
        let result = match result {
            _ if self.cancel.is_cancelled() => Err(ConnectError::cancelled()),
            result => result,
        };
        *state = match &result {
            Ok(_) if *state == AttemptState::Handshaking => AttemptState::Connected,
            Ok(_) => AttemptState::DirectDone,
            Err(err) if err.is_cancelled() => AttemptState::Cancelled,
            Err(_) => AttemptState::Failed,
        };
        result
    }
}

/// A single non-blocking connection attempt.
///
/// Created and submitted by [`Connector::connect_async`], it waits in the
/// admission FIFO until a slot is granted, after which it is driven as a
/// task on the connector's executor. Its completion callback is invoked
/// exactly once, after the transport of a failed attempt is closed and its
/// slot released, except when the attempt is cancelled while still queued:
/// then the callback is dropped without ever being invoked. An admitted
/// attempt whose runtime shuts down completes as cancelled.
pub struct AsyncConnectionAttempt<C, P, F> {
    connector: Connector<C, P>,
    request: ConnectRequest,
    deadline: Deadline,
    shared: Arc<AttemptShared>,
    on_complete: F,
}

impl<C, P, F> fmt::Debug for AsyncConnectionAttempt<C, P, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncConnectionAttempt")
            .field("request", &self.request)
            .field("deadline", &self.deadline)
            .field("state", &self.shared.state())
            .finish()
    }
}

impl<C, P, F> AsyncConnectionAttempt<C, P, F>
where
    C: RawConnector,
    P: ProxySettings,
    F: FnOnce(Result<TcpStream, ConnectError>) + Send + 'static,
{
    pub(super) fn new(connector: Connector<C, P>, request: ConnectRequest, on_complete: F) -> Self {
        let deadline = Deadline::after(request.timeout());
        Self {
            connector,
            request,
            deadline,
            shared: Arc::new(AttemptShared::new()),
            on_complete,
        }
    }

    /// Hand the attempt to the admission controller of its connector.
    ///
    /// An attempt refused by a closed controller is dropped
    /// without its callback being invoked.
    pub(super) fn submit(self) -> Result<AttemptHandle, ConnectError> {
        let admission = self.connector.admission().clone();
        let shared = self.shared.clone();
        let target = self.request.to_string();

        let admission_result = admission.enqueue_or_admit(self)?;
        let ticket = admission_result.ticket();
        tracing::trace!(
            %ticket,
            %target,
            queued = admission_result.is_queued(),
            "async connect: submitted",
        );

        Ok(AttemptHandle {
            ticket,
            admission,
            shared,
        })
    }
}

impl<C, P, F> Dispatch for AsyncConnectionAttempt<C, P, F>
where
    C: RawConnector,
    P: ProxySettings,
    F: FnOnce(Result<TcpStream, ConnectError>) + Send + 'static,
{
    fn dispatch(self: Box<Self>, permit: AdmissionPermit) {
        let Self {
            connector,
            request,
            deadline,
            shared,
            on_complete,
        } = *self;
        shared.advance(AttemptState::Admitted);

        // a runtime which has shut down drops the task unpolled
        let on_complete = CompletionGuard::new(shared.clone(), on_complete);
        let executor = connector.executor().clone();
        executor.spawn_task(run(connector, request, deadline, shared, on_complete, permit));
    }

    fn reject(self: Box<Self>) {
        let Self { shared, on_complete, .. } = *self;
        *shared.state.lock() = AttemptState::Cancelled;
        on_complete(Err(ConnectError::cancelled().with_context("admission closed")));
    }
}

async fn run<C, P, F>(
    connector: Connector<C, P>,
    request: ConnectRequest,
    deadline: Deadline,
    shared: Arc<AttemptShared>,
    on_complete: CompletionGuard<F>,
    permit: AdmissionPermit,
) where
    C: RawConnector,
    P: ProxySettings,
    F: FnOnce(Result<TcpStream, ConnectError>),
{
    // the soft budget starts once admitted, the hard one at submission
    let deadline = match request.policy() {
        TimeoutPolicy::Soft => Deadline::after(request.timeout()),
        TimeoutPolicy::Hard => deadline,
    };

    let ticket = permit.ticket();
    let result = match remaining_budget(&deadline) {
        _ if shared.cancel.is_cancelled() => Err(ConnectError::cancelled()),
        Err(err) => Err(err),
        Ok(_) => {
            tokio::select! {
                biased;
                () = shared.cancel.cancelled() => Err(ConnectError::cancelled()),
                result = within(&deadline, establish(&connector, &request, &shared)) => result,
            }
        }
    };

    // transport of a failed attempt is dropped by now
    let result = shared.finish(result);
    permit.release();

    match &result {
        Ok(_) => tracing::trace!(%ticket, target = %request, state = %shared.state(), "async connect: done"),
        Err(err) => tracing::debug!(%ticket, target = %request, error = %err, "async connect: failed"),
    }
    on_complete.complete(result);
}

/// Owns the callback of an admitted attempt.
///
/// Dropped before completing, such as when the runtime driving the attempt
/// shuts down, it reports the attempt as cancelled.
struct CompletionGuard<F>
where
    F: FnOnce(Result<TcpStream, ConnectError>),
{
    shared: Arc<AttemptShared>,
    on_complete: Option<F>,
}

impl<F> CompletionGuard<F>
where
    F: FnOnce(Result<TcpStream, ConnectError>),
{
    fn new(shared: Arc<AttemptShared>, on_complete: F) -> Self {
        Self {
            shared,
            on_complete: Some(on_complete),
        }
    }

    fn complete(mut self, result: Result<TcpStream, ConnectError>) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(result);
        }
    }
}

impl<F> Drop for CompletionGuard<F>
where
    F: FnOnce(Result<TcpStream, ConnectError>),
{
    fn drop(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            let result = self
                .shared
                .finish(Err(ConnectError::cancelled().with_context("attempt task dropped")));
            tracing::debug!(state = %self.shared.state(), "async connect: task dropped before completion");
            on_complete(result);
        }
    }
}

async fn within<Fut>(deadline: &Deadline, future: Fut) -> Result<TcpStream, ConnectError>
where
    Fut: Future<Output = Result<TcpStream, ConnectError>>,
{
    match deadline.expires_at() {
        Some(at) => match tokio::time::timeout_at(at.into(), future).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ConnectError::timeout()),
        },
        None => future.await,
    }
}

async fn establish<C, P>(
    connector: &Connector<C, P>,
    request: &ConnectRequest,
    shared: &AttemptShared,
) -> Result<TcpStream, ConnectError>
where
    C: RawConnector,
    P: ProxySettings,
{
    shared.advance(AttemptState::RawConnecting);

    let config = connector.proxy_config();
    let resolved = route::resolve(request.host(), request.port()).await;
    match Route::plan(&config, request.host(), request.port(), resolved)? {
        Route::Direct(addr) => connector.raw_connect(addr).await,
        Route::Proxied {
            proxy_host,
            proxy_port,
            transaction,
        } => {
            let proxy_ip = route::resolve(&proxy_host, proxy_port)
                .await
                .map_err(|err| ConnectError::transport(err).with_context("resolve proxy"))?;
            let stream = connector
                .raw_connect(SocketAddr::new(proxy_ip, proxy_port))
                .await?;

            shared.advance(AttemptState::Handshaking);
            Ok(handshake(stream, transaction).await?)
        }
    }
}

#[derive(Debug, Clone)]
/// Handle to a submitted [`AsyncConnectionAttempt`].
pub struct AttemptHandle {
    ticket: Ticket,
    admission: AdmissionController,
    shared: Arc<AttemptShared>,
}

impl AttemptHandle {
    /// The admission ticket of the attempt.
    #[must_use]
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// The current state of the attempt.
    #[must_use]
    pub fn state(&self) -> AttemptState {
        self.shared.state()
    }

    /// Cancel the attempt.
    ///
    /// A queued attempt is withdrawn and its callback never invoked. An
    /// attempt in flight has its transport closed, its slot released and its
    /// callback invoked with a cancellation error. Returns `false` if the
    /// attempt had already finished.
    pub fn cancel(&self) -> bool {
        if self.admission.cancel(self.ticket) == CancelOutcome::Removed {
            *self.shared.state.lock() = AttemptState::Cancelled;
            tracing::trace!(ticket = %self.ticket, "async connect: cancelled while queued");
            return true;
        }

        let state = self.shared.state.lock();
        if state.is_terminal() {
            return false;
        }
        self.shared.cancel.cancel();
        tracing::trace!(ticket = %self.ticket, state = %*state, "async connect: cancelled in flight");
        true
    }
}

/// Future resolving to the outcome of an [`AsyncConnectionAttempt`],
/// returned by [`Connector::connect`].
///
/// Resolves with a cancellation error if the attempt is cancelled,
/// including while it is still queued.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Completion {
    rx: oneshot::Receiver<Result<TcpStream, ConnectError>>,
    handle: AttemptHandle,
}

impl Completion {
    pub(super) fn new(rx: oneshot::Receiver<Result<TcpStream, ConnectError>>, handle: AttemptHandle) -> Self {
        Self { rx, handle }
    }

    /// The handle of the attempt this completion belongs to.
    pub fn handle(&self) -> &AttemptHandle {
        &self.handle
    }
}

impl Future for Completion {
    type Output = Result<TcpStream, ConnectError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(result) => result,
            Err(_closed) => Err(ConnectError::cancelled()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectErrorKind;

    #[test]
    fn cancel_wins_over_failure() {
        let shared = AttemptShared::new();
        shared.advance(AttemptState::Handshaking);
        shared.cancel.cancel();

        let err = shared.finish(Err(ConnectError::timeout())).unwrap_err();
        assert_eq!(err.kind(), ConnectErrorKind::Cancelled);
        assert_eq!(shared.state(), AttemptState::Cancelled);
    }

    #[test]
    fn dropped_guard_completes_as_cancelled() {
        let shared = Arc::new(AttemptShared::new());
        shared.advance(AttemptState::RawConnecting);

        let outcome = Arc::new(Mutex::new(None));
        let seen = outcome.clone();
        drop(CompletionGuard::new(shared.clone(), move |result| {
            *seen.lock() = Some(result.map(drop));
        }));

        let err = outcome.lock().take().unwrap().unwrap_err();
        assert_eq!(err.kind(), ConnectErrorKind::Cancelled);
        assert_eq!(shared.state(), AttemptState::Cancelled);
    }

    #[test]
    fn completed_guard_reports_once() {
        let shared = Arc::new(AttemptShared::new());
        let calls = Arc::new(Mutex::new(0));
        let counted = calls.clone();
        let guard = CompletionGuard::new(shared, move |result: Result<TcpStream, ConnectError>| {
            assert!(result.unwrap_err().is_timeout());
            *counted.lock() += 1;
        });
        guard.complete(Err(ConnectError::timeout()));
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn failure_without_cancel_is_kept() {
        let shared = AttemptShared::new();
        shared.advance(AttemptState::RawConnecting);

        let err = shared.finish(Err(ConnectError::timeout())).unwrap_err();
        assert_eq!(err.kind(), ConnectErrorKind::Timeout);
        assert_eq!(shared.state(), AttemptState::Failed);
    }
}
