use super::{AdmissionError, AdmissionPermit};
use crate::telemetry::tracing;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Identifies a single request made to an [`AdmissionController`].
pub struct Ticket(u64);

impl Ticket {
    /// The raw ticket number, unique per controller.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
/// Maximum number of attempts an [`AdmissionController`] admits at once.
pub enum AdmissionLimit {
    /// At most this many attempts are admitted at once.
    Bounded(usize),
    #[default]
    /// Every attempt is admitted immediately.
    Unlimited,
}

impl AdmissionLimit {
    /// The limit as a number, [`usize::MAX`] for [`AdmissionLimit::Unlimited`].
    #[must_use]
    pub fn max_allowed(self) -> usize {
        match self {
            Self::Bounded(max) => max,
            Self::Unlimited => usize::MAX,
        }
    }
}

/// A request waiting for (or receiving) an admission slot.
///
/// Implemented for any `FnOnce(AdmissionPermit)` closure.
pub trait Dispatch: Send + 'static {
    /// Start the admitted request, it owns the slot via `permit`.
    fn dispatch(self: Box<Self>, permit: AdmissionPermit);

    /// The request was dropped from the wait list
    /// because the controller was closed.
    fn reject(self: Box<Self>) {}
}

impl<F> Dispatch for F
where
    F: FnOnce(AdmissionPermit) + Send + 'static,
{
    fn dispatch(self: Box<Self>, permit: AdmissionPermit) {
        (*self)(permit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Outcome of [`AdmissionController::enqueue_or_admit`].
pub enum Admission {
    /// A slot was free, the request has already been dispatched.
    Admitted(Ticket),
    /// The request was appended to the wait list.
    Queued(Ticket),
}

impl Admission {
    /// The ticket identifying the request.
    #[must_use]
    pub fn ticket(&self) -> Ticket {
        match self {
            Self::Admitted(ticket) | Self::Queued(ticket) => *ticket,
        }
    }

    /// Whether the request is waiting for a slot.
    #[must_use]
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Outcome of [`AdmissionController::cancel`].
pub enum CancelOutcome {
    /// The request was still waiting and is removed,
    /// it will never be dispatched.
    Removed,
    /// The request is not waiting (anymore): it was admitted already,
    /// or is unknown to this controller.
    AlreadyStarted,
}

/// Bounds how many connection attempts are in flight at once.
///
/// Cloning the controller is cheap and shares the same pool.
#[derive(Clone)]
pub struct AdmissionController {
    shared: Arc<AdmissionShared>,
}

pub(super) struct AdmissionShared {
    max: usize,
    next_ticket: AtomicU64,
    state: Mutex<AdmissionState>,
}

struct AdmissionState {
    active: usize,
    waiting: VecDeque<Waiting>,
    closed: bool,
}

struct Waiting {
    ticket: Ticket,
    request: Box<dyn Dispatch>,
}

/// Grant delivery for a thread blocked in [`AdmissionController::acquire_blocking`].
struct BlockingWaiter(flume::Sender<AdmissionPermit>);

impl Dispatch for BlockingWaiter {
    fn dispatch(self: Box<Self>, permit: AdmissionPermit) {
        // bounded(1) with a single grant: never full,
        // a disconnected waiter drops (and thus releases) the permit
        if let Err(err) = self.0.try_send(permit) {
            drop(err.into_inner());
        }
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(AdmissionLimit::default())
    }
}

impl AdmissionController {
    /// Create a new [`AdmissionController`] for the given limit.
    #[must_use]
    pub fn new(limit: AdmissionLimit) -> Self {
        Self {
            shared: Arc::new(AdmissionShared {
                max: limit.max_allowed(),
                next_ticket: AtomicU64::new(1),
                state: Mutex::new(AdmissionState {
                    active: 0,
                    waiting: VecDeque::new(),
                    closed: false,
                }),
            }),
        }
    }

    /// Create a new [`AdmissionController`] admitting at most `max` attempts at once.
    #[must_use]
    pub fn bounded(max: usize) -> Self {
        Self::new(AdmissionLimit::Bounded(max))
    }

    /// Create a new [`AdmissionController`] admitting every attempt immediately.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(AdmissionLimit::Unlimited)
    }

    /// Maximum number of attempts admitted at once.
    #[must_use]
    pub fn max_allowed(&self) -> usize {
        self.shared.max
    }

    /// Number of attempts currently admitted.
    #[must_use]
    pub fn active(&self) -> usize {
        self.shared.state.lock().active
    }

    /// Number of requests waiting for a slot.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.shared.state.lock().waiting.len()
    }

    /// Whether [`AdmissionController::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Admit the request right away if a slot is free,
    /// otherwise append it to the FIFO wait list.
    ///
    /// An admitted request is dispatched on the calling thread
    /// before this function returns. A queued request is dispatched
    /// on the thread which releases the slot it is granted.
    pub fn enqueue_or_admit<D: Dispatch>(&self, request: D) -> Result<Admission, AdmissionError> {
        let ticket = Ticket(self.shared.next_ticket.fetch_add(1, Ordering::Relaxed));
        let request: Box<dyn Dispatch> = Box::new(request);

        let mut state = self.shared.state.lock();
        if state.closed {
            drop(state);
            tracing::trace!(%ticket, "admission: refused, controller closed");
            return Err(AdmissionError::Cancelled);
        }

        if state.active < self.shared.max {
            state.active += 1;
            let active = state.active;
            drop(state);

            tracing::trace!(%ticket, active, "admission: admitted");
            request.dispatch(AdmissionPermit::new(self.shared.clone(), ticket));
            Ok(Admission::Admitted(ticket))
        } else {
            state.waiting.push_back(Waiting { ticket, request });
            let waiting = state.waiting.len();
            drop(state);

            tracing::trace!(%ticket, waiting, "admission: queued");
            Ok(Admission::Queued(ticket))
        }
    }

    /// Block the current thread until a slot is granted.
    ///
    /// `None` waits without a bound. Once `timeout` elapses the request
    /// is withdrawn from the wait list, a grant racing with the timeout
    /// is given back right away, so no slot is ever leaked.
    ///
    /// This must not be called from within an async context.
    pub fn acquire_blocking(&self, timeout: Option<Duration>) -> Result<AdmissionPermit, AdmissionError> {
        let (tx, rx) = flume::bounded(1);
        let ticket = match self.enqueue_or_admit(BlockingWaiter(tx))? {
            Admission::Admitted(_) => {
                return rx
                    .try_recv()
                    .map_err(|_disconnected| AdmissionError::Cancelled);
            }
            Admission::Queued(ticket) => ticket,
        };

        let result = match timeout {
            Some(timeout) => rx.recv_timeout(timeout),
            None => rx
                .recv()
                .map_err(|flume::RecvError::Disconnected| flume::RecvTimeoutError::Disconnected),
        };

        match result {
            Ok(permit) => Ok(permit),
            Err(flume::RecvTimeoutError::Disconnected) => Err(AdmissionError::Cancelled),
            Err(flume::RecvTimeoutError::Timeout) => {
                if self.cancel(ticket) == CancelOutcome::AlreadyStarted {
                    // granted right at the deadline: hand the slot back
                    if let Ok(permit) = rx.recv() {
                        tracing::trace!(%ticket, "admission: late grant returned after timeout");
                        drop(permit);
                    }
                }
                Err(AdmissionError::Timeout)
            }
        }
    }

    /// Withdraw a waiting request.
    ///
    /// A removed request is dropped without ever being dispatched or rejected.
    pub fn cancel(&self, ticket: Ticket) -> CancelOutcome {
        let mut state = self.shared.state.lock();
        let Some(index) = state.waiting.iter().position(|w| w.ticket == ticket) else {
            return CancelOutcome::AlreadyStarted;
        };
        let removed = state.waiting.remove(index);
        drop(state);

        tracing::trace!(%ticket, "admission: queued request cancelled");
        drop(removed);
        CancelOutcome::Removed
    }

    /// Close the controller.
    ///
    /// All waiting requests are rejected and future requests refused.
    /// Slots held by already admitted attempts are released as usual.
    pub fn close(&self) {
        let rejected: Vec<Waiting> = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.waiting.drain(..).collect()
        };

        tracing::debug!(rejected = rejected.len(), "admission: controller closed");
        for waiting in rejected {
            waiting.request.reject();
        }
    }
}

impl AdmissionShared {
    pub(super) fn release(self: &Arc<Self>, ticket: Ticket) {
        let mut ready = Vec::new();
        let (active, waiting) = {
            let mut state = self.state.lock();
            debug_assert!(state.active > 0, "release without admitted attempt");
            state.active = state.active.saturating_sub(1);
            while state.active < self.max
                && let Some(next) = state.waiting.pop_front()
            {
                state.active += 1;
                ready.push(next);
            }
            (state.active, state.waiting.len())
        };

        tracing::trace!(
            %ticket,
            active,
            waiting,
            dispatched = ready.len(),
            "admission: slot released",
        );

        for Waiting { ticket, request } in ready {
            request.dispatch(AdmissionPermit::new(self.clone(), ticket));
        }
    }
}

impl fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("AdmissionController")
            .field("max", &self.shared.max)
            .field("active", &state.active)
            .field("waiting", &state.waiting.len())
            .field("closed", &state.closed)
            .finish()
    }
}
