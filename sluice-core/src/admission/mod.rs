//! Admission control for outbound connection attempts.
//!
//! An [`AdmissionController`] bounds how many connection attempts may be
//! between "admitted" and "terminal" at any point in time. Callers either:
//!
//! - block the current thread until a slot frees up ([`AdmissionController::acquire_blocking`]), or
//! - register a [`Dispatch`] which is invoked with an [`AdmissionPermit`] as soon
//!   as a slot is available ([`AdmissionController::enqueue_or_admit`]).
//!
//! Both styles share one counter and one wait list, the blocking style
//! being a thin wrapper which enqueues a channel sender and waits on it.
//! Queued requests are dispatched in FIFO order. No ordering is promised
//! between requests queued in different styles beyond that.
//!
//! A slot is released when its [`AdmissionPermit`] is released or dropped,
//! which can happen only once per permit.

use std::fmt;

mod controller;
#[doc(inline)]
pub use controller::{Admission, AdmissionController, AdmissionLimit, CancelOutcome, Dispatch, Ticket};

mod permit;
#[doc(inline)]
pub use permit::AdmissionPermit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Error returned when admission could not be granted.
pub enum AdmissionError {
    /// No slot became available within the given timeout.
    Timeout,
    /// The controller was closed while (or before) waiting.
    Cancelled,
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("admission: timed out waiting for a connection slot"),
            Self::Cancelled => f.write_str("admission: cancelled while waiting for a connection slot"),
        }
    }
}

impl std::error::Error for AdmissionError {}
