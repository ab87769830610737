//! Sluice TCP client module.
//!
//! A [`Connector`] opens outbound TCP connections, optionally through
//! an HTTP CONNECT, SOCKS4 or SOCKS5 proxy, while bounding how many
//! attempts are in flight through an
//! [`AdmissionController`](sluice_core::admission::AdmissionController).

use crate::ConnectError;
use sluice_utils::time::Deadline;
use std::time::Duration;

mod connect;
#[doc(inline)]
pub use connect::{DenyRawConnector, RawConnectDenied, RawConnector};

mod request;
#[doc(inline)]
pub use request::{ConnectRequest, TimeoutPolicy};

mod route;

mod blocking;
#[doc(inline)]
pub use blocking::BlockingConnectionAttempt;

mod attempt;
#[doc(inline)]
pub use attempt::{AsyncConnectionAttempt, AttemptHandle, AttemptState, Completion};

mod connector;
#[doc(inline)]
pub use connector::Connector;

mod config;
#[doc(inline)]
pub use config::ConnectorConfig;

/// What is left of the budget, `Ok(None)` if unbounded.
fn remaining_budget(deadline: &Deadline) -> Result<Option<Duration>, ConnectError> {
    match deadline.remaining() {
        Some(left) if left.is_zero() => Err(ConnectError::timeout().with_context("budget exhausted")),
        left => Ok(left),
    }
}
