//! Admission-controlled, proxy-transparent outbound TCP connections.
//!
//! Sluice opens outbound TCP connections on behalf of its callers while:
//!
//! - bounding how many connection attempts are in flight at once, queueing
//!   the excess in FIFO order ([`admission`]);
//! - tunneling each connection through the configured HTTP CONNECT, SOCKS4
//!   or SOCKS5 proxy, if any ([`proxy`]);
//! - offering both a blocking and a non-blocking (async) entry point,
//!   backed by the one admission algorithm ([`tcp`]).
//!
//! # Example
//!
//! ```no_run
//! use sluice::admission::AdmissionController;
//! use sluice::proxy::ProxyConfig;
//! use sluice::tcp::client::{ConnectRequest, Connector};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), sluice::tcp::ConnectError> {
//! let connector = Connector::new()
//!     .with_proxy_settings(ProxyConfig::http("proxy.internal", 3128).with_credentials("john", "secret"))
//!     .with_admission(AdmissionController::bounded(8));
//!
//! let stream = connector
//!     .connect(ConnectRequest::hard("example.com", 443, Duration::from_secs(10)))?
//!     .await?;
//! # drop(stream);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

#[doc(inline)]
pub use ::sluice_core::{admission, error, rt, telemetry};

pub mod utils {
    //! Utilities shared by the sluice crates.

    #[doc(inline)]
    pub use ::sluice_utils::*;
}

pub mod proxy {
    //! Proxy configuration, wire frames and handshakes.

    #[doc(inline)]
    pub use ::sluice_proxy::*;
}

pub mod tcp {
    //! Admission-controlled TCP connect.

    #[doc(inline)]
    pub use ::sluice_tcp::*;
}
