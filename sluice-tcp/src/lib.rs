//! Admission-controlled, proxy-transparent TCP connect for sluice.
//!
//! The [`client::Connector`] is the entry point: it bounds how many
//! connection attempts are in flight, queues the excess in FIFO order and
//! tunnels each connection through the configured proxy (if any), both
//! from blocking threads and from async tasks.
//!
//! # Example
//!
//! ```no_run
//! use sluice_core::admission::AdmissionController;
//! use sluice_proxy::ProxyConfig;
//! use sluice_tcp::client::{ConnectRequest, Connector};
//! use std::time::Duration;
//!
//! let connector = Connector::new()
//!     .with_proxy_settings(ProxyConfig::socks5("127.0.0.1", 1080))
//!     .with_admission(AdmissionController::bounded(8));
//!
//! let stream = connector
//!     .connect_blocking(ConnectRequest::soft("example.com", 80, Duration::from_secs(10)))
//!     .unwrap();
//! # drop(stream);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

pub mod client;

mod error;
#[doc(inline)]
pub use error::{ConnectError, ConnectErrorKind};
