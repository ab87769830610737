//! Core crate for sluice.
//!
//! `sluice-core` hosts the pieces every other sluice crate builds upon:
//!
//! - [`error`]: boxed and opaque errors plus context extensions;
//! - [`telemetry`]: the `tracing` facade used for all logging;
//! - [`rt`]: the tokio [`Executor`](rt::Executor) async attempts are spawned on;
//! - [`admission`]: the [`AdmissionController`](admission::AdmissionController)
//!   bounding how many connection attempts are in flight.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

pub mod admission;
pub mod error;
pub mod rt;
pub mod telemetry;
