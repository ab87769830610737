//! Telemetry facade.
//!
//! All sluice crates log through [`tracing`], re-exported here so
//! downstream crates and users share a single version of it.

pub mod tracing {
    //! Re-export of the [`tracing`](https://docs.rs/tracing) crate.

    #[doc(inline)]
    pub use ::tracing::*;
}
