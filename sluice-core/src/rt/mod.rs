//! Runtime utilities used by sluice.

mod executor;
#[doc(inline)]
pub use executor::Executor;
