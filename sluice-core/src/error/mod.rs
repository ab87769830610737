//! Error utilities for sluice.
//!
//! Errors a caller is expected to act upon are concrete types, such as the
//! connect error kinds of `sluice-tcp`. Everything else travels as a
//! [`BoxError`], or as an [`OpaqueError`] where a sized type is needed.
//!
//! [`ErrorContext`] and [`ErrorExt`] prefix an error with what was being done:
//!
//! ```
//! use sluice_core::error::ErrorContext;
//!
//! let result = "80x".parse::<u16>().context("parse port");
//! assert_eq!("parse port: invalid digit found in string", result.unwrap_err().to_string());
//! ```

use std::fmt::{self, Debug, Display};

mod context;
pub use context::{ErrorContext, ErrorExt};

/// Alias for a type-erased error type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[repr(transparent)]
/// A sized, type-erased error.
pub struct OpaqueError(BoxError);

impl OpaqueError {
    /// Wrap an std error.
    pub fn from_std(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(error))
    }

    /// Create an error which displays as `msg`.
    pub fn from_display(msg: impl Display + Debug + Send + Sync + 'static) -> Self {
        Self::from_std(MessageError(msg))
    }

    /// Unwrap into the inner [`BoxError`].
    #[must_use]
    pub fn into_boxed(self) -> BoxError {
        self.0
    }
}

impl Debug for OpaqueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for OpaqueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for OpaqueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<BoxError> for OpaqueError {
    fn from(error: BoxError) -> Self {
        Self(error)
    }
}

struct MessageError<M>(M);

impl<M: Debug> Debug for MessageError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<M: Display> Display for MessageError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<M: Display + Debug> std::error::Error for MessageError<M> {}
