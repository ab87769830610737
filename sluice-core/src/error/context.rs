use super::OpaqueError;
use std::fmt::{self, Debug, Display};

/// Prefix the error of a `Result`, or the absence of a value in an `Option`,
/// with a context message.
pub trait ErrorContext: sealed::SealedContext {
    /// What the context is added to.
    type Context;

    /// Add `context` to the contained error.
    fn context<M>(self, context: M) -> Self::Context
    where
        M: Display + Send + Sync + 'static;

    /// Add a context computed only on failure.
    fn with_context<M, F>(self, context: F) -> Self::Context
    where
        M: Display + Send + Sync + 'static,
        F: FnOnce() -> M;
}

impl<T, E> ErrorContext for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    type Context = Result<T, OpaqueError>;

    fn context<M>(self, context: M) -> Self::Context
    where
        M: Display + Send + Sync + 'static,
    {
        self.map_err(|error| error.context(context))
    }

    fn with_context<M, F>(self, context: F) -> Self::Context
    where
        M: Display + Send + Sync + 'static,
        F: FnOnce() -> M,
    {
        self.map_err(|error| error.context(context()))
    }
}

impl<T> ErrorContext for Option<T> {
    type Context = Result<T, OpaqueError>;

    fn context<M>(self, context: M) -> Self::Context
    where
        M: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| OpaqueError::from_display(context.to_string()))
    }

    fn with_context<M, F>(self, context: F) -> Self::Context
    where
        M: Display + Send + Sync + 'static,
        F: FnOnce() -> M,
    {
        self.ok_or_else(|| OpaqueError::from_display(context().to_string()))
    }
}

/// Extends std errors with [`ErrorExt::context`].
pub trait ErrorExt: sealed::SealedExt {
    /// Wrap the error, displayed as `"{context}: {error}"`.
    fn context<M>(self, context: M) -> OpaqueError
    where
        M: Display + Send + Sync + 'static;
}

impl<E: std::error::Error + Send + Sync + 'static> ErrorExt for E {
    fn context<M>(self, context: M) -> OpaqueError
    where
        M: Display + Send + Sync + 'static,
    {
        OpaqueError::from_std(WithContext { context, error: self })
    }
}

struct WithContext<M, E> {
    context: M,
    error: E,
}

impl<M: Display, E: Debug> Debug for WithContext<M, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.context, self.error)
    }
}

impl<M: Display, E: Display> Display for WithContext<M, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.error)
    }
}

impl<M: Display, E: std::error::Error + 'static> std::error::Error for WithContext<M, E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

mod sealed {
    pub trait SealedContext {}

    impl<T, E> SealedContext for Result<T, E> where E: std::error::Error + Send + Sync + 'static {}
    impl<T> SealedContext for Option<T> {}

    pub trait SealedExt {}

    impl<E: std::error::Error + Send + Sync + 'static> SealedExt for E {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn result_context() {
        let result: Result<(), _> = Err(io::Error::other("connection refused"));
        let error = result.context("connect proxy").unwrap_err();
        assert_eq!(error.to_string(), "connect proxy: connection refused");
    }

    #[test]
    fn result_context_is_lazy() {
        let mut called = false;
        let ok: Result<u8, io::Error> = Ok(1);
        assert_eq!(
            ok.with_context(|| {
                called = true;
                "never"
            })
            .unwrap(),
            1
        );
        assert!(!called);

        let result: Result<(), _> = Err(io::Error::other("refused"));
        let error = result.with_context(|| format!("dial port {}", 1080)).unwrap_err();
        assert_eq!(error.to_string(), "dial port 1080: refused");
    }

    #[test]
    fn option_context() {
        let missing: Option<u16> = None;
        assert_eq!(missing.context("missing port").unwrap_err().to_string(), "missing port");
        assert_eq!(Some(80u16).context("missing port").unwrap(), 80);
    }

    #[test]
    fn context_keeps_source() {
        let error = io::Error::other("eof").context("read reply");
        let source = std::error::Error::source(&error).unwrap();
        assert_eq!(source.to_string(), "eof");
    }
}
