use tokio::runtime::Handle;

/// Future executor that utilises `tokio` threads.
///
/// An executor can be pinned to a specific runtime [`Handle`],
/// which allows tasks to be spawned from threads that are
/// not driven by a tokio runtime themselves (e.g. a blocking
/// caller releasing an admission slot).
#[derive(Default, Debug, Clone)]
pub struct Executor {
    handle: Option<Handle>,
}

impl Executor {
    /// Create a new [`Executor`] which spawns on the ambient runtime.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Create a new [`Executor`] pinned to the given runtime handle.
    #[must_use]
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// Create a new [`Executor`] pinned to the runtime of the caller,
    /// falling back to the ambient runtime if there is none.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: Handle::try_current().ok(),
        }
    }

    /// Spawn a future on this executor.
    ///
    /// An executor without a pinned handle spawns on the ambient
    /// runtime and therefore has to be used from within one.
    pub fn spawn_task<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future<Output: Send + 'static> + Send + 'static,
    {
        match &self.handle {
            Some(handle) => handle.spawn(future),
            None => tokio::spawn(future),
        }
    }

    /// Get a reference to the pinned runtime handle, if any.
    #[must_use]
    pub fn handle(&self) -> Option<&Handle> {
        self.handle.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinned_executor_spawns_from_plain_thread() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let executor = Executor::with_handle(rt.handle().clone());

        let task = std::thread::spawn(move || executor.spawn_task(async { 21 * 2 }))
            .join()
            .unwrap();

        assert_eq!(rt.block_on(task).unwrap(), 42);
    }

    #[tokio::test]
    async fn current_executor_captures_runtime() {
        let executor = Executor::current();
        assert!(executor.handle().is_some());
        assert_eq!(executor.spawn_task(async { 1 }).await.unwrap(), 1);
    }

    #[test]
    fn current_executor_outside_runtime() {
        assert!(Executor::current().handle().is_none());
    }
}
