use std::ops::Deref;
use std::sync::Arc;

use crate::dispatcher::RequestScopedDispatcher;

/// Guard returned by `DispatcherFactory::create_scoped`.
///
/// Dropping the guard runs [`RequestScopedDispatcher::cleanup`], so the
/// user's slot is released on every exit path: normal return, `?`, panic
/// unwinding, or the owning task being dropped mid-await.
pub struct ScopedDispatcher {
    inner: Arc<RequestScopedDispatcher>,
}

impl ScopedDispatcher {
    pub(crate) fn new(inner: Arc<RequestScopedDispatcher>) -> Self {
        Self { inner }
    }

    /// A shared handle to the dispatcher.  Cleanup still happens when the
    /// guard drops, whoever else holds a handle.
    pub fn handle(&self) -> Arc<RequestScopedDispatcher> {
        self.inner.clone()
    }
}

impl Deref for ScopedDispatcher {
    type Target = RequestScopedDispatcher;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Drop for ScopedDispatcher {
    fn drop(&mut self) {
        self.inner.cleanup();
    }
}
