//! Opaque storage handles and scoped acquisition.

use std::future::Future;
use std::sync::Arc;

use rf_domain::error::Result;

use crate::context::ExecutionContext;

/// A storage resource (database session, connection lease, ...) that a
/// context may carry.  Runfence never inspects it; it only closes it when
/// a scope created by [`with_storage_scope`] ends.
#[async_trait::async_trait]
pub trait StorageHandle: Send + Sync + 'static {
    /// Release the underlying resource.  Must tolerate repeated calls.
    async fn close(&self) -> Result<()>;
}

/// Attach `handle` to a copy of `ctx`, run `body` with it, then close the
/// handle whether `body` succeeded or failed.
///
/// A failure to close is logged and does not mask the body's result.
pub async fn with_storage_scope<F, Fut, T>(
    ctx: &ExecutionContext,
    handle: Arc<dyn StorageHandle>,
    body: F,
) -> Result<T>
where
    F: FnOnce(ExecutionContext) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let scoped = ctx.with_storage_handle(handle.clone());
    let correlation_id = scoped.correlation_id();

    let outcome = body(scoped).await;

    if let Err(e) = handle.close().await {
        tracing::warn!(
            correlation_id = %correlation_id,
            error = %e,
            "failed to close storage handle"
        );
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rf_domain::error::Error;

    #[derive(Default)]
    struct CountingHandle {
        closes: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl StorageHandle for CountingHandle {
        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BrokenHandle;

    #[async_trait::async_trait]
    impl StorageHandle for BrokenHandle {
        async fn close(&self) -> Result<()> {
            Err(Error::Other("connection already gone".into()))
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("u1", "t1", "r1").unwrap()
    }

    #[tokio::test]
    async fn body_sees_handle_and_handle_is_closed() {
        let handle = Arc::new(CountingHandle::default());
        let base = ctx();

        let seen = with_storage_scope(&base, handle.clone(), |scoped| async move {
            Ok(scoped.has_storage_handle())
        })
        .await
        .unwrap();

        assert!(seen);
        assert!(!base.has_storage_handle());
        assert_eq!(handle.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handle_closed_when_body_fails() {
        let handle = Arc::new(CountingHandle::default());

        let result: Result<()> = with_storage_scope(&ctx(), handle.clone(), |_| async {
            Err(Error::Other("query failed".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(handle.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_failure_does_not_mask_result() {
        let out = with_storage_scope(&ctx(), Arc::new(BrokenHandle), |_| async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(out, 7);
    }
}
