//! Module Bodies
//!
//! A module body is the callable the external linker hands us for each
//! module: run once, possibly awaiting asynchronous work at top level, and
//! finishing with `Ok` or a [`BodyError`].
//!
//! # Single-Threaded Model
//!
//! Evaluation is cooperative on one thread, so bodies are `LocalBoxFuture`s
//! and need not be `Send`. A body that captures thread-local host state is
//! perfectly legal.

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use std::future::Future;

use crate::error::BodyError;

/// The in-flight form of a module body.
pub type BodyFuture = LocalBoxFuture<'static, Result<(), BodyError>>;

/// A not-yet-started module body.
///
/// Wraps the host's callable so the evaluator can defer construction of the
/// body future until every dependency has completed.
pub struct ModuleBody(Box<dyn FnOnce() -> BodyFuture>);

impl ModuleBody {
    /// Create a body from an async callable.
    ///
    /// The callable runs when the module starts, after its dependencies
    /// have evaluated. Any `.await` inside it is a top-level wait point.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<(), BodyError>> + 'static,
    {
        Self(Box::new(move || f().boxed_local()))
    }

    /// Create a body from a synchronous callable.
    ///
    /// Such a body has no wait points and always takes the synchronous
    /// fast path through the evaluator.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), BodyError> + 'static,
    {
        Self::new(move || async move { f() })
    }

    /// A body with no statements.
    pub fn empty() -> Self {
        Self::from_fn(|| Ok(()))
    }

    /// Start the body, producing the future the evaluator drives.
    pub(crate) fn into_future(self) -> BodyFuture {
        (self.0)()
    }
}

impl std::fmt::Debug for ModuleBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ModuleBody")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::task::noop_waker;
    use std::task::{Context, Poll};

    #[test]
    fn sync_body_completes_on_first_poll() {
        let body = ModuleBody::from_fn(|| Ok(()));
        let mut fut = body.into_future();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(matches!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(()))));
    }

    #[test]
    fn failing_body_reports_error() {
        let body = ModuleBody::from_fn(|| Err(BodyError::msg("bad import")));
        let mut fut = body.into_future();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(Err(err)) => assert_eq!(err.to_string(), "bad import"),
            other => panic!("expected immediate failure, got {other:?}"),
        }
    }

    #[test]
    fn async_body_suspends_until_woken() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let body = ModuleBody::new(move || async move {
            rx.await.map_err(BodyError::new)?;
            Ok(())
        });
        let mut fut = body.into_future();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        assert!(fut.as_mut().poll(&mut cx).is_pending());
        tx.send(()).unwrap();
        assert!(matches!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(()))));
    }
}
