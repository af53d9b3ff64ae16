//! Logical requests and the invoke collaborator.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use uuid::Uuid;

use crate::catalog::RoutingMethod;
use crate::error::ClassifiedError;
use crate::routing::RetryTarget;

/// One logical request.
#[derive(Debug)]
pub struct Request<P> {
    pub id: String,
    pub payload: Arc<P>,
    /// Overall time allowed, measured from the moment execution starts.
    pub timeout: Option<Duration>,
}

impl<P> Request<P> {
    pub fn new(id: impl Into<String>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload: Arc::new(payload),
            timeout: None,
        }
    }

    /// Request with a random v4 UUID as id.
    pub fn with_generated_id(payload: P) -> Self {
        Self::new(Uuid::new_v4().to_string(), payload)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<P> Clone for Request<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            payload: Arc::clone(&self.payload),
            timeout: self.timeout,
        }
    }
}

/// The remote call the engine drives.
///
/// Implementations classify their own failures; the engine never inspects
/// transport details. The returned future must own what it needs.
pub trait Invoker: Send + Sync + 'static {
    type Payload: Send + Sync + 'static;
    type Response: Send + 'static;

    fn invoke(
        &self,
        target: &RetryTarget,
        method: &RoutingMethod,
        payload: Arc<Self::Payload>,
    ) -> BoxFuture<'static, Result<Self::Response, ClassifiedError>>;
}

/// Closure-backed invoker, see [`invoker_fn`].
pub struct FnInvoker<P, R, F> {
    f: F,
    _types: PhantomData<fn(P) -> R>,
}

/// Wrap an async closure as an [`Invoker`].
pub fn invoker_fn<P, R, F, Fut>(f: F) -> FnInvoker<P, R, F>
where
    F: Fn(RetryTarget, RoutingMethod, Arc<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ClassifiedError>> + Send + 'static,
{
    FnInvoker {
        f,
        _types: PhantomData,
    }
}

impl<P, R, F, Fut> Invoker for FnInvoker<P, R, F>
where
    P: Send + Sync + 'static,
    R: Send + 'static,
    F: Fn(RetryTarget, RoutingMethod, Arc<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ClassifiedError>> + Send + 'static,
{
    type Payload = P;
    type Response = R;

    fn invoke(
        &self,
        target: &RetryTarget,
        method: &RoutingMethod,
        payload: Arc<P>,
    ) -> BoxFuture<'static, Result<R, ClassifiedError>> {
        (self.f)(target.clone(), method.clone(), payload).boxed()
    }
}
