//! [`tower::Service`] adapters over a [`Mediator`].
//!
//! These let a mediator sit behind tower middleware (rate limits, load
//! shedding, buffering) or be driven by anything that speaks `Service`.

use std::fmt;
use std::marker::PhantomData;
use std::task::{Context, Poll};

use courier_core::{BoxFuture, DispatchError, DispatchResult, Notification, Request};
use tower::Service;

use crate::mediator::Mediator;

/// Sends requests of type `R`. Always ready.
pub struct RequestService<R> {
    mediator: Mediator,
    _request: PhantomData<fn(R)>,
}

impl<R> RequestService<R> {
    pub(crate) fn new(mediator: Mediator) -> Self {
        Self {
            mediator,
            _request: PhantomData,
        }
    }
}

impl<R> Clone for RequestService<R> {
    fn clone(&self) -> Self {
        Self::new(self.mediator.clone())
    }
}

impl<R> fmt::Debug for RequestService<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestService")
            .field("request", &std::any::type_name::<R>())
            .finish()
    }
}

impl<R: Request> Service<R> for RequestService<R> {
    type Response = R::Response;
    type Error = DispatchError;
    type Future = BoxFuture<'static, DispatchResult<R::Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: R) -> Self::Future {
        let mediator = self.mediator.clone();
        Box::pin(async move { mediator.send(request).await })
    }
}

/// Publishes notifications of type `N`. Always ready.
pub struct PublishService<N> {
    mediator: Mediator,
    _notification: PhantomData<fn(N)>,
}

impl<N> PublishService<N> {
    pub(crate) fn new(mediator: Mediator) -> Self {
        Self {
            mediator,
            _notification: PhantomData,
        }
    }
}

impl<N> Clone for PublishService<N> {
    fn clone(&self) -> Self {
        Self::new(self.mediator.clone())
    }
}

impl<N> fmt::Debug for PublishService<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishService")
            .field("notification", &std::any::type_name::<N>())
            .finish()
    }
}

impl<N: Notification> Service<N> for PublishService<N> {
    type Response = ();
    type Error = DispatchError;
    type Future = BoxFuture<'static, DispatchResult<()>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, notification: N) -> Self::Future {
        let mediator = self.mediator.clone();
        Box::pin(async move { mediator.publish(notification).await })
    }
}
