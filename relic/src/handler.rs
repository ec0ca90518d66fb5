//! Handler plumbing: closures as handlers, and type erasure for storing
//! heterogeneous handlers in routers.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use relic_handler::Handler;

use crate::context::Context;
use crate::BoxError;

/// What a framework-level handler produces: the same context, resolved.
pub type HandlerResult = Result<Context, BoxError>;

/// A boxed, `Send` future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Returns a new [`HandlerFn`] with the given closure.
///
/// This lets you build a [`Handler`] from an async function:
///
/// ```rust
/// use relic::{handler_fn, Context, Response, Body};
/// use relic_handler::Handler;
///
/// let handler = handler_fn(|ctx: Context| async move {
///     ctx.respond(Response::ok(Body::from_text("hi", None)))
/// });
/// ```
pub fn handler_fn<T>(f: T) -> HandlerFn<T> {
    HandlerFn { f }
}

/// A [`Handler`] implemented by a closure.
///
/// See [`handler_fn`] for more details.
#[derive(Copy, Clone)]
pub struct HandlerFn<T> {
    f: T,
}

impl<T> fmt::Debug for HandlerFn<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn")
            .field("f", &format_args!("{}", std::any::type_name::<T>()))
            .finish()
    }
}

impl<T, F, Ctx, O, E> Handler<Ctx> for HandlerFn<T>
where
    T: Fn(Ctx) -> F,
    F: Future<Output = Result<O, E>> + Send,
{
    type Outcome = O;
    type Error = E;

    fn call(&self, ctx: Ctx) -> impl Future<Output = Result<Self::Outcome, Self::Error>> + Send {
        (self.f)(ctx)
    }
}

trait ErasedHandler: Send + Sync {
    fn call_dyn(&self, ctx: Context) -> BoxFuture<'_, HandlerResult>;
}

impl<H> ErasedHandler for H
where
    H: Handler<Context, Outcome = Context, Error = BoxError> + Send + Sync,
{
    fn call_dyn(&self, ctx: Context) -> BoxFuture<'_, HandlerResult> {
        Box::pin(self.call(ctx))
    }
}

/// A cheaply clonable, type-erased [`Handler`].
///
/// Routers store values of one type; `BoxedHandler` is that type when the
/// values are handlers of different shapes. Cloning shares the underlying
/// handler.
///
/// ```rust
/// # use relic::{handler_fn, BoxedHandler, Context, Response, Router};
/// let mut router = Router::new();
/// router.get("/a", BoxedHandler::new(handler_fn(|ctx: Context| async move {
///     ctx.respond(Response::ok("a".into()))
/// }))).unwrap();
/// router.get("/b", BoxedHandler::new(handler_fn(|ctx: Context| async move {
///     ctx.respond(Response::not_found())
/// }))).unwrap();
/// ```
#[derive(Clone)]
pub struct BoxedHandler {
    inner: Arc<dyn ErasedHandler>,
}

impl BoxedHandler {
    /// Erase `handler`.
    pub fn new<H>(handler: H) -> Self
    where
        H: Handler<Context, Outcome = Context, Error = BoxError> + Send + Sync + 'static,
    {
        BoxedHandler {
            inner: Arc::new(handler),
        }
    }

    /// Erase an async closure directly; shorthand for
    /// `BoxedHandler::new(handler_fn(f))`.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        BoxedHandler::new(handler_fn(f))
    }
}

impl Handler<Context> for BoxedHandler {
    type Outcome = Context;
    type Error = BoxError;

    fn call(&self, ctx: Context) -> impl Future<Output = HandlerResult> + Send {
        self.inner.call_dyn(ctx)
    }
}

impl fmt::Debug for BoxedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedHandler").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Request, Response};
    use http::Method;

    fn ctx() -> Context {
        Context::new(Request::builder(Method::GET, "/".parse().unwrap()).build())
    }

    #[tokio::test]
    async fn closure_as_handler() {
        let handler = handler_fn(|ctx: Context| async move {
            ctx.respond(Response::ok("hello".into()))
        });
        let resolved = handler.call(ctx()).await.unwrap();
        assert_eq!(resolved.response().unwrap().status(), http::StatusCode::OK);
    }

    #[tokio::test]
    async fn boxed_handlers_share_and_clone() {
        let boxed = BoxedHandler::from_fn(|ctx| async move {
            ctx.respond(Response::not_found())
        });
        let clone = boxed.clone();
        let resolved = clone.call(ctx()).await.unwrap();
        assert_eq!(
            resolved.response().unwrap().status(),
            http::StatusCode::NOT_FOUND
        );
    }
}
