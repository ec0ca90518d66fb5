#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]
#![forbid(unsafe_code)]
// `rustdoc::broken_intra_doc_links` is checked on CI

//! Definition of the core `Handler` trait of Relic
//!
//! The [`Handler`] trait provides the necessary abstraction for defining
//! how an incoming request context is turned into an outcome. It is simple
//! but powerful and is used as the foundation for the rest of Relic.

/// An asynchronous function from a request context to an outcome.
///
/// The `Handler` trait is the unit of request processing in Relic. A web
/// application is a tree of handlers: the endpoint that produces a response,
/// and every middleware-wrapped handler between the server and that endpoint.
///
/// # Functional
///
/// A `Handler` is a function of a context `Ctx`. Calling it returns a
/// `Future` representing the eventual completion of processing the request.
/// The processing may suspend at any await point, typically while reading the
/// request body or performing I/O of its own. At some point the future
/// resolves to an outcome or an error.
///
/// # Endpoints
///
/// An endpoint handler consumes the context and resolves it — in an HTTP
/// framework, typically by attaching a response:
///
/// ```rust
/// # use relic_handler::Handler;
/// struct Greeting;
///
/// struct Ctx {
///     name: String,
/// }
///
/// impl Handler<Ctx> for Greeting {
///     type Outcome = String;
///     type Error = std::convert::Infallible;
///
///     async fn call(&self, ctx: Ctx) -> Result<Self::Outcome, Self::Error> {
///         Ok(format!("hello, {}", ctx.name))
///     }
/// }
/// ```
///
/// # Middleware
///
/// More often than not, the pieces needed for writing robust network
/// applications are the same regardless of the application logic. By keeping
/// the handler signature uniform it is possible to write middleware that
/// provides those pieces in a reusable way: a middleware is any value that
/// wraps a handler and yields another handler.
///
/// Take a deadline as an example:
///
/// ```rust
/// use relic_handler::Handler;
/// use relic_middleware::Middleware;
/// use std::time::Duration;
/// use std::fmt;
/// use std::error::Error;
///
/// // Our deadline handler, which wraps another handler and
/// // bounds how long it may take to produce an outcome.
/// pub struct Deadline<H> {
///     inner: H,
///     after: Duration,
/// }
///
/// impl<H> Deadline<H> {
///     pub fn new(inner: H, after: Duration) -> Deadline<H> {
///         Deadline {
///             inner,
///             after,
///         }
///     }
/// }
///
/// // The error returned if processing a request took too long
/// #[derive(Debug)]
/// pub struct Expired;
///
/// impl fmt::Display for Expired {
///     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
///         write!(f, "expired")
///     }
/// }
///
/// impl Error for Expired {}
///
/// // We can implement `Handler` for `Deadline<H>` if `H` is a `Handler`
/// impl<H, Ctx> Handler<Ctx> for Deadline<H>
/// where
///     H: Handler<Ctx> + Sync,
///     Ctx: Send,
///     H::Error: Into<Box<dyn Error + Send + Sync>> + Send + 'static,
///     H::Outcome: Send + 'static,
/// {
///     // `Deadline` doesn't modify the outcome type, so we use `H`'s outcome type
///     type Outcome = H::Outcome;
///     // Errors may be either `Expired` if the deadline passed, or the inner
///     // handler's `Error` type. Therefore, we return a boxed
///     // `dyn Error + Send + Sync` trait object to erase the error's type.
///     type Error = Box<dyn Error + Send + Sync>;
///
///     async fn call(&self, ctx: Ctx) -> Result<Self::Outcome, Self::Error> {
///         tokio::select! {
///             res = self.inner.call(ctx) => {
///                 res.map_err(|err| err.into())
///             },
///             _ = tokio::time::sleep(self.after) => {
///                 Err(Box::new(Expired) as Box<dyn Error + Send + Sync>)
///             },
///         }
///     }
/// }
///
/// // A middleware for wrapping handlers in `Deadline`
/// pub struct DeadlineMiddleware(Duration);
///
/// impl DeadlineMiddleware {
///     pub fn new(after: Duration) -> Self {
///         DeadlineMiddleware(after)
///     }
/// }
///
/// impl<H> Middleware<H> for DeadlineMiddleware {
///     type Handler = Deadline<H>;
///
///     fn wrap(&self, handler: H) -> Deadline<H> {
///         Deadline::new(handler, self.0)
///     }
/// }
/// ```
///
/// The deadline above is decoupled from the shape of the context and from
/// what the wrapped handler does with it; the same middleware can guard a
/// routed endpoint or an entire application pipeline.
///
/// # Short-circuiting
///
/// A middleware-produced handler is free to resolve the context itself
/// without ever calling the handler it wraps; denying a request based on a
/// header is simply returning an outcome early. No dedicated control-flow
/// mechanism exists for this, the ordinary return path is enough.
pub trait Handler<Ctx> {
    /// The outcome a resolved context is turned into.
    type Outcome;

    /// Errors produced while handling.
    type Error;

    /// Process the context and return the outcome asynchronously.
    ///
    /// The returned future is `Send`: handlers run on multi-threaded
    /// executors and cross thread boundaries at every suspension point.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    fn call(
        &self,
        ctx: Ctx,
    ) -> impl std::future::Future<Output = Result<Self::Outcome, Self::Error>> + Send;
}

impl<'a, H, Ctx> Handler<Ctx> for &'a H
where
    H: Handler<Ctx> + 'a,
{
    type Outcome = H::Outcome;
    type Error = H::Error;

    fn call(
        &self,
        ctx: Ctx,
    ) -> impl std::future::Future<Output = Result<Self::Outcome, Self::Error>> + Send {
        (**self).call(ctx)
    }
}

impl<H, Ctx> Handler<Ctx> for Box<H>
where
    H: Handler<Ctx> + ?Sized,
{
    type Outcome = H::Outcome;
    type Error = H::Error;

    fn call(
        &self,
        ctx: Ctx,
    ) -> impl std::future::Future<Output = Result<Self::Outcome, Self::Error>> + Send {
        (**self).call(ctx)
    }
}

impl<H, Ctx> Handler<Ctx> for std::sync::Arc<H>
where
    H: Handler<Ctx> + ?Sized,
{
    type Outcome = H::Outcome;
    type Error = H::Error;

    fn call(
        &self,
        ctx: Ctx,
    ) -> impl std::future::Future<Output = Result<Self::Outcome, Self::Error>> + Send {
        (**self).call(ctx)
    }
}
