#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]
#![forbid(unsafe_code)]
// `rustdoc::broken_intra_doc_links` is checked on CI

//! Middleware as decoration of request handlers.
//!
//! A middleware takes a handler and returns a new handler that adds behavior
//! before and/or after the one it wraps. Composition is the only primitive:
//! stacks of middleware are built by nesting [`Middleware::wrap`] calls, so
//! the first middleware added ends up outermost, observing the request first
//! and the outcome last.

mod identity;
mod middleware_fn;
mod stack;

pub use self::identity::Identity;
pub use self::middleware_fn::{middleware_fn, MiddlewareFn};
pub use self::stack::Stack;

/// Decorates a handler, transforming either the context going in, the
/// outcome coming out, or both.
///
/// The sole method, [`wrap`], consumes nothing: a middleware value can be
/// applied to any number of handlers, each call producing a fresh wrapped
/// handler. This is what lets one registration serve every request routed
/// through it.
///
/// # Example
///
/// A middleware that attaches a tag to the context before delegating:
///
/// ```rust
/// use relic_middleware::Middleware;
/// use relic_handler::Handler;
///
/// pub struct Tagged<H> {
///     inner: H,
///     tag: &'static str,
/// }
///
/// pub struct TagMiddleware(pub &'static str);
///
/// impl<H> Middleware<H> for TagMiddleware {
///     type Handler = Tagged<H>;
///
///     fn wrap(&self, inner: H) -> Self::Handler {
///         Tagged { inner, tag: self.0 }
///     }
/// }
///
/// impl<H> Handler<Vec<&'static str>> for Tagged<H>
/// where
///     H: Handler<Vec<&'static str>> + Sync,
/// {
///     type Outcome = H::Outcome;
///     type Error = H::Error;
///
///     async fn call(&self, mut ctx: Vec<&'static str>) -> Result<Self::Outcome, Self::Error> {
///         ctx.push(self.tag);
///         self.inner.call(ctx).await
///     }
/// }
/// ```
///
/// [`wrap`]: Middleware::wrap
pub trait Middleware<H> {
    /// The handler produced by wrapping.
    type Handler;

    /// Wrap the given handler, returning a new handler with added behavior.
    fn wrap(&self, inner: H) -> Self::Handler;
}

impl<'a, M, H> Middleware<H> for &'a M
where
    M: Middleware<H>,
{
    type Handler = M::Handler;

    fn wrap(&self, inner: H) -> Self::Handler {
        (**self).wrap(inner)
    }
}
