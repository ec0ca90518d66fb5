//! Builder for composing middleware into a handler.
//!
//! A [`Pipeline`] collects middleware and wraps a final handler with them.
//! Composition is onion-shaped and right-associative:
//! `Pipeline::new().add(m1).add(m2).build(h)` produces `m1(m2(h))`, so the
//! middleware added first is outermost — it sees the request first and the
//! outcome last.
//!
//! ```rust
//! use relic::{handler_fn, middleware_fn, Pipeline, Context, Response};
//! use relic_handler::Handler;
//! use relic_middleware::Middleware;
//!
//! # async fn demo() -> Result<(), relic::BoxError> {
//! let app = Pipeline::new()
//!     .add(middleware_fn(|inner| inner)) // outermost
//!     .add(middleware_fn(|inner| inner))
//!     .build(handler_fn(|ctx: Context| async move {
//!         ctx.respond(Response::not_found())
//!     }));
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

use std::fmt;

use relic_middleware::{Identity, Middleware, Stack};

use crate::handler::{handler_fn, HandlerFn};

/// Declaratively composes middleware around a handler.
///
/// The pipeline is pure bookkeeping: nothing runs at build time, `build`
/// merely nests the wrappers. See the [module docs](self) for ordering.
#[derive(Clone)]
pub struct Pipeline<M> {
    middleware: M,
}

impl Default for Pipeline<Identity> {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline<Identity> {
    /// Create an empty [`Pipeline`].
    pub fn new() -> Self {
        Pipeline {
            middleware: Identity::new(),
        }
    }
}

impl<M> Pipeline<M> {
    /// Stack `middleware` onto the pipeline. Earlier additions end up
    /// outermost.
    pub fn add<T>(self, middleware: T) -> Pipeline<Stack<T, M>> {
        Pipeline {
            middleware: Stack::new(middleware, self.middleware),
        }
    }

    /// Stack a middleware given as a plain `Fn(H) -> NewHandler`.
    pub fn add_fn<F>(self, f: F) -> Pipeline<Stack<relic_middleware::MiddlewareFn<F>, M>> {
        self.add(relic_middleware::middleware_fn(f))
    }

    /// Wrap `handler` in the accumulated middleware stack.
    pub fn build<H>(self, handler: H) -> M::Handler
    where
        M: Middleware<H>,
    {
        self.middleware.wrap(handler)
    }

    /// Wrap an async closure; shorthand for `build(handler_fn(f))`.
    pub fn build_fn<F>(self, f: F) -> M::Handler
    where
        M: Middleware<HandlerFn<F>>,
    {
        self.build(handler_fn(f))
    }
}

impl<M> fmt::Debug for Pipeline<M>
where
    M: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("middleware", &self.middleware)
            .finish()
    }
}
