//! The bridge between the router and the pipeline.
//!
//! [`RouteWith`] is the middleware that runs `router.lookup` for each
//! request. On a hit it attaches the captures to the context and runs the
//! route's handler (wrapped in any path-scoped middleware); on a miss it
//! defers to the handler it wraps — the application's fallback sink.
//!
//! Path-scoped middleware is registered with [`RouteWith::use_at`]: it
//! applies only to requests whose matched route lies at or beneath the
//! registration pattern, never to misses, and the fallback sink is never
//! wrapped by it.

use std::fmt;
use std::sync::Arc;

use http::{Method, StatusCode};
use relic_handler::Handler;
use relic_middleware::Middleware;

use crate::context::{Context, Property};
use crate::handler::{BoxedHandler, HandlerResult};
use crate::headers::typed::Allow;
use crate::router::{NormalizedPath, PathParameters, PathTrie, RouteError, Router, RouterMatch};
use crate::BoxError;

/// The parameter captures of the matched route.
pub static PATH_PARAMETERS: Property<PathParameters> = Property::new("path-parameters");

/// The part of the request path the route consumed.
pub static MATCHED_PATH: Property<NormalizedPath> = Property::new("matched-path");

/// The suffix a tail route left unconsumed; empty for exact matches.
pub static REMAINING_PATH: Property<NormalizedPath> = Property::new("remaining-path");

/// The methods that would have matched, set when routing hits a
/// method mismatch.
pub static ALLOWED_METHODS: Property<Vec<Method>> = Property::new("allowed-methods");

type ScopedFn = Arc<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync>;

/// Routing configuration: a router plus path-scoped middleware. Freeze it
/// with [`RouteWith::into_middleware`] (or use [`RouteWith::middleware`]
/// when there is no scoped middleware to register).
pub struct RouteWith<H = BoxedHandler> {
    router: Router<H>,
    scoped: PathTrie<Vec<ScopedFn>>,
    host_routing: bool,
}

impl<H> RouteWith<H> {
    /// Wrap a router.
    pub fn new(router: Router<H>) -> Self {
        RouteWith {
            router,
            scoped: PathTrie::new(),
            host_routing: false,
        }
    }

    /// Shorthand: freeze a router with no scoped middleware.
    pub fn middleware(router: Router<H>) -> RouteWithMiddleware<H> {
        RouteWith::new(router).into_middleware()
    }

    /// Match on `/{host}{path}` instead of the path alone.
    pub fn with_host_routing(mut self) -> Self {
        self.host_routing = true;
        self
    }

    /// Register middleware for every route matched at or beneath
    /// `pattern`. Registration order within one pattern is preserved;
    /// shallower registrations wrap deeper ones.
    ///
    /// Tail patterns (`/files/**`) are rejected here; use
    /// [`use_consuming`](RouteWith::use_consuming) for those.
    pub fn use_at(
        &mut self,
        pattern: &str,
        middleware: impl Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
    ) -> Result<(), RouteError> {
        if pattern.trim_end_matches('/').ends_with("**") {
            return Err(RouteError::TailChild {
                pattern: pattern.to_owned(),
            });
        }
        self.register(pattern, middleware)
    }

    /// Register middleware at a tail pattern. Mirrors the trie attach
    /// rule: the tail node must stand alone, with no sibling structure.
    pub fn use_consuming(
        &mut self,
        pattern: &str,
        middleware: impl Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
    ) -> Result<(), RouteError> {
        if self.scoped.tail_has_siblings(pattern)? {
            return Err(RouteError::AttachConflict {
                mount: pattern.to_owned(),
                reason: "tail middleware cannot have siblings".to_owned(),
            });
        }
        self.register(pattern, middleware)
    }

    fn register(
        &mut self,
        pattern: &str,
        middleware: impl Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
    ) -> Result<(), RouteError> {
        self.scoped
            .get_or_insert_with(pattern, Vec::new)?
            .push(Arc::new(middleware));
        Ok(())
    }

    /// Freeze into a [`Middleware`] usable in a pipeline.
    pub fn into_middleware(self) -> RouteWithMiddleware<H> {
        RouteWithMiddleware {
            shared: Arc::new(self),
        }
    }
}

impl<H> fmt::Debug for RouteWith<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteWith")
            .field("router", &self.router)
            .field("host_routing", &self.host_routing)
            .finish()
    }
}

/// Middleware that applies [`RouteWith`] routing. Created by
/// [`RouteWith::into_middleware`].
pub struct RouteWithMiddleware<H = BoxedHandler> {
    shared: Arc<RouteWith<H>>,
}

impl<H> Clone for RouteWithMiddleware<H> {
    fn clone(&self) -> Self {
        RouteWithMiddleware {
            shared: self.shared.clone(),
        }
    }
}

impl<H, Next> Middleware<Next> for RouteWithMiddleware<H> {
    type Handler = Routed<H, Next>;

    fn wrap(&self, next: Next) -> Self::Handler {
        Routed {
            shared: self.shared.clone(),
            next,
        }
    }
}

impl<H> fmt::Debug for RouteWithMiddleware<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteWithMiddleware").finish()
    }
}

/// The routing handler produced by [`RouteWithMiddleware`]; dispatches to
/// routes and falls back to `next` on misses.
pub struct Routed<H, Next> {
    shared: Arc<RouteWith<H>>,
    next: Next,
}

impl<H, Next> Routed<H, Next>
where
    H: Handler<Context, Outcome = Context, Error = BoxError> + Clone + Send + Sync + 'static,
    Next: Handler<Context, Outcome = Context, Error = BoxError> + Send + Sync,
{
    async fn dispatch(&self, mut ctx: Context) -> HandlerResult {
        let lookup_key = if self.shared.host_routing {
            let host = ctx
                .request()
                .headers()
                .raw_str(&http::header::HOST)
                .unwrap_or("");
            format!("/{host}{}", ctx.request().url())
        } else {
            ctx.request().url().to_string()
        };

        match self.shared.router.lookup(ctx.request().method(), &lookup_key) {
            RouterMatch::Found(found) => {
                let scoped_path = NormalizedPath::parse(&lookup_key);
                PATH_PARAMETERS.set(&mut ctx, found.parameters);
                MATCHED_PATH.set(&mut ctx, found.matched);
                REMAINING_PATH.set(&mut ctx, found.remaining.clone());
                if !found.remaining.is_empty() {
                    // a tail route is a mount point: nested handlers see
                    // the path relative to it
                    let remaining = found.remaining;
                    ctx = ctx.map_request(|request| request.with_url(remaining));
                }
                ctx.mark_routed();

                let chain = self.shared.scoped.values_along(&scoped_path);
                if chain.is_empty() {
                    found.value.call(ctx).await
                } else {
                    // deepest registrations wrap first so the root-most
                    // middleware ends up outermost
                    let mut handler = BoxedHandler::new(found.value.clone());
                    for scoped in chain.iter().rev().flat_map(|entries| entries.iter().rev())
                    {
                        handler = (scoped.as_ref())(handler);
                    }
                    handler.call(ctx).await
                }
            }
            RouterMatch::MethodNotAllowed(allowed) => {
                ALLOWED_METHODS.set(&mut ctx, allowed.clone());
                let ctx = self.sink(ctx).await?;
                // the default sink answers 404; a method mismatch owes the
                // client a 405 with the methods that would have worked
                Ok(ctx.map_response(|response| {
                    if response.status() == StatusCode::NOT_FOUND {
                        response
                            .with_status(StatusCode::METHOD_NOT_ALLOWED)
                            .with_header(&Allow(allowed))
                    } else {
                        response
                    }
                }))
            }
            RouterMatch::NotFound => self.sink(ctx).await,
        }
    }

    async fn sink(&self, ctx: Context) -> HandlerResult {
        match self.shared.router.fallback() {
            Some(fallback) => fallback.call(ctx).await,
            None => self.next.call(ctx).await,
        }
    }
}

impl<H, Next> Handler<Context> for Routed<H, Next>
where
    H: Handler<Context, Outcome = Context, Error = BoxError> + Clone + Send + Sync + 'static,
    Next: Handler<Context, Outcome = Context, Error = BoxError> + Send + Sync,
{
    type Outcome = Context;
    type Error = BoxError;

    fn call(
        &self,
        ctx: Context,
    ) -> impl std::future::Future<Output = HandlerResult> + Send {
        self.dispatch(ctx)
    }
}

impl<H, Next> fmt::Debug for Routed<H, Next>
where
    Next: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Routed").field("next", &self.next).finish()
    }
}
