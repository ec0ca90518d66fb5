//! Middleware that recovers from handler errors.
//!
//! Errors raised below this layer are offered to a recovery function. It
//! either produces a replacement [`Response`] — the error stops here — or
//! declines, and the error keeps bubbling toward the adapter's final `500`
//! guard.
//!
//! # Example
//!
//! ```rust
//! use relic::middleware::CatchError;
//! use relic::{handler_fn, Pipeline, Context, Response, Body};
//! use http::StatusCode;
//!
//! let app = Pipeline::new()
//!     .add(CatchError::<()>::middleware(|error| {
//!         // turn storage errors into a 503, let everything else bubble
//!         error.to_string().contains("storage offline").then(|| {
//!             Response::builder(StatusCode::SERVICE_UNAVAILABLE)
//!                 .body(Body::from_text("try again later", None))
//!                 .build()
//!         })
//!     }))
//!     .build(handler_fn(|_ctx: Context| async move {
//!         Err::<Context, relic::BoxError>("storage offline".into())
//!     }));
//! ```

use std::fmt;
use std::sync::Arc;

use relic_handler::Handler;
use relic_middleware::Middleware;

use crate::context::Context;
use crate::handler::HandlerResult;
use crate::message::Response;
use crate::BoxError;

type RecoverFn = dyn Fn(&BoxError) -> Option<Response> + Send + Sync;

/// Middleware that applies [`CatchError`]. See the [module docs](self).
pub struct CatchErrorMiddleware {
    recover: Arc<RecoverFn>,
}

impl CatchErrorMiddleware {
    /// Create a middleware from a recovery function.
    pub fn new(recover: impl Fn(&BoxError) -> Option<Response> + Send + Sync + 'static) -> Self {
        CatchErrorMiddleware {
            recover: Arc::new(recover),
        }
    }
}

impl Clone for CatchErrorMiddleware {
    fn clone(&self) -> Self {
        CatchErrorMiddleware {
            recover: self.recover.clone(),
        }
    }
}

impl<H> Middleware<H> for CatchErrorMiddleware {
    type Handler = CatchError<H>;

    fn wrap(&self, inner: H) -> Self::Handler {
        CatchError {
            inner,
            recover: self.recover.clone(),
        }
    }
}

impl fmt::Debug for CatchErrorMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatchErrorMiddleware").finish()
    }
}

/// Handler wrapper that offers errors from `inner` to a recovery function.
///
/// Recovery replaces the whole context: the failed request and its
/// properties are gone, only the substitute response travels back up.
pub struct CatchError<H> {
    inner: H,
    recover: Arc<RecoverFn>,
}

impl<H> CatchError<H> {
    define_inner_handler_accessors!();

    /// Returns a new [`Middleware`] that wraps handlers with a
    /// `CatchError` built from `recover`.
    pub fn middleware(
        recover: impl Fn(&BoxError) -> Option<Response> + Send + Sync + 'static,
    ) -> CatchErrorMiddleware {
        CatchErrorMiddleware::new(recover)
    }
}

impl<H> Handler<Context> for CatchError<H>
where
    H: Handler<Context, Outcome = Context, Error = BoxError> + Send + Sync,
{
    type Outcome = Context;
    type Error = BoxError;

    async fn call(&self, ctx: Context) -> HandlerResult {
        match self.inner.call(ctx).await {
            Ok(resolved) => Ok(resolved),
            Err(error) => match (self.recover.as_ref())(&error) {
                Some(response) => Ok(Context::recovered(response)),
                None => Err(error),
            },
        }
    }
}

impl<H> fmt::Debug for CatchError<H>
where
    H: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatchError").field("inner", &self.inner).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::message::Request;
    use crate::{Body, Pipeline};
    use http::{Method, StatusCode};

    fn ctx() -> Context {
        Context::new(Request::builder(Method::GET, "/".parse().unwrap()).build())
    }

    #[tokio::test]
    async fn recovery_produces_a_response() {
        let app = Pipeline::new()
            .add(CatchError::<()>::middleware(|_error| {
                Some(Response::builder(StatusCode::SERVICE_UNAVAILABLE).build())
            }))
            .build(handler_fn(|_ctx: Context| async move {
                Err::<Context, _>("boom".into())
            }));

        let resolved = app.call(ctx()).await.unwrap();
        assert_eq!(
            resolved.response().unwrap().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn declined_errors_keep_bubbling() {
        let app = Pipeline::new()
            .add(CatchError::<()>::middleware(|_error| None))
            .build(handler_fn(|_ctx: Context| async move {
                Err::<Context, _>("boom".into())
            }));

        assert!(app.call(ctx()).await.is_err());
    }

    #[tokio::test]
    async fn successes_pass_through_untouched() {
        let app = Pipeline::new()
            .add(CatchError::<()>::middleware(|_error| {
                Some(Response::internal_server_error())
            }))
            .build(handler_fn(|ctx: Context| async move {
                ctx.respond(Response::ok(Body::from_text("fine", None)))
            }));

        let resolved = app.call(ctx()).await.unwrap();
        assert_eq!(resolved.response().unwrap().status(), StatusCode::OK);
    }
}
