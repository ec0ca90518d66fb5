//! Request logging middleware.

use std::fmt;
use std::time::Instant;

use relic_handler::Handler;
use relic_middleware::Middleware;

use crate::context::Context;
use crate::handler::HandlerResult;
use crate::BoxError;

/// Middleware that applies [`LogRequests`].
#[derive(Clone, Copy, Debug, Default)]
pub struct LogRequestsMiddleware {
    _p: (),
}

impl LogRequestsMiddleware {
    /// Create a new [`LogRequestsMiddleware`].
    pub fn new() -> Self {
        LogRequestsMiddleware { _p: () }
    }
}

impl<H> Middleware<H> for LogRequestsMiddleware {
    type Handler = LogRequests<H>;

    fn wrap(&self, inner: H) -> Self::Handler {
        LogRequests { inner }
    }
}

/// Handler wrapper that logs one line per request: method, path, outcome
/// and latency, through `tracing`.
#[derive(Clone, Copy, Debug)]
pub struct LogRequests<H> {
    inner: H,
}

impl<H> LogRequests<H> {
    define_inner_handler_accessors!();

    /// Returns a new [`Middleware`] that wraps handlers with
    /// `LogRequests`.
    pub fn middleware() -> LogRequestsMiddleware {
        LogRequestsMiddleware::new()
    }
}

impl<H> Handler<Context> for LogRequests<H>
where
    H: Handler<Context, Outcome = Context, Error = BoxError> + Send + Sync,
{
    type Outcome = Context;
    type Error = BoxError;

    async fn call(&self, ctx: Context) -> HandlerResult {
        let method = ctx.request().method().clone();
        let path = ctx.request().url().to_string();
        let started = Instant::now();

        let result = self.inner.call(ctx).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(resolved) => match resolved.response() {
                Some(response) => tracing::info!(
                    %method,
                    path,
                    status = response.status().as_u16(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "request"
                ),
                None => tracing::info!(
                    %method,
                    path,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "request released the connection"
                ),
            },
            Err(error) => tracing::error!(
                %method,
                path,
                elapsed_ms = elapsed.as_millis() as u64,
                error = %error,
                "request failed"
            ),
        }
        result
    }
}
