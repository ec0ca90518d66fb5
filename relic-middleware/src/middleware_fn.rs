use super::Middleware;
use std::fmt;

/// Returns a new [`MiddlewareFn`] wrapping the given closure.
///
/// This lets a plain `Fn(H) -> NewHandler` act as a [`Middleware`] without a
/// dedicated type:
///
/// ```rust
/// # use relic_middleware::{middleware_fn, Middleware};
/// # struct LogHandler<H>(H);
/// let logging = middleware_fn(|inner| LogHandler(inner));
/// let handler = logging.wrap("endpoint");
/// ```
pub fn middleware_fn<F>(f: F) -> MiddlewareFn<F> {
    MiddlewareFn { f }
}

/// A [`Middleware`] implemented by a closure. See [`middleware_fn`].
#[derive(Clone, Copy)]
pub struct MiddlewareFn<F> {
    f: F,
}

impl<F, H, Out> Middleware<H> for MiddlewareFn<F>
where
    F: Fn(H) -> Out,
{
    type Handler = Out;

    fn wrap(&self, inner: H) -> Self::Handler {
        (self.f)(inner)
    }
}

impl<F> fmt::Debug for MiddlewareFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareFn")
            .field("f", &format_args!("{}", std::any::type_name::<F>()))
            .finish()
    }
}
