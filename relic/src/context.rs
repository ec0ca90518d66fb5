//! Per-request state: the context, its state machine, and typed
//! properties.
//!
//! A [`Context`] exclusively owns its [`Request`] and tracks what has been
//! decided about it: nothing yet (`New`), a [`Response`] is attached, the
//! connection is being hijacked, or the connection upgrades to another
//! protocol. `New → Response` may be revisited — middleware replacing a
//! response is legitimate — but hijack and upgrade are terminal, and any
//! other transition fails with [`StateError`].
//!
//! Properties are typed per-request extension slots. A [`Property`] is a
//! key minted once (usually in a `static`), and its values live in the
//! context, keyed by the request token, exactly as long as the request:
//!
//! ```rust
//! # use relic::context::{Context, Property};
//! # use relic::{Request, Response};
//! # use http::Method;
//! static REQUEST_ID: Property<u64> = Property::new("request-id");
//!
//! let request = Request::builder(Method::GET, "/".parse().unwrap()).build();
//! let mut ctx = Context::new(request);
//! REQUEST_ID.set(&mut ctx, 7);
//! assert_eq!(REQUEST_ID.get(&ctx).unwrap(), &7);
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::message::{Request, Response, Token};
use crate::BoxError;

/// The raw byte channel released to hijack and upgrade callbacks.
pub trait RawStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> RawStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// A boxed raw byte channel.
pub type RawChannel = Box<dyn RawStream>;

/// The callback driven once the engine releases the connection.
pub type HijackHandler =
    Box<dyn FnOnce(RawChannel) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// An invalid context state transition.
#[derive(Debug)]
pub struct StateError {
    from: &'static str,
    attempted: &'static str,
}

impl StateError {
    /// The state the context was in.
    pub fn from_state(&self) -> &'static str {
        self.from
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot {} a context in the `{}` state",
            self.attempted, self.from
        )
    }
}

impl std::error::Error for StateError {}

enum State {
    New,
    Response(Response),
    Hijack(HijackHandler),
    WebSocketUpgrade(Response, HijackHandler),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::New => "new",
            State::Response(_) => "response",
            State::Hijack(_) => "hijack",
            State::WebSocketUpgrade(..) => "websocket-upgrade",
        }
    }
}

/// What a resolved context decided. Produced by [`Context::into_outcome`].
pub enum Outcome {
    /// Serialize this response.
    Response(Response),
    /// Release the raw connection to the callback; HTTP ends here.
    Hijack(HijackHandler),
    /// Write the `101` response head, then release the raw connection.
    WebSocketUpgrade(Response, HijackHandler),
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Response(response) => f.debug_tuple("Response").field(response).finish(),
            Outcome::Hijack(_) => f.write_str("Hijack"),
            Outcome::WebSocketUpgrade(response, _) => {
                f.debug_tuple("WebSocketUpgrade").field(response).finish()
            }
        }
    }
}

/// The per-request carrier walked through the pipeline. See the
/// [module docs](self).
pub struct Context {
    request: Request,
    state: State,
    properties: HashMap<u64, Box<dyn Any + Send + Sync>>,
    routed: bool,
}

impl Context {
    /// Wrap a freshly parsed request.
    pub fn new(request: Request) -> Context {
        Context {
            request,
            state: State::New,
            properties: HashMap::new(),
            routed: false,
        }
    }

    /// The wrapped request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The request token; shorthand for `self.request().token()`.
    pub fn token(&self) -> Token {
        self.request.token()
    }

    /// Replace the request through `f`. The token is fixed: `f` receives
    /// the request and whatever it returns keeps the original identity.
    ///
    /// Once routing has run, changes to the mount-relative path are
    /// discarded (and logged); route dispatch depends on it.
    pub fn map_request(mut self, f: impl FnOnce(Request) -> Request) -> Context {
        let url_before = self.request.url().clone();
        self.request = f(self.request);
        if self.routed && *self.request.url() != url_before {
            tracing::debug!(
                url = %self.request.url(),
                "ignoring request path rewrite after routing"
            );
            self.request = self.request.with_url(url_before);
        }
        self
    }

    pub(crate) fn mark_routed(&mut self) {
        self.routed = true;
    }

    /// A context resolved out of thin air, for error recovery: the failed
    /// request is gone, only the replacement response exists.
    pub(crate) fn recovered(response: Response) -> Context {
        let request = Request::builder(http::Method::GET, http::Uri::from_static("/")).build();
        Context {
            request,
            state: State::Response(response),
            properties: HashMap::new(),
            routed: false,
        }
    }

    /// Attach `response`, resolving the context.
    ///
    /// Allowed from `New` and — replacement by transforming middleware —
    /// from `Response`. Fails once the connection was hijacked or upgraded.
    pub fn respond(mut self, response: Response) -> Result<Context, BoxError> {
        match self.state {
            State::New | State::Response(_) => {
                self.state = State::Response(response);
                Ok(self)
            }
            _ => Err(Box::new(StateError {
                from: self.state.name(),
                attempted: "respond on",
            })),
        }
    }

    /// Release the raw connection to `callback`, resolving the context.
    /// Terminal; only a `New` context can be hijacked.
    pub fn hijack<F, Fut>(mut self, callback: F) -> Result<Context, BoxError>
    where
        F: FnOnce(RawChannel) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        match self.state {
            State::New => {
                self.state = State::Hijack(Box::new(move |channel| Box::pin(callback(channel))));
                Ok(self)
            }
            _ => Err(Box::new(StateError {
                from: self.state.name(),
                attempted: "hijack",
            })),
        }
    }

    /// Upgrade the connection: emit `response` (a `101` with the handshake
    /// headers) and then release the raw connection to `callback`.
    /// Terminal; only a `New` context can upgrade.
    pub fn upgrade<F, Fut>(mut self, response: Response, callback: F) -> Result<Context, BoxError>
    where
        F: FnOnce(RawChannel) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        match self.state {
            State::New => {
                self.state = State::WebSocketUpgrade(
                    response,
                    Box::new(move |channel| Box::pin(callback(channel))),
                );
                Ok(self)
            }
            _ => Err(Box::new(StateError {
                from: self.state.name(),
                attempted: "upgrade",
            })),
        }
    }

    /// Whether the context has reached a terminal decision.
    pub fn is_resolved(&self) -> bool {
        !matches!(self.state, State::New)
    }

    /// The attached response, when in the `Response` state.
    pub fn response(&self) -> Option<&Response> {
        match &self.state {
            State::Response(response) => Some(response),
            _ => None,
        }
    }

    /// Transform the attached response, if any. Middleware sugar over
    /// take-and-respond.
    pub fn map_response(mut self, f: impl FnOnce(Response) -> Response) -> Context {
        if let State::Response(response) = self.state {
            self.state = State::Response(f(response));
        }
        self
    }

    /// Split into the request and the decided outcome.
    ///
    /// Fails with [`StateError`] when the context is still `New`: a handler
    /// returned without resolving it.
    pub fn into_outcome(self) -> Result<(Request, Outcome), StateError> {
        let outcome = match self.state {
            State::New => {
                return Err(StateError {
                    from: "new",
                    attempted: "emit",
                })
            }
            State::Response(response) => Outcome::Response(response),
            State::Hijack(handler) => Outcome::Hijack(handler),
            State::WebSocketUpgrade(response, handler) => {
                Outcome::WebSocketUpgrade(response, handler)
            }
        };
        Ok((self.request, outcome))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request", &self.request)
            .field("state", &self.state.name())
            .finish()
    }
}

/// A value was read from a property that was never set.
#[derive(Debug)]
pub struct MissingProperty {
    name: &'static str,
}

impl fmt::Display for MissingProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context property `{}` was never set", self.name)
    }
}

impl std::error::Error for MissingProperty {}

static NEXT_PROPERTY: AtomicU64 = AtomicU64::new(1);

/// A typed key into the per-request property store.
///
/// Each `Property` value is its own key: two properties never collide, even
/// at the same value type. Mint them once, in a `static`.
pub struct Property<V> {
    name: &'static str,
    key: AtomicU64,
    _marker: PhantomData<fn(V) -> V>,
}

impl<V: Send + Sync + 'static> Property<V> {
    /// Mint a new property key. `name` only shows up in diagnostics.
    pub const fn new(name: &'static str) -> Property<V> {
        Property {
            name,
            key: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }

    fn key(&self) -> u64 {
        // lazily claim a process-unique slot on first use
        match self.key.load(Ordering::Relaxed) {
            0 => {
                let fresh = NEXT_PROPERTY.fetch_add(1, Ordering::Relaxed);
                match self
                    .key
                    .compare_exchange(0, fresh, Ordering::Relaxed, Ordering::Relaxed)
                {
                    Ok(_) => fresh,
                    Err(existing) => existing,
                }
            }
            existing => existing,
        }
    }

    /// The value for this request; fails when never set.
    pub fn get<'c>(&self, ctx: &'c Context) -> Result<&'c V, MissingProperty> {
        self.get_or_none(ctx).ok_or(MissingProperty { name: self.name })
    }

    /// The value for this request, or `None`.
    pub fn get_or_none<'c>(&self, ctx: &'c Context) -> Option<&'c V> {
        ctx.properties
            .get(&self.key())
            .and_then(|v| v.downcast_ref())
    }

    /// Store a value for this request, returning the previous one.
    pub fn set(&self, ctx: &mut Context, value: V) -> Option<V> {
        ctx.properties
            .insert(self.key(), Box::new(value))
            .and_then(|v| v.downcast().ok())
            .map(|v| *v)
    }

    /// Whether a value was set for this request.
    pub fn exists(&self, ctx: &Context) -> bool {
        ctx.properties.contains_key(&self.key())
    }

    /// Drop the value for this request, returning it.
    pub fn clear(&self, ctx: &mut Context) -> Option<V> {
        ctx.properties
            .remove(&self.key())
            .and_then(|v| v.downcast().ok())
            .map(|v| *v)
    }
}

impl<V> fmt::Debug for Property<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn new_ctx() -> Context {
        Context::new(Request::builder(Method::GET, "/x".parse().unwrap()).build())
    }

    #[test]
    fn respond_then_replace() {
        let ctx = new_ctx();
        let ctx = ctx.respond(Response::not_found()).unwrap();
        let ctx = ctx.respond(Response::ok(crate::Body::empty())).unwrap();
        assert_eq!(ctx.response().unwrap().status(), http::StatusCode::OK);
    }

    #[test]
    fn hijack_after_respond_fails() {
        let ctx = new_ctx().respond(Response::not_found()).unwrap();
        let err = ctx.hijack(|_channel| async {}).unwrap_err();
        assert!(err.downcast_ref::<StateError>().is_some());
    }

    #[test]
    fn respond_after_hijack_fails() {
        let ctx = new_ctx().hijack(|_channel| async {}).unwrap();
        assert!(ctx.respond(Response::not_found()).is_err());
    }

    #[test]
    fn unresolved_context_cannot_emit() {
        let ctx = new_ctx();
        assert!(ctx.into_outcome().is_err());
    }

    #[test]
    fn properties_are_distinct_keys() {
        static A: Property<u32> = Property::new("a");
        static B: Property<u32> = Property::new("b");

        let mut ctx = new_ctx();
        A.set(&mut ctx, 1);
        B.set(&mut ctx, 2);
        assert_eq!(A.get(&ctx).unwrap(), &1);
        assert_eq!(B.get(&ctx).unwrap(), &2);
    }

    #[test]
    fn missing_property_reports_its_name() {
        static NEVER: Property<u32> = Property::new("never-set");
        let ctx = new_ctx();
        let err = NEVER.get(&ctx).unwrap_err();
        assert!(err.to_string().contains("never-set"));
        assert!(!NEVER.exists(&ctx));
    }

    #[test]
    fn clear_returns_the_value() {
        static SLOT: Property<&'static str> = Property::new("slot");
        let mut ctx = new_ctx();
        SLOT.set(&mut ctx, "x");
        assert_eq!(SLOT.clear(&mut ctx), Some("x"));
        assert!(!SLOT.exists(&ctx));
    }

    #[test]
    fn post_routing_url_rewrites_are_ignored() {
        let mut ctx = new_ctx();
        ctx.mark_routed();
        let ctx = ctx.map_request(|request| {
            request.with_url(crate::router::NormalizedPath::parse("/elsewhere"))
        });
        assert_eq!(ctx.request().url().to_string(), "/x");
    }
}
