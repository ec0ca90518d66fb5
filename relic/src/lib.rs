//! `async fn(Context) -> Result<Context, Error>`
//!
//! # Overview
//!
//! Relic is an HTTP/1.1 server framework. It turns bytes on an accepted
//! connection into a typed [`Request`], wraps it in a [`Context`] and walks
//! it through a middleware [`Pipeline`] down to a [`Handler`], then
//! serializes the attached [`Response`] back onto the wire.
//!
//! The crate is organized around four load-bearing pieces:
//!
//! - [`router`] — a pattern trie (`/users/:id`, `/files/**`) with
//!   deterministic precedence and backtracking, wrapped in a per-method
//!   [`Router`] that distinguishes `404` from `405`.
//! - [`pipeline`] — middleware composition. A middleware wraps a handler and
//!   yields a handler; stacks are onion-shaped, the first middleware added
//!   observes the request first and the outcome last.
//! - [`body`] — a unified once-readable byte stream with content-length
//!   tracking and MIME sniffing; reading a [`Body`] twice is an error, not
//!   a silent empty read.
//! - [`headers`] — an ordered, case-insensitive header multimap with lazy
//!   typed decoding and validated typed encoding for the standard header
//!   repertoire.
//!
//! # Example
//!
//! ```rust,no_run
//! use relic::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), relic::BoxError> {
//!     let mut router = Router::new();
//!     router.get("/hello/:name", handler_fn(|ctx: Context| async move {
//!         let name = PATH_PARAMETERS.get(&ctx)?.raw("name").unwrap_or("world").to_owned();
//!         ctx.respond(Response::ok(Body::from_text(format!("hello, {name}"), None)))
//!     }))?;
//!
//!     let app = Pipeline::new()
//!         .add(LogRequests::<()>::middleware())
//!         .add(RouteWith::middleware(router))
//!         .build(handler_fn(|ctx: Context| async move {
//!             ctx.respond(Response::not_found())
//!         }));
//!
//!     Server::bind("127.0.0.1:8080").await?.serve(app).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Concurrency model
//!
//! Each accepted connection is processed on its own tokio task. A handler
//! sees a consistent immutable request and exclusively owns its context;
//! routers and static-file handlers are shared read-only behind `Arc`.
//! Within one connection responses are emitted in request order; across
//! connections there is no ordering.

#![warn(
    clippy::all,
    clippy::dbg_macro,
    clippy::todo,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::mem_forget,
    clippy::unused_self,
    clippy::filter_map_next,
    clippy::needless_continue,
    clippy::needless_borrow,
    clippy::match_wildcard_for_single_variants,
    clippy::if_let_mutex,
    clippy::await_holding_lock,
    clippy::imprecise_flops,
    clippy::suboptimal_flops,
    clippy::lossy_float_literal,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::fn_params_excessive_bools,
    clippy::exit,
    clippy::inefficient_to_string,
    clippy::linkedlist,
    clippy::macro_use_imports,
    clippy::option_option,
    clippy::verbose_file_reads,
    clippy::unnested_or_patterns,
    rust_2018_idioms,
    future_incompatible,
    nonstandard_style,
    missing_docs
)]
#![deny(unreachable_pub)]
#![allow(elided_lifetimes_in_paths, clippy::type_complexity)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

#[macro_use]
pub(crate) mod macros;

pub mod body;
pub mod context;
pub mod handler;
pub mod headers;
pub mod message;
pub mod middleware;
pub mod pipeline;
pub mod router;
pub mod routing;
pub mod server;
pub mod services;

pub use relic_handler::Handler;
pub use relic_middleware::{middleware_fn, Identity, Middleware, Stack};

#[doc(inline)]
pub use self::{
    body::Body,
    context::{Context, Property},
    handler::{handler_fn, BoxedHandler},
    headers::Headers,
    message::{Request, Response},
    pipeline::Pipeline,
    router::Router,
    server::Server,
};

/// Alias for a type-erased error type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The usual imports for building an application.
pub mod prelude {
    pub use crate::body::Body;
    pub use crate::context::Context;
    pub use crate::handler::handler_fn;
    pub use crate::message::{Request, Response};
    pub use crate::middleware::LogRequests;
    pub use crate::pipeline::Pipeline;
    pub use crate::router::Router;
    pub use crate::routing::{RouteWith, MATCHED_PATH, PATH_PARAMETERS, REMAINING_PATH};
    pub use crate::server::Server;
    pub use relic_handler::Handler;
    pub use relic_middleware::Middleware;
}
