//! File-system handlers: serve a directory tree or a single file.
//!
//! [`ServeDir`] resolves request paths beneath a root directory and answers
//! with streamed file bodies, honoring byte ranges (single and
//! `multipart/byteranges`), conditional requests (`If-Modified-Since`,
//! `If-None-Match`, `If-Range`), and content-hash cache busting.
//!
//! A `404 Not Found` is returned when:
//!
//! - the file does not exist,
//! - any path segment starts with a dot (hidden files),
//! - the path escapes the root, directly or through a symlink,
//! - the resolved path is a directory.
//!
//! Methods other than `GET`/`HEAD` get `405` with `Allow: GET, HEAD`.
//!
//! # Example
//!
//! ```rust,no_run
//! use relic::services::ServeDir;
//! use relic::{handler_fn, Pipeline, Router, Context, Response, BoxedHandler};
//! use relic::routing::RouteWith;
//!
//! # fn main() -> Result<(), relic::BoxError> {
//! let mut router = Router::new();
//! router.get("/assets/**", BoxedHandler::new(ServeDir::new("public")))?;
//!
//! let app = Pipeline::new()
//!     .add(RouteWith::middleware(router))
//!     .build(handler_fn(|ctx: Context| async move {
//!         ctx.respond(Response::not_found())
//!     }));
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::Method;
use mime::Mime;
use relic_handler::Handler;

use crate::context::Context;
use crate::handler::HandlerResult;
use crate::headers::HeaderError;

mod cache_bust;
mod open_file;
mod respond;

#[cfg(test)]
mod tests;

pub use self::cache_bust::{CacheBustError, CacheBustingConfig};

// default read chunk 64KiB
const DEFAULT_CAPACITY: usize = 65536;

/// How entity tags are derived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ETagMode {
    /// First 8 hex characters of the SHA-256 of the file bytes. Reads the
    /// file once per conditional check; exact across replicas.
    #[default]
    ContentHash,
    /// Derived from mtime and size. Cheap, but replicas may disagree.
    Metadata,
}

/// A resolver from file path to media type. Injectable for tests and for
/// applications with bespoke extension maps.
pub type MimeResolver = Arc<dyn Fn(&Path) -> Mime + Send + Sync>;

/// Service that serves files from a directory and its subdirectories.
///
/// The `Content-Type` is guessed from the file extension by default.
#[derive(Clone)]
pub struct ServeDir {
    root: PathBuf,
    variant: ServeVariant,
    buf_chunk_size: usize,
    etag_mode: ETagMode,
    mime_resolver: MimeResolver,
    cache_busting: Option<CacheBustingConfig>,
}

// Lets ServeFile reuse the whole machinery with almost no overhead
#[derive(Clone, Debug)]
enum ServeVariant {
    Directory,
    SingleFile,
}

impl ServeDir {
    /// Serve the tree rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let mut base = PathBuf::from(".");
        base.push(root.as_ref());
        ServeDir {
            root: base,
            variant: ServeVariant::Directory,
            buf_chunk_size: DEFAULT_CAPACITY,
            etag_mode: ETagMode::default(),
            mime_resolver: Arc::new(|path| {
                mime_guess::from_path(path).first_or_octet_stream()
            }),
            cache_busting: None,
        }
    }

    fn new_single_file<P: AsRef<Path>>(path: P) -> Self {
        ServeDir {
            root: path.as_ref().to_owned(),
            variant: ServeVariant::SingleFile,
            buf_chunk_size: DEFAULT_CAPACITY,
            etag_mode: ETagMode::default(),
            mime_resolver: Arc::new(|path| {
                mime_guess::from_path(path).first_or_octet_stream()
            }),
            cache_busting: None,
        }
    }

    /// Set a specific read buffer chunk size.
    ///
    /// The default is 64KiB.
    pub fn with_buf_chunk_size(mut self, chunk_size: usize) -> Self {
        self.buf_chunk_size = chunk_size.max(1);
        self
    }

    /// Select how entity tags are computed.
    pub fn with_etag_mode(mut self, mode: ETagMode) -> Self {
        self.etag_mode = mode;
        self
    }

    /// Replace the extension-based media type resolver.
    pub fn with_mime_resolver(
        mut self,
        resolver: impl Fn(&Path) -> Mime + Send + Sync + 'static,
    ) -> Self {
        self.mime_resolver = Arc::new(resolver);
        self
    }

    /// Enable cache busting: `<base>@<hash>.<ext>` request paths are
    /// rewritten to `<base>.<ext>`, and verified hashes are served
    /// `immutable`.
    pub fn with_cache_busting(mut self, config: CacheBustingConfig) -> Self {
        self.cache_busting = Some(config);
        self
    }

    async fn serve(&self, ctx: Context) -> HandlerResult {
        let method = ctx.request().method().clone();
        if method != Method::GET && method != Method::HEAD {
            return ctx.respond(respond::method_not_allowed());
        }

        let outcome = open_file::open(self, ctx.request()).await;
        match outcome {
            Ok(open_file::Opened::File(file)) => {
                ctx.respond(respond::file_response(file, self.buf_chunk_size))
            }
            Ok(open_file::Opened::NotModified) => ctx.respond(respond::not_modified()),
            Ok(open_file::Opened::RangeNotSatisfiable { size }) => {
                ctx.respond(respond::range_not_satisfiable(size))
            }
            Ok(open_file::Opened::NotFound) => ctx.respond(respond::not_found()),
            Err(OpenError::Header(err)) => Err(Box::new(err)),
            Err(OpenError::Io(err)) => {
                if matches!(
                    err.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                ) {
                    ctx.respond(respond::not_found())
                } else {
                    tracing::error!(error = %err, "failed to read file");
                    Err(Box::new(err))
                }
            }
        }
    }
}

/// Why a file could not be opened for serving.
#[derive(Debug)]
pub(crate) enum OpenError {
    Header(HeaderError),
    Io(io::Error),
}

impl From<io::Error> for OpenError {
    fn from(err: io::Error) -> Self {
        OpenError::Io(err)
    }
}

impl Handler<Context> for ServeDir {
    type Outcome = Context;
    type Error = crate::BoxError;

    fn call(&self, ctx: Context) -> impl std::future::Future<Output = HandlerResult> + Send {
        self.serve(ctx)
    }
}

impl fmt::Debug for ServeDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServeDir")
            .field("root", &self.root)
            .field("variant", &self.variant)
            .field("etag_mode", &self.etag_mode)
            .finish()
    }
}

/// Service that serves one fixed file, whatever the request path.
#[derive(Clone, Debug)]
pub struct ServeFile {
    inner: ServeDir,
}

impl ServeFile {
    /// Serve the file at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        ServeFile {
            inner: ServeDir::new_single_file(path),
        }
    }

    /// Select how entity tags are computed.
    pub fn with_etag_mode(mut self, mode: ETagMode) -> Self {
        self.inner = self.inner.with_etag_mode(mode);
        self
    }

    /// Replace the extension-based media type resolver.
    pub fn with_mime_resolver(
        mut self,
        resolver: impl Fn(&Path) -> Mime + Send + Sync + 'static,
    ) -> Self {
        self.inner = self.inner.with_mime_resolver(resolver);
        self
    }
}

impl Handler<Context> for ServeFile {
    type Outcome = Context;
    type Error = crate::BoxError;

    fn call(&self, ctx: Context) -> impl std::future::Future<Output = HandlerResult> + Send {
        self.inner.serve(ctx)
    }
}
