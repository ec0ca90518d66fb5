//! The HTTP/1.1 server adapter.
//!
//! [`Server`] owns the accept loop: every connection gets its own tokio
//! task running the h1 codec against the application handler. Handler
//! errors never escape a connection — whatever bubbles to the adapter
//! becomes a `500` (or a `400`/`413` for the errors that have a defined
//! status), and the process keeps serving.
//!
//! ```rust,no_run
//! use relic::{handler_fn, Context, Response, Server};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let app = handler_fn(|ctx: Context| async move {
//!         ctx.respond(Response::ok("hello".into()))
//!     });
//!     Server::bind("127.0.0.1:8080").await?.serve(app).await
//! }
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use relic_handler::Handler;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::context::Context;
use crate::message::ConnectionInfo;
use crate::BoxError;

mod config;
mod conn;
mod h1;

pub use self::config::ServerConfig;

/// A bound listener waiting to serve an application handler.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
}

impl Server {
    /// Bind a TCP listener.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Server> {
        Ok(Server::from_listener(TcpListener::bind(addr).await?))
    }

    /// Adopt an already-bound listener.
    pub fn from_listener(listener: TcpListener) -> Server {
        Server {
            listener,
            config: ServerConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ServerConfig) -> Server {
        self.config = config;
        self
    }

    /// The bound address, useful after binding port `0`.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Start serving in the background and return the handle controlling
    /// shutdown.
    pub fn launch<H>(self, handler: H) -> ServerHandle
    where
        H: Handler<Context, Outcome = Context, Error = BoxError> + Send + Sync + 'static,
    {
        let local_addr = self.listener.local_addr().ok();
        let listener = Arc::new(self.listener);
        let graceful_timeout = self.config.graceful_close_timeout;
        let workers = self.config.workers;
        let config = Arc::new(self.config);
        let handler = Arc::new(handler);

        let shutdown = CancellationToken::new();
        let force = CancellationToken::new();
        let tracker = TaskTracker::new();

        for _ in 0..workers {
            tracker.spawn(accept_loop(
                listener.clone(),
                handler.clone(),
                config.clone(),
                shutdown.clone(),
                force.clone(),
                tracker.clone(),
            ));
        }

        ServerHandle {
            local_addr,
            shutdown,
            force,
            tracker,
            graceful_timeout,
        }
    }

    /// Serve until the process is killed. For controllable shutdown use
    /// [`launch`](Server::launch).
    pub async fn serve<H>(self, handler: H) -> io::Result<()>
    where
        H: Handler<Context, Outcome = Context, Error = BoxError> + Send + Sync + 'static,
    {
        let handle = self.launch(handler);
        handle.wait().await;
        Ok(())
    }
}

async fn accept_loop<H>(
    listener: Arc<TcpListener>,
    handler: Arc<H>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
    force: CancellationToken,
    tracker: TaskTracker,
) where
    H: Handler<Context, Outcome = Context, Error = BoxError> + Send + Sync + 'static,
{
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => return,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer_addr)) => {
                let info = ConnectionInfo {
                    peer_addr: Some(peer_addr),
                    local_addr: listener.local_addr().ok(),
                };
                let connection = conn::serve_connection(
                    stream,
                    info,
                    handler.clone(),
                    config.clone(),
                    shutdown.clone(),
                );
                let force = force.clone();
                tracker.spawn(async move {
                    tokio::select! {
                        _ = connection => {}
                        // forced close cancels mid-request
                        _ = force.cancelled() => {}
                    }
                });
            }
            Err(err) => {
                tracing::debug!(error = %err, "accept failed");
                // errors like EMFILE clear themselves; do not spin
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

/// Controls a launched server. Created by [`Server::launch`].
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
    force: CancellationToken,
    tracker: TaskTracker,
    graceful_timeout: Duration,
}

impl ServerHandle {
    /// The bound address.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Run until [`close`](ServerHandle::close) completes from another
    /// task (or forever, when nobody closes).
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Stop the server.
    ///
    /// Graceful (`force = false`): stop accepting, let in-flight requests
    /// finish up to the configured timeout, then cancel the stragglers.
    /// Forced: cancel everything immediately.
    pub async fn close(&self, force: bool) {
        self.shutdown.cancel();
        self.tracker.close();
        if force {
            self.force.cancel();
        } else if tokio::time::timeout(self.graceful_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            tracing::debug!("graceful close timed out, cancelling in-flight requests");
            self.force.cancel();
        }
        self.tracker.wait().await;
    }
}
