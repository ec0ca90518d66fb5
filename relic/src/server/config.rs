//! Server tuning knobs.

use std::time::Duration;

/// Configuration for [`Server`](super::Server). Built with `with_*`
/// methods; the defaults are serviceable for development.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub(crate) max_request_body_bytes: u64,
    pub(crate) max_head_bytes: usize,
    pub(crate) strict_headers: bool,
    pub(crate) sanitize_error_messages: bool,
    pub(crate) workers: usize,
    pub(crate) graceful_close_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            max_request_body_bytes: 10 * 1024 * 1024,
            max_head_bytes: 64 * 1024,
            strict_headers: false,
            sanitize_error_messages: true,
            workers: 1,
            graceful_close_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// A fresh default configuration.
    pub fn new() -> Self {
        ServerConfig::default()
    }

    /// Cap request bodies; crossing the cap answers `413` and closes the
    /// connection. Default 10 MiB.
    pub fn with_max_request_body_bytes(mut self, bytes: u64) -> Self {
        self.max_request_body_bytes = bytes;
        self
    }

    /// Cap the request head (request line plus headers). Default 64 KiB.
    pub fn with_max_head_bytes(mut self, bytes: usize) -> Self {
        self.max_head_bytes = bytes.max(256);
        self
    }

    /// Validate every recognized header while parsing the request instead
    /// of at first typed access. Default off.
    pub fn with_strict_headers(mut self, strict: bool) -> Self {
        self.strict_headers = strict;
        self
    }

    /// When on (the default), `5xx` bodies are generic and never reflect
    /// request content or error details.
    pub fn with_sanitize_error_messages(mut self, sanitize: bool) -> Self {
        self.sanitize_error_messages = sanitize;
        self
    }

    /// Number of acceptor tasks sharing the listener. Default 1.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// How long a graceful close waits for in-flight requests before
    /// cancelling them. Default 30s.
    pub fn with_graceful_close_timeout(mut self, timeout: Duration) -> Self {
        self.graceful_close_timeout = timeout;
        self
    }
}
