//! Handlers that are complete building blocks rather than middleware.

pub mod fs;

pub use self::fs::{CacheBustingConfig, ServeDir, ServeFile};
