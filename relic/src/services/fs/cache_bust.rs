//! Content-hash cache busting.
//!
//! A busted URL embeds a short content hash in the file name:
//! `/assets/app@deadbeef01.js`. The handler rewrites it back to
//! `/assets/app.js` before lookup, verifies the hash against the current
//! content, and answers verified hits with
//! `Cache-Control: max-age=31536000, immutable`.

use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

/// First 8 hex characters of the SHA-256 of `bytes`.
pub(crate) fn short_content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..4])
}

/// Errors from cache-busting configuration and URL generation.
#[derive(Debug)]
pub enum CacheBustError {
    /// The configuration or the supplied path is structurally invalid.
    InvalidArgument {
        /// What was wrong.
        reason: String,
    },
    /// The referenced file does not exist beneath the root.
    PathNotFound {
        /// The offending URL path.
        path: String,
    },
    /// Reading the file failed.
    Io(io::Error),
}

impl fmt::Display for CacheBustError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheBustError::InvalidArgument { reason } => {
                write!(f, "invalid cache-busting argument: {reason}")
            }
            CacheBustError::PathNotFound { path } => {
                write!(f, "no file behind asset path `{path}`")
            }
            CacheBustError::Io(err) => write!(f, "cache busting failed to read: {err}"),
        }
    }
}

impl std::error::Error for CacheBustError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheBustError::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Where busted assets live and how their names are built.
#[derive(Clone, Debug)]
pub struct CacheBustingConfig {
    mount_prefix: String,
    file_system_root: PathBuf,
    separator: String,
}

impl CacheBustingConfig {
    /// Validate and build a configuration.
    ///
    /// `mount_prefix` must begin with `/`; `separator` must be non-empty
    /// and free of `/`; `file_system_root` must exist now — a typo in the
    /// root should fail deployment, not every request.
    pub fn new(
        mount_prefix: impl Into<String>,
        file_system_root: impl Into<PathBuf>,
        separator: impl Into<String>,
    ) -> Result<Self, CacheBustError> {
        let mount_prefix = mount_prefix.into();
        let file_system_root = file_system_root.into();
        let separator = separator.into();

        if !mount_prefix.starts_with('/') {
            return Err(CacheBustError::InvalidArgument {
                reason: format!("mount prefix `{mount_prefix}` must begin with `/`"),
            });
        }
        if separator.is_empty() || separator.contains('/') {
            return Err(CacheBustError::InvalidArgument {
                reason: "separator must be non-empty and must not contain `/`".to_owned(),
            });
        }
        match std::fs::metadata(&file_system_root) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => {
                return Err(CacheBustError::InvalidArgument {
                    reason: format!(
                        "file system root `{}` is not a directory",
                        file_system_root.display()
                    ),
                })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(CacheBustError::InvalidArgument {
                    reason: format!(
                        "file system root `{}` does not exist",
                        file_system_root.display()
                    ),
                })
            }
            Err(err) => return Err(CacheBustError::Io(err)),
        }

        Ok(CacheBustingConfig {
            mount_prefix,
            file_system_root,
            separator,
        })
    }

    /// The URL prefix busted assets are served under.
    pub fn mount_prefix(&self) -> &str {
        &self.mount_prefix
    }

    /// The busted form of `path` (a URL path beneath the mount prefix):
    /// `/assets/app.js` becomes `/assets/app@<hash>.js`.
    ///
    /// Fails with [`CacheBustError::PathNotFound`] when the file does not
    /// exist and with [`CacheBustError::InvalidArgument`] when the path
    /// escapes the configured root.
    pub fn asset_path(&self, path: &str) -> Result<String, CacheBustError> {
        let relative = path.strip_prefix(self.mount_prefix.as_str()).ok_or_else(|| {
            CacheBustError::InvalidArgument {
                reason: format!(
                    "`{path}` is not beneath the mount prefix `{}`",
                    self.mount_prefix
                ),
            }
        })?;

        let file_path = self.resolve(relative)?;
        let bytes = match std::fs::read(&file_path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(CacheBustError::PathNotFound {
                    path: path.to_owned(),
                })
            }
            Err(err) => return Err(CacheBustError::Io(err)),
        };
        let hash = short_content_hash(&bytes);

        let (directory, file_name) = match path.rsplit_once('/') {
            Some((directory, file_name)) => (directory, file_name),
            None => ("", path),
        };
        let busted = match file_name.rsplit_once('.') {
            Some((base, extension)) => {
                format!("{base}{}{hash}.{extension}", self.separator)
            }
            None => format!("{file_name}{}{hash}", self.separator),
        };
        Ok(format!("{directory}/{busted}"))
    }

    /// Like [`asset_path`](CacheBustingConfig::asset_path), but a miss
    /// returns the path unchanged.
    pub fn try_asset_path(&self, path: &str) -> String {
        self.asset_path(path).unwrap_or_else(|_| path.to_owned())
    }

    /// Undo the busting on one file-name segment: `app@deadbeef01.js`
    /// yields `("app.js", "deadbeef01")`.
    pub(crate) fn rewrite_segment(&self, segment: &str) -> Option<(String, String)> {
        let (base, rest) = segment.rsplit_once(self.separator.as_str())?;
        if base.is_empty() {
            return None;
        }
        let (hash, extension) = match rest.split_once('.') {
            Some((hash, extension)) => (hash, Some(extension)),
            None => (rest, None),
        };
        if hash.is_empty() || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let clean = match extension {
            Some(extension) => format!("{base}.{extension}"),
            None => base.to_owned(),
        };
        Some((clean, hash.to_owned()))
    }

    /// Map a mount-relative URL path to a file path, refusing escapes.
    fn resolve(&self, relative: &str) -> Result<PathBuf, CacheBustError> {
        let mut out = self.file_system_root.clone();
        for component in Path::new(relative.trim_start_matches('/')).components() {
            match component {
                Component::Normal(segment) => out.push(segment),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(CacheBustError::InvalidArgument {
                        reason: format!("`{relative}` escapes the configured root"),
                    })
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(dir: &Path) -> CacheBustingConfig {
        CacheBustingConfig::new("/assets", dir, "@").unwrap()
    }

    #[test]
    fn validation() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CacheBustingConfig::new("assets", dir.path(), "@").is_err());
        assert!(CacheBustingConfig::new("/assets", dir.path(), "").is_err());
        assert!(CacheBustingConfig::new("/assets", dir.path(), "a/b").is_err());
        assert!(CacheBustingConfig::new("/assets", dir.path().join("nope"), "@").is_err());
        assert!(CacheBustingConfig::new("/assets", dir.path(), "@").is_ok());
    }

    #[test]
    fn asset_path_embeds_the_hash() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("app.js")).unwrap();
        file.write_all(b"console.log(1)").unwrap();

        let config = config(dir.path());
        let busted = config.asset_path("/assets/app.js").unwrap();
        let expected_hash = short_content_hash(b"console.log(1)");
        assert_eq!(busted, format!("/assets/app@{expected_hash}.js"));
    }

    #[test]
    fn missing_files_fail_and_try_returns_original() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        assert!(matches!(
            config.asset_path("/assets/ghost.js"),
            Err(CacheBustError::PathNotFound { .. })
        ));
        assert_eq!(config.try_asset_path("/assets/ghost.js"), "/assets/ghost.js");
    }

    #[test]
    fn escapes_are_invalid_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        assert!(matches!(
            config.asset_path("/assets/../secret"),
            Err(CacheBustError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn rewrite_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        assert_eq!(
            config.rewrite_segment("app@deadbeef.js"),
            Some(("app.js".to_owned(), "deadbeef".to_owned()))
        );
        assert_eq!(
            config.rewrite_segment("archive@ff00"),
            Some(("archive".to_owned(), "ff00".to_owned()))
        );
        assert_eq!(config.rewrite_segment("plain.js"), None);
        assert_eq!(config.rewrite_segment("@abc.js"), None);
        assert_eq!(config.rewrite_segment("app@not-hex.js"), None);
    }
}
