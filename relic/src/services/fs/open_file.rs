//! Path resolution, conditional requests, and range selection.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use mime::Mime;
use percent_encoding::percent_decode;

use super::cache_bust::short_content_hash;
use super::{ETagMode, OpenError, ServeDir, ServeVariant};
use crate::headers::typed::{
    EntityTag, HttpDate, IfModifiedSince, IfNoneMatch, IfRange, Range,
};
use crate::message::Request;

/// A file ready to be answered with.
#[derive(Debug)]
pub(crate) struct FileOpened {
    pub(crate) path: PathBuf,
    pub(crate) size: u64,
    pub(crate) mime: Mime,
    pub(crate) etag: EntityTag,
    pub(crate) last_modified: Option<SystemTime>,
    /// `None` for the full representation, resolved inclusive ranges
    /// otherwise.
    pub(crate) ranges: Option<Vec<(u64, u64)>>,
    /// Verified cache-busted request, eligible for immutable caching.
    pub(crate) immutable: bool,
}

#[derive(Debug)]
pub(crate) enum Opened {
    File(FileOpened),
    NotModified,
    RangeNotSatisfiable { size: u64 },
    NotFound,
}

pub(crate) async fn open(dir: &ServeDir, request: &Request) -> Result<Opened, OpenError> {
    let (path, expected_hash) = match resolve_path(dir, request) {
        Some(resolved) => resolved,
        None => return Ok(Opened::NotFound),
    };

    // symlinks may point anywhere; only the canonical location decides
    // whether the file is inside the tree
    if matches!(dir.variant, ServeVariant::Directory) {
        let canonical_root = tokio::fs::canonicalize(&dir.root).await?;
        let canonical = match tokio::fs::canonicalize(&path).await {
            Ok(canonical) => canonical,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Opened::NotFound),
            Err(err) => return Err(err.into()),
        };
        if !canonical.starts_with(&canonical_root) {
            return Ok(Opened::NotFound);
        }
    }

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Opened::NotFound),
        Err(err) => return Err(err.into()),
    };
    if metadata.is_dir() {
        return Ok(Opened::NotFound);
    }

    let size = metadata.len();
    let last_modified = metadata.modified().ok();

    let (etag, content_hash) = match dir.etag_mode {
        ETagMode::ContentHash => {
            let hash = short_content_hash(&tokio::fs::read(&path).await?);
            (EntityTag::strong(hash.clone()), Some(hash))
        }
        ETagMode::Metadata => {
            let seconds = last_modified
                .and_then(|m| m.duration_since(SystemTime::UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);
            (EntityTag::weak(format!("{seconds:x}-{size:x}")), None)
        }
    };

    let immutable = match &expected_hash {
        Some(expected) => {
            let current = match content_hash {
                Some(hash) => hash,
                None => short_content_hash(&tokio::fs::read(&path).await?),
            };
            current == *expected
        }
        None => false,
    };

    let headers = request.headers();

    // If-None-Match wins over If-Modified-Since when both are present
    if let Some(gate) = headers.get::<IfNoneMatch>().map_err(OpenError::Header)? {
        if gate.0.matches_weak(&etag) {
            return Ok(Opened::NotModified);
        }
    } else if let Some(gate) = headers
        .get::<IfModifiedSince>()
        .map_err(OpenError::Header)?
    {
        if let Some(modified) = last_modified {
            if HttpDate::from(modified) <= gate.date() {
                return Ok(Opened::NotModified);
            }
        }
    }

    let mut ranges = None;
    if let Some(range) = headers.get::<Range>().map_err(OpenError::Header)? {
        let honor = match headers.get::<IfRange>().map_err(OpenError::Header)? {
            Some(gate) => gate.matches(Some(&etag), last_modified),
            None => true,
        };
        if honor {
            let resolved: Vec<(u64, u64)> = range
                .specs()
                .iter()
                .filter_map(|spec| spec.resolve(size))
                .collect();
            if resolved.is_empty() {
                return Ok(Opened::RangeNotSatisfiable { size });
            }
            ranges = Some(resolved);
        }
    }

    let mime = (dir.mime_resolver.as_ref())(&path);

    Ok(Opened::File(FileOpened {
        path,
        size,
        mime,
        etag,
        last_modified,
        ranges,
        immutable,
    }))
}

/// Turn the request path into a file-system path beneath the root.
///
/// `None` means 404: hidden segments, traversal attempts, or undecodable
/// bytes. The second element is the expected content hash of a
/// cache-busted path.
fn resolve_path(dir: &ServeDir, request: &Request) -> Option<(PathBuf, Option<String>)> {
    match dir.variant {
        ServeVariant::SingleFile => Some((dir.root.clone(), None)),
        ServeVariant::Directory => {
            let mut path = dir.root.clone();
            let mut expected_hash = None;
            let segments = request.url().segments();
            for (index, raw) in segments.iter().enumerate() {
                let decoded = percent_decode(raw.as_bytes()).decode_utf8().ok()?;
                let mut segment = decoded.into_owned();
                if let (true, Some(config)) =
                    (index + 1 == segments.len(), &dir.cache_busting)
                {
                    if let Some((clean, hash)) = config.rewrite_segment(&segment) {
                        segment = clean;
                        expected_hash = Some(hash);
                    }
                }
                if segment.starts_with('.') {
                    // hidden files stay hidden, and this also swallows any
                    // decoded `..`
                    return None;
                }
                // a decoded segment must stay exactly one path component
                let candidate = Path::new(&segment);
                let mut components = candidate.components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => {}
                    _ => return None,
                }
                path.push(&segment);
            }
            Some((path, expected_hash))
        }
    }
}
