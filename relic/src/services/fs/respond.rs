//! Response assembly for the file handlers.

use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use http::StatusCode;
use mime::Mime;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use super::open_file::FileOpened;
use crate::body::{Body, BodyType, ByteStream};
use crate::headers::typed::{
    AcceptRanges, CacheControl, ContentRange, ContentType, ETag, LastModified,
};
use crate::message::Response;

pub(crate) fn not_found() -> Response {
    Response::not_found()
}

pub(crate) fn not_modified() -> Response {
    Response::not_modified()
}

pub(crate) fn method_not_allowed() -> Response {
    Response::builder(StatusCode::METHOD_NOT_ALLOWED)
        .header(&crate::headers::typed::Allow(vec![
            http::Method::GET,
            http::Method::HEAD,
        ]))
        .build()
}

pub(crate) fn range_not_satisfiable(size: u64) -> Response {
    Response::builder(StatusCode::RANGE_NOT_SATISFIABLE)
        .header(&ContentRange::unsatisfied(size))
        .header(&AcceptRanges::Bytes)
        .build()
}

pub(crate) fn file_response(file: FileOpened, chunk_size: usize) -> Response {
    let mut builder = Response::builder(StatusCode::OK)
        .header(&AcceptRanges::Bytes)
        .header(&ETag(file.etag.clone()));
    if let Some(modified) = file.last_modified {
        builder = builder.header(&LastModified::from(modified));
    }
    if file.immutable {
        builder = builder.header(
            &CacheControl::new()
                .with_max_age(std::time::Duration::from_secs(31_536_000))
                .with_immutable(),
        );
    }

    match file.ranges {
        None => builder
            .header(&ContentType::new(file.mime.clone()))
            .body(Body::from_stream(
                file_stream(file.path, None, chunk_size),
                Some(file.size),
                Some(BodyType::new(file.mime)),
            ))
            .build(),
        Some(ranges) if ranges.len() == 1 => {
            let (start, end) = ranges[0];
            builder
                .header(&ContentType::new(file.mime.clone()))
                .header(&ContentRange::bytes(start, end, Some(file.size)))
                .body(Body::from_stream(
                    file_stream(file.path, Some((start, end)), chunk_size),
                    Some(end - start + 1),
                    Some(BodyType::new(file.mime)),
                ))
                .build()
                .with_status(StatusCode::PARTIAL_CONTENT)
        }
        Some(ranges) => {
            let boundary = generate_boundary();
            let multipart_mime: Mime = format!("multipart/byteranges; boundary={boundary}")
                .parse()
                .unwrap_or(mime::APPLICATION_OCTET_STREAM);

            let mut total: u64 = 0;
            let mut body: ByteStream = Box::pin(futures_util::stream::empty());
            for (index, (start, end)) in ranges.iter().copied().enumerate() {
                let lead = if index == 0 { "" } else { "\r\n" };
                let part_head = format!(
                    "{lead}--{boundary}\r\nContent-Type: {}\r\nContent-Range: bytes {start}-{end}/{}\r\n\r\n",
                    file.mime, file.size
                );
                total += part_head.len() as u64 + (end - start + 1);
                let head_chunk =
                    futures_util::stream::once(async move { Ok(Bytes::from(part_head)) });
                body = Box::pin(body.chain(head_chunk).chain(file_stream(
                    file.path.clone(),
                    Some((start, end)),
                    chunk_size,
                )));
            }
            let trailer = format!("\r\n--{boundary}--\r\n");
            total += trailer.len() as u64;
            body = Box::pin(body.chain(futures_util::stream::once(async move {
                Ok(Bytes::from(trailer))
            })));

            builder
                .header(&ContentType::new(multipart_mime.clone()))
                .body(Body::from_stream(
                    body,
                    Some(total),
                    Some(BodyType::new(multipart_mime)),
                ))
                .build()
                .with_status(StatusCode::PARTIAL_CONTENT)
        }
    }
}

/// A lazily-opened stream over the file, or a slice of it. Nothing touches
/// the file system until the first poll, so bodies that are dropped
/// unread (HEAD requests) cost nothing.
fn file_stream(path: PathBuf, range: Option<(u64, u64)>, chunk_size: usize) -> ByteStream {
    Box::pin(
        futures_util::stream::once(async move {
            let mut file = tokio::fs::File::open(&path).await?;
            let take = match range {
                Some((start, end)) => {
                    file.seek(SeekFrom::Start(start)).await?;
                    end - start + 1
                }
                None => u64::MAX,
            };
            Ok::<_, io::Error>(ReaderStream::with_capacity(file.take(take), chunk_size))
        })
        .try_flatten(),
    )
}

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_boundary() -> String {
    use sha2::{Digest, Sha256};
    let count = BOUNDARY_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut hasher = Sha256::new();
    hasher.update(count.to_be_bytes());
    hasher.update(std::process::id().to_be_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..12])
}
