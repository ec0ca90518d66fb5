//! One task per connection: parse requests, drive the handler, emit
//! responses in order.

use std::io;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use http::{Method, StatusCode, Version};
use relic_handler::Handler;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::config::ServerConfig;
use super::h1::{
    self, error_response, BodyFraming, HeadError, ParsedHead, Rewind,
};
use crate::body::{Body, BodyError, LimitedStream};
use crate::context::{Context, Outcome};
use crate::handler::HandlerResult;
use crate::headers::{HeaderError, Headers};
use crate::message::{ConnectionInfo, Request, Response};
use crate::BoxError;

const MAX_CHUNK_LINE: usize = 256;

/// How the body feeder left the connection.
#[derive(Debug, PartialEq, Eq)]
enum FeedEnd {
    /// The framed body was consumed exactly; the connection is reusable.
    Complete,
    /// The body crossed the configured cap; the connection is poisoned.
    TooLarge,
    /// The transport failed mid-body.
    Failed,
}

pub(crate) async fn serve_connection<S, H>(
    mut stream: S,
    info: ConnectionInfo,
    handler: Arc<H>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    H: Handler<Context, Outcome = Context, Error = BoxError> + Send + Sync + 'static,
{
    let mut buffer = BytesMut::with_capacity(8 * 1024);

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let head = tokio::select! {
            head = read_head(&mut stream, &mut buffer, config.max_head_bytes) => head,
            // a request not yet begun is not in-flight; stop waiting for it
            _ = shutdown.cancelled() => return,
        };

        let head = match head {
            Ok(Some(head)) => head,
            // clean end of a keep-alive connection
            Ok(None) => return,
            Err(err) => {
                tracing::debug!(error = %err, "rejecting malformed request");
                let response = error_response(StatusCode::BAD_REQUEST, "Bad Request");
                let _ = h1::write_response(&mut stream, response, false, true).await;
                return;
            }
        };

        let framing = match h1::request_body_framing(&head.headers) {
            Ok(framing) => framing,
            Err(err) => {
                tracing::debug!(error = %err, "rejecting bad body framing");
                let response = error_response(StatusCode::BAD_REQUEST, "Bad Request");
                let _ = h1::write_response(&mut stream, response, false, true).await;
                return;
            }
        };

        // an announced oversized body is refused before reading a byte
        if let BodyFraming::Sized(n) = framing {
            if n > config.max_request_body_bytes {
                let response = error_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large");
                let _ = h1::write_response(&mut stream, response, false, true).await;
                return;
            }
        }

        let method = head.method.clone();
        let request_wants_close = wants_close(&head);

        // the handler-facing side of the body runs through the byte-cap
        // stream, so an oversized body surfaces as `PayloadTooLarge` at
        // the read site
        let (body, feeder_rx) = match framing {
            BodyFraming::Empty | BodyFraming::Sized(0) => (Body::empty(), None),
            BodyFraming::Sized(n) => {
                let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(8);
                let limited =
                    LimitedStream::new(channel_stream(rx), config.max_request_body_bytes);
                (Body::from_stream(limited, Some(n), None), Some(tx))
            }
            BodyFraming::Chunked => {
                let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(8);
                let limited =
                    LimitedStream::new(channel_stream(rx), config.max_request_body_bytes);
                (Body::from_stream(limited, None, None), Some(tx))
            }
        };

        let request = match build_request(head, body, info, &config) {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!(error = %err, "rejecting invalid headers");
                let response = error_response(StatusCode::BAD_REQUEST, "Bad Request");
                let _ = h1::write_response(&mut stream, response, false, true).await;
                return;
            }
        };

        let ctx = Context::new(request);
        // the outcome is extracted inside the joined future so the request
        // (and with it the body channel) is dropped as soon as the handler
        // finishes; otherwise a full channel would wedge the feeder against
        // a handler that never read its body
        let process = async {
            let result = handler.call(ctx).await;
            sanitize_result(result, &config)
        };
        let feed = feed_body(
            &mut stream,
            &mut buffer,
            feeder_rx,
            framing,
            config.max_request_body_bytes,
        );
        let (feed_end, result) = tokio::join!(feed, process);

        match result {
            Ok(outcome) => match outcome {
                Outcome::Response(response) => {
                    let close_after = request_wants_close
                        || feed_end != FeedEnd::Complete
                        || shutdown.is_cancelled();
                    let head_only = method == Method::HEAD;
                    if let Err(err) =
                        h1::write_response(&mut stream, response, head_only, close_after).await
                    {
                        tracing::debug!(error = %err, "connection failed while responding");
                        return;
                    }
                    if close_after {
                        return;
                    }
                }
                Outcome::Hijack(callback) => {
                    let channel = Rewind::new(std::mem::take(&mut buffer), stream);
                    callback(Box::new(channel)).await;
                    return;
                }
                Outcome::WebSocketUpgrade(response, callback) => {
                    let response = response.with_status(StatusCode::SWITCHING_PROTOCOLS);
                    if h1::write_response(&mut stream, response, false, false)
                        .await
                        .is_err()
                    {
                        return;
                    }
                    let channel = Rewind::new(std::mem::take(&mut buffer), stream);
                    callback(Box::new(channel)).await;
                    return;
                }
            },
            Err(response) => {
                // adapter-mapped error: always close, the request/body
                // state is unknown
                let _ = h1::write_response(&mut stream, response, false, true).await;
                return;
            }
        }
    }
}

/// Turn a handler result into either its outcome or an error response
/// owned by the adapter.
fn sanitize_result(result: HandlerResult, config: &ServerConfig) -> Result<Outcome, Response> {
    match result {
        Ok(ctx) => match ctx.into_outcome() {
            Ok((_, outcome)) => Ok(outcome),
            Err(err) => {
                tracing::error!(error = %err, "handler returned an unresolved context");
                Err(error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error",
                ))
            }
        },
        Err(err) => Err(map_error(err, config)),
    }
}

fn map_error(err: BoxError, config: &ServerConfig) -> Response {
    if let Some(header_err) = err.downcast_ref::<HeaderError>() {
        tracing::debug!(error = %header_err, "request failed on a malformed header");
        return error_response(StatusCode::BAD_REQUEST, "Bad Request");
    }
    if let Some(BodyError::PayloadTooLarge { .. }) = err.downcast_ref::<BodyError>() {
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large");
    }
    tracing::error!(error = %err, "handler failed");
    if config.sanitize_error_messages {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    } else {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Internal Server Error: {err}"),
        )
    }
}

fn build_request(
    head: ParsedHead,
    body: Body,
    info: ConnectionInfo,
    config: &ServerConfig,
) -> Result<Request, HeaderError> {
    let mut raw_headers = head.headers;
    // the body arrives already de-chunked; the framing header must not
    // survive into the typed view
    raw_headers.remove(http::header::TRANSFER_ENCODING);
    let headers = Headers::from_map(raw_headers);
    if config.strict_headers {
        headers.validate_known()?;
    }
    Ok(Request::builder(head.method, head.uri)
        .version(head.version)
        .headers(headers)
        .body(body)
        .connection_info(info)
        .build())
}

fn wants_close(head: &ParsedHead) -> bool {
    let mut close = head.version == Version::HTTP_10;
    for value in head.headers.get_all(http::header::CONNECTION) {
        if let Ok(value) = value.to_str() {
            for token in value.split(',') {
                match token.trim().to_ascii_lowercase().as_str() {
                    "close" => close = true,
                    "keep-alive" => close = false,
                    _ => {}
                }
            }
        }
    }
    close
}

fn channel_stream(
    rx: mpsc::Receiver<io::Result<Bytes>>,
) -> impl futures_core::Stream<Item = io::Result<Bytes>> + Send + 'static {
    futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}

/// Read until a full head is buffered. `Ok(None)` is a clean EOF before
/// any request byte.
async fn read_head<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
    max_head_bytes: usize,
) -> Result<Option<ParsedHead>, HeadError>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some((head, consumed)) = h1::parse_head(&buffer[..])? {
            buffer.advance(consumed);
            return Ok(Some(head));
        }
        if buffer.len() > max_head_bytes {
            return Err(HeadError::TooLarge);
        }
        match stream.read_buf(buffer).await {
            Ok(0) => {
                return if buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(HeadError::BadRequest("connection closed mid-head"))
                };
            }
            Ok(_) => {}
            Err(_) => return Err(HeadError::BadRequest("transport failure")),
        }
    }
}

/// Pump the framed request body from the socket into the handler's body
/// channel, enforcing the byte cap. Runs concurrently with the handler on
/// the same task.
async fn feed_body<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
    tx: Option<mpsc::Sender<io::Result<Bytes>>>,
    framing: BodyFraming,
    limit: u64,
) -> FeedEnd
where
    S: AsyncRead + Unpin,
{
    let tx = match tx {
        Some(tx) => tx,
        None => return FeedEnd::Complete,
    };

    match framing {
        BodyFraming::Empty | BodyFraming::Sized(0) => FeedEnd::Complete,
        BodyFraming::Sized(total) => {
            let mut remaining = total;
            while remaining > 0 {
                if buffer.is_empty() && !fill(stream, buffer).await {
                    let _ = tx
                        .send(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "connection closed mid-body",
                        )))
                        .await;
                    return FeedEnd::Failed;
                }
                let take = (buffer.len() as u64).min(remaining) as usize;
                let chunk = buffer.split_to(take).freeze();
                remaining -= take as u64;
                // a dropped receiver just means the handler never read the
                // body; keep draining so the connection stays framed
                let _ = tx.send(Ok(chunk)).await;
            }
            FeedEnd::Complete
        }
        BodyFraming::Chunked => feed_chunked(stream, buffer, tx, limit).await,
    }
}

async fn feed_chunked<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
    tx: mpsc::Sender<io::Result<Bytes>>,
    limit: u64,
) -> FeedEnd
where
    S: AsyncRead + Unpin,
{
    let mut sent: u64 = 0;
    loop {
        let line = match read_line(stream, buffer).await {
            Some(line) => line,
            None => return FeedEnd::Failed,
        };
        // chunk extensions after `;` are tolerated and ignored
        let size_text = line.split(';').next().unwrap_or("").trim();
        let size = match u64::from_str_radix(size_text, 16) {
            Ok(size) => size,
            Err(_) => {
                let _ = tx
                    .send(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "invalid chunk size",
                    )))
                    .await;
                return FeedEnd::Failed;
            }
        };

        if size == 0 {
            // trailer section: lines until the empty one
            loop {
                match read_line(stream, buffer).await {
                    Some(line) if line.is_empty() => return FeedEnd::Complete,
                    Some(_) => {}
                    None => return FeedEnd::Failed,
                }
            }
        }

        let mut remaining = size;
        while remaining > 0 {
            if buffer.is_empty() && !fill(stream, buffer).await {
                return FeedEnd::Failed;
            }
            let take = (buffer.len() as u64).min(remaining) as usize;
            let chunk = buffer.split_to(take).freeze();
            remaining -= take as u64;
            sent = sent.saturating_add(take as u64);
            let _ = tx.send(Ok(chunk)).await;
            if sent > limit {
                // the handler-side cap stream has tripped on this chunk;
                // stop reading, the connection is done for
                return FeedEnd::TooLarge;
            }
        }

        // the CRLF closing the chunk
        match read_line(stream, buffer).await {
            Some(line) if line.is_empty() => {}
            _ => {
                let _ = tx
                    .send(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "missing chunk terminator",
                    )))
                    .await;
                return FeedEnd::Failed;
            }
        }
    }
}

async fn fill<S>(stream: &mut S, buffer: &mut BytesMut) -> bool
where
    S: AsyncRead + Unpin,
{
    matches!(stream.read_buf(buffer).await, Ok(n) if n > 0)
}

/// Read one CRLF-terminated line, without the terminator. `None` on
/// transport failure or an absurd line.
async fn read_line<S>(stream: &mut S, buffer: &mut BytesMut) -> Option<String>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(position) = buffer.iter().position(|&b| b == b'\n') {
            let mut line = buffer.split_to(position + 1);
            line.truncate(position);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            return String::from_utf8(line.to_vec()).ok();
        }
        if buffer.len() > MAX_CHUNK_LINE {
            return None;
        }
        if !fill(stream, buffer).await {
            return None;
        }
    }
}
