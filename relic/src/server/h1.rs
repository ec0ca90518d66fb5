//! HTTP/1.1 wire codec: strict head parsing, body framing decisions, and
//! response emission.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use bytes::{Buf, BytesMut};
use futures_util::StreamExt;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode, Uri, Version};
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::body::Body;
use crate::message::Response;

const MAX_HEADERS: usize = 96;

/// The request could not be read as HTTP/1.1.
#[derive(Debug)]
pub(crate) enum HeadError {
    /// Malformed request line, header, or framing; answer `400`.
    BadRequest(&'static str),
    /// The head outgrew the configured cap; answer `431`-ish `400`.
    TooLarge,
}

impl fmt::Display for HeadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadError::BadRequest(reason) => write!(f, "malformed request: {reason}"),
            HeadError::TooLarge => f.write_str("request head too large"),
        }
    }
}

impl std::error::Error for HeadError {}

/// A fully parsed request head.
#[derive(Debug)]
pub(crate) struct ParsedHead {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
}

/// How the request body is framed on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BodyFraming {
    Empty,
    Sized(u64),
    Chunked,
}

/// Try to parse a complete head out of `buffer`.
///
/// `Ok(None)` means more bytes are needed. On success the consumed length
/// is returned alongside the head.
pub(crate) fn parse_head(buffer: &[u8]) -> Result<Option<(ParsedHead, usize)>, HeadError> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut slots);
    let consumed = match parsed.parse(buffer) {
        Ok(httparse::Status::Complete(consumed)) => consumed,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(_) => return Err(HeadError::BadRequest("unparseable head")),
    };

    let method = parsed
        .method
        .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
        .ok_or(HeadError::BadRequest("invalid method"))?;
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        _ => return Err(HeadError::BadRequest("unsupported version")),
    };
    let uri: Uri = parsed
        .path
        .ok_or(HeadError::BadRequest("missing target"))?
        .parse()
        .map_err(|_| HeadError::BadRequest("invalid target"))?;

    let mut headers = HeaderMap::with_capacity(parsed.headers.len());
    for header in parsed.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|_| HeadError::BadRequest("invalid header name"))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|_| HeadError::BadRequest("invalid header value"))?;
        headers.append(name, value);
    }

    Ok(Some((
        ParsedHead {
            method,
            uri,
            version,
            headers,
        },
        consumed,
    )))
}

/// Decide the request body framing from the raw headers.
///
/// `Transfer-Encoding: chunked` and `Content-Length` are mutually
/// exclusive; duplicated `Content-Length` values must agree.
pub(crate) fn request_body_framing(headers: &HeaderMap) -> Result<BodyFraming, HeadError> {
    let mut chunked = false;
    for value in headers.get_all(http::header::TRANSFER_ENCODING) {
        let value = value
            .to_str()
            .map_err(|_| HeadError::BadRequest("invalid transfer-encoding"))?;
        for coding in value.split(',') {
            match coding.trim().to_ascii_lowercase().as_str() {
                "chunked" => chunked = true,
                "identity" | "" => {}
                _ => return Err(HeadError::BadRequest("unsupported transfer coding")),
            }
        }
    }

    let mut length: Option<u64> = None;
    for value in headers.get_all(http::header::CONTENT_LENGTH) {
        let parsed: u64 = value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .ok_or(HeadError::BadRequest("invalid content-length"))?;
        match length {
            Some(previous) if previous != parsed => {
                return Err(HeadError::BadRequest("conflicting content-lengths"));
            }
            _ => length = Some(parsed),
        }
    }

    match (chunked, length) {
        (true, Some(_)) => Err(HeadError::BadRequest(
            "chunked and content-length are mutually exclusive",
        )),
        (true, None) => Ok(BodyFraming::Chunked),
        (false, Some(0)) | (false, None) => Ok(if length.is_some() {
            BodyFraming::Sized(0)
        } else {
            BodyFraming::Empty
        }),
        (false, Some(n)) => Ok(BodyFraming::Sized(n)),
    }
}

/// How the response body goes on the wire.
enum ResponseFraming {
    /// 1xx/204/304: header-only by definition.
    None,
    /// A known length.
    Sized(u64),
    /// Unknown length, chunked transfer coding.
    Chunked,
}

/// Serialize `response` onto `writer`.
///
/// `head_only` keeps every header (including `Content-Length`) but drops
/// the body bytes — the HEAD contract. `close_after` advertises
/// `Connection: close`.
pub(crate) async fn write_response<W>(
    writer: &mut W,
    response: Response,
    head_only: bool,
    close_after: bool,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let status = response.status();
    let framing = if status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        ResponseFraming::None
    } else {
        // the body's own length is authoritative, a hand-set
        // Content-Length header is replaced by it
        match response.body().content_length() {
            Some(length) => ResponseFraming::Sized(length),
            None => ResponseFraming::Chunked,
        }
    };

    let mut head = BytesMut::with_capacity(256);
    head.extend_from_slice(b"HTTP/1.1 ");
    head.extend_from_slice(status.as_str().as_bytes());
    head.extend_from_slice(b" ");
    head.extend_from_slice(status.canonical_reason().unwrap_or("Unknown").as_bytes());
    head.extend_from_slice(b"\r\n");

    let headers = response.headers();
    let mut wrote_date = false;
    let mut wrote_server = false;
    let mut wrote_powered_by = false;
    static X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");
    for (name, value) in headers.iter() {
        // framing headers are owned by the emitter; that includes
        // Connection whenever the adapter is closing, since a handler-set
        // `keep-alive` next to the adapter's `close` would put two
        // Connection lines on the wire (upgrade responses keep theirs,
        // the adapter writes none then)
        if *name == http::header::CONTENT_LENGTH
            || *name == http::header::TRANSFER_ENCODING
            || (*name == http::header::CONNECTION && close_after)
        {
            continue;
        }
        wrote_date |= *name == http::header::DATE;
        wrote_server |= *name == http::header::SERVER;
        wrote_powered_by |= *name == X_POWERED_BY;
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }

    if !wrote_date {
        head.extend_from_slice(b"date: ");
        head.extend_from_slice(httpdate::fmt_http_date(std::time::SystemTime::now()).as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    if !wrote_server {
        head.extend_from_slice(b"server: relic\r\n");
    }
    if !wrote_powered_by {
        head.extend_from_slice(b"x-powered-by: Relic\r\n");
    }
    if close_after {
        head.extend_from_slice(b"connection: close\r\n");
    }

    match framing {
        ResponseFraming::None => {}
        ResponseFraming::Sized(length) => {
            head.extend_from_slice(b"content-length: ");
            head.extend_from_slice(length.to_string().as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        ResponseFraming::Chunked => {
            head.extend_from_slice(b"transfer-encoding: chunked\r\n");
        }
    }
    head.extend_from_slice(b"\r\n");
    writer.write_all(&head).await?;

    if !head_only {
        match framing {
            ResponseFraming::None => {}
            ResponseFraming::Sized(_) => {
                if let Ok(mut stream) = response.body().read() {
                    while let Some(chunk) = stream.next().await {
                        writer.write_all(&chunk?).await?;
                    }
                }
            }
            ResponseFraming::Chunked => {
                if let Ok(mut stream) = response.body().read() {
                    while let Some(chunk) = stream.next().await {
                        let chunk = chunk?;
                        if chunk.is_empty() {
                            continue;
                        }
                        writer
                            .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
                            .await?;
                        writer.write_all(&chunk).await?;
                        writer.write_all(b"\r\n").await?;
                    }
                }
                writer.write_all(b"0\r\n\r\n").await?;
            }
        }
    }

    writer.flush().await
}

pin_project! {
    /// A byte channel that replays buffered-but-unconsumed bytes before
    /// reading from the underlying stream. Hijacked connections receive
    /// one of these so nothing the engine already pulled off the socket
    /// is lost.
    pub(crate) struct Rewind<S> {
        prefix: BytesMut,
        #[pin]
        inner: S,
    }
}

impl<S> Rewind<S> {
    pub(crate) fn new(prefix: BytesMut, inner: S) -> Self {
        Rewind { prefix, inner }
    }
}

impl<S: AsyncRead> AsyncRead for Rewind<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        if !this.prefix.is_empty() {
            let n = this.prefix.len().min(buf.remaining());
            buf.put_slice(&this.prefix[..n]);
            this.prefix.advance(n);
            return Poll::Ready(Ok(()));
        }
        this.inner.poll_read(cx, buf)
    }
}

impl<S: AsyncWrite> AsyncWrite for Rewind<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}

/// A body wrapping for error responses generated by the adapter itself.
pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    Response::builder(status)
        .body(Body::from_text(message, None))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_head() {
        let raw = b"GET /a/b?x=1 HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\nrest";
        let (head, consumed) = parse_head(raw).unwrap().unwrap();
        assert_eq!(head.method, Method::GET);
        assert_eq!(head.uri.path(), "/a/b");
        assert_eq!(head.version, Version::HTTP_11);
        assert_eq!(head.headers.len(), 2);
        assert_eq!(&raw[consumed..], b"rest");
    }

    #[test]
    fn partial_heads_ask_for_more() {
        assert!(parse_head(b"GET / HTTP/1.1\r\nHost: exam").unwrap().is_none());
    }

    #[test]
    fn garbage_is_a_bad_request() {
        assert!(parse_head(b"NOT AN HTTP REQUEST\r\n\r\n").is_err());
    }

    #[test]
    fn framing_rules() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_body_framing(&headers).unwrap(), BodyFraming::Empty);

        headers.insert(http::header::CONTENT_LENGTH, "5".parse().unwrap());
        assert_eq!(
            request_body_framing(&headers).unwrap(),
            BodyFraming::Sized(5)
        );

        let mut headers = HeaderMap::new();
        headers.insert(http::header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        assert_eq!(request_body_framing(&headers).unwrap(), BodyFraming::Chunked);

        headers.insert(http::header::CONTENT_LENGTH, "5".parse().unwrap());
        assert!(request_body_framing(&headers).is_err());
    }

    #[tokio::test]
    async fn sized_emission_uses_content_length() {
        let response = Response::ok(Body::from_text("hello", None));
        let mut out = Vec::new();
        write_response(&mut out, response, false, false).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-length: 5\r\n"));
        assert!(!text.contains("transfer-encoding"));
        assert!(text.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn unknown_length_goes_chunked() {
        let stream = futures_util::stream::iter(vec![
            Ok(bytes::Bytes::from_static(b"he")),
            Ok(bytes::Bytes::from_static(b"llo")),
        ]);
        let response = Response::ok(Body::from_stream(stream, None, None));
        let mut out = Vec::new();
        write_response(&mut out, response, false, false).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("transfer-encoding: chunked\r\n"));
        assert!(text.ends_with("2\r\nhe\r\n3\r\nllo\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn not_modified_has_no_framing() {
        let response = Response::not_modified();
        let mut out = Vec::new();
        write_response(&mut out, response, false, false).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("content-length"));
        assert!(!text.contains("transfer-encoding"));
    }

    #[tokio::test]
    async fn head_keeps_headers_drops_body() {
        let response = Response::ok(Body::from_text("hello", None));
        let mut out = Vec::new();
        write_response(&mut out, response, true, false).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("content-length: 5\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn user_date_and_server_are_honored() {
        let response = Response::ok(Body::empty())
            .with_headers(
                crate::Headers::builder()
                    .raw(http::header::SERVER, "custom/9".parse().unwrap())
                    .raw(
                        http::header::DATE,
                        "Sun, 06 Nov 1994 08:49:37 GMT".parse().unwrap(),
                    )
                    .build(),
            );
        let mut out = Vec::new();
        write_response(&mut out, response, false, false).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("server: custom/9\r\n"));
        assert!(text.contains("Sun, 06 Nov 1994 08:49:37 GMT\r\n"));
        assert_eq!(text.matches("date:").count() + text.matches("Date:").count(), 1);
    }

    #[tokio::test]
    async fn closing_owns_the_connection_header() {
        let keep_alive = || {
            Response::ok(Body::empty()).with_headers(
                crate::Headers::builder()
                    .raw(http::header::CONNECTION, "keep-alive".parse().unwrap())
                    .build(),
            )
        };

        let mut out = Vec::new();
        write_response(&mut out, keep_alive(), false, true).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("connection:").count(), 1);
        assert!(text.contains("connection: close\r\n"));
        assert!(!text.contains("keep-alive"));

        // without a close the handler's value goes through untouched
        let mut out = Vec::new();
        write_response(&mut out, keep_alive(), false, false).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("connection: keep-alive\r\n"));
    }

    #[tokio::test]
    async fn rewind_replays_the_prefix() {
        use tokio::io::AsyncReadExt;
        let (client, mut server) = tokio::io::duplex(64);
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            server.write_all(b"fresh").await.unwrap();
        });
        let mut rewind = Rewind::new(BytesMut::from(&b"buffered"[..]), client);
        let mut out = vec![0u8; 13];
        rewind.read_exact(&mut out).await.unwrap();
        assert_eq!(&out, b"bufferedfresh");
    }
}
