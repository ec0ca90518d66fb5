//! The unified body model.
//!
//! A [`Body`] is one logical byte sequence behind a stream that can be
//! subscribed to exactly once. The second read does not silently yield
//! nothing, it fails with [`BodyError::AlreadyConsumed`] — a consumed body
//! is a programming error worth hearing about.
//!
//! ```rust
//! # use relic::body::{Body, BodyError};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let body = Body::from_text("hello", None);
//! assert_eq!(body.content_length(), Some(5));
//! assert_eq!(body.read_string(None).await.unwrap(), "hello");
//! assert!(matches!(body.read(), Err(BodyError::AlreadyConsumed)));
//! # }
//! ```

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Mutex;

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::StreamExt;
use mime::Mime;

mod limit;
mod sniff;

pub use self::limit::LimitedStream;

/// The stream of byte chunks behind a [`Body`].
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'static>>;

/// A character encoding a text body can be declared in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Charset {
    /// UTF-8, the default everywhere.
    #[default]
    Utf8,
    /// US-ASCII.
    Ascii,
    /// ISO-8859-1.
    Latin1,
}

impl Charset {
    /// Resolve an IANA charset label.
    pub fn from_label(label: &str) -> Option<Charset> {
        match label.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "us-ascii" | "ascii" => Some(Charset::Ascii),
            "iso-8859-1" | "latin1" | "latin-1" => Some(Charset::Latin1),
            _ => None,
        }
    }

    /// The canonical label.
    pub fn label(self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::Ascii => "us-ascii",
            Charset::Latin1 => "iso-8859-1",
        }
    }

    fn encode(self, text: &str) -> Bytes {
        match self {
            Charset::Utf8 => Bytes::copy_from_slice(text.as_bytes()),
            // unencodable characters degrade to `?`, like every classic
            // transcoder
            Charset::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect::<Vec<u8>>()
                .into(),
            Charset::Latin1 => text
                .chars()
                .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
                .collect::<Vec<u8>>()
                .into(),
        }
    }

    fn decode(self, bytes: &[u8]) -> Result<String, BodyError> {
        match self {
            Charset::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|_| BodyError::InvalidText { charset: self }),
            Charset::Ascii => {
                if bytes.is_ascii() {
                    Ok(String::from_utf8_lossy(bytes).into_owned())
                } else {
                    Err(BodyError::InvalidText { charset: self })
                }
            }
            Charset::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

/// The declared shape of a body: a media type plus an optional charset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodyType {
    mime: Mime,
    charset: Option<Charset>,
}

impl BodyType {
    /// A body type from a bare media type. A `charset` parameter on the
    /// media type is picked up when recognized.
    pub fn new(mime: Mime) -> Self {
        let charset = mime
            .get_param(mime::CHARSET)
            .and_then(|v| Charset::from_label(v.as_str()));
        BodyType { mime, charset }
    }

    /// A body type with an explicit charset.
    pub fn with_charset(mime: Mime, charset: Charset) -> Self {
        BodyType {
            mime,
            charset: Some(charset),
        }
    }

    /// The media type.
    pub fn mime(&self) -> &Mime {
        &self.mime
    }

    /// The declared charset, if any.
    pub fn charset(&self) -> Option<Charset> {
        self.charset
    }
}

/// Errors produced by the body engine.
#[derive(Debug)]
pub enum BodyError {
    /// The stream was already handed out once.
    AlreadyConsumed,
    /// The cumulative bytes read exceeded the configured maximum.
    PayloadTooLarge {
        /// The limit that was crossed.
        limit: u64,
    },
    /// The bytes were not valid under the expected charset.
    InvalidText {
        /// The charset that failed.
        charset: Charset,
    },
    /// The underlying stream failed.
    Io(io::Error),
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyError::AlreadyConsumed => f.write_str("body stream was already consumed"),
            BodyError::PayloadTooLarge { limit } => {
                write!(f, "body exceeds the configured maximum of {limit} bytes")
            }
            BodyError::InvalidText { charset } => {
                write!(f, "body is not valid {}", charset.label())
            }
            BodyError::Io(err) => write!(f, "body stream failed: {err}"),
        }
    }
}

impl std::error::Error for BodyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BodyError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for BodyError {
    fn from(err: io::Error) -> Self {
        // a limit stream smuggles its typed error through `io::Error`
        if limit::is_payload_too_large(&err) {
            match err.into_inner().and_then(|e| e.downcast::<BodyError>().ok()) {
                Some(inner) => *inner,
                None => BodyError::PayloadTooLarge { limit: 0 },
            }
        } else {
            BodyError::Io(err)
        }
    }
}

/// One logical byte sequence with an optional known length and declared
/// type. See the [module docs](self).
pub struct Body {
    stream: Mutex<Option<ByteStream>>,
    content_length: Option<u64>,
    body_type: Option<BodyType>,
}

impl Body {
    /// An empty body of known zero length.
    pub fn empty() -> Self {
        Body {
            stream: Mutex::new(Some(Box::pin(futures_util::stream::empty()))),
            content_length: Some(0),
            body_type: None,
        }
    }

    /// A body from a string, encoded under the declared charset (UTF-8 when
    /// none). The media type is sniffed from the content unless `body_type`
    /// is given.
    pub fn from_text(text: impl AsRef<str>, body_type: Option<BodyType>) -> Self {
        let text = text.as_ref();
        let body_type = body_type.unwrap_or_else(|| {
            BodyType::with_charset(sniff::sniff_text(text), Charset::Utf8)
        });
        let encoded = body_type.charset.unwrap_or_default().encode(text);
        let content_length = encoded.len() as u64;
        Body {
            stream: Mutex::new(Some(Box::pin(futures_util::stream::once(async move {
                Ok(encoded)
            })))),
            content_length: Some(content_length),
            body_type: Some(body_type),
        }
    }

    /// A body from raw bytes. The media type is sniffed from magic prefixes
    /// unless `body_type` is given.
    pub fn from_bytes(bytes: impl Into<Bytes>, body_type: Option<BodyType>) -> Self {
        let bytes = bytes.into();
        let body_type = body_type.unwrap_or_else(|| BodyType::new(sniff::sniff_bytes(&bytes)));
        let content_length = bytes.len() as u64;
        Body {
            stream: Mutex::new(Some(Box::pin(futures_util::stream::once(async move {
                Ok(bytes)
            })))),
            content_length: Some(content_length),
            body_type: Some(body_type),
        }
    }

    /// A body from an arbitrary stream. Pass `content_length` when the total
    /// is known up front, it is what enables `Content-Length` framing.
    pub fn from_stream<S>(stream: S, content_length: Option<u64>, body_type: Option<BodyType>) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Body {
            stream: Mutex::new(Some(Box::pin(stream))),
            content_length,
            body_type,
        }
    }

    /// The total size in bytes, when known. Bytes, not characters.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// The declared or detected body type.
    pub fn body_type(&self) -> Option<&BodyType> {
        self.body_type.as_ref()
    }

    /// Whether the stream was already handed out.
    pub fn is_consumed(&self) -> bool {
        self.stream.lock().expect("body stream poisoned").is_none()
    }

    /// Take the stream. This is the one-shot subscription: every later call
    /// fails with [`BodyError::AlreadyConsumed`].
    pub fn read(&self) -> Result<ByteStream, BodyError> {
        self.stream
            .lock()
            .expect("body stream poisoned")
            .take()
            .ok_or(BodyError::AlreadyConsumed)
    }

    /// Collect the whole body into one buffer. Consumes the stream.
    pub async fn read_bytes(&self) -> Result<Bytes, BodyError> {
        let mut stream = self.read()?;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Collect the whole body and decode it as text. Consumes the stream.
    ///
    /// The charset is taken from the body type when declared, else from
    /// `charset`, else UTF-8.
    pub async fn read_string(&self, charset: Option<Charset>) -> Result<String, BodyError> {
        let effective = self
            .body_type
            .as_ref()
            .and_then(|bt| bt.charset)
            .or(charset)
            .unwrap_or_default();
        let bytes = self.read_bytes().await?;
        effective.decode(&bytes)
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::empty()
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::from_text(text, None)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::from_text(text, None)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::from_bytes(bytes, None)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::from_bytes(bytes, None)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("content_length", &self.content_length)
            .field("body_type", &self.body_type)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn one_shot_reads() {
        let body = Body::from_text("hello", None);
        assert_eq!(body.read_string(None).await.unwrap(), "hello");
        assert!(matches!(body.read(), Err(BodyError::AlreadyConsumed)));
        assert!(matches!(
            body.read_bytes().await,
            Err(BodyError::AlreadyConsumed)
        ));
    }

    #[tokio::test]
    async fn content_length_matches_chunks() {
        let body = Body::from_bytes(vec![1u8, 2, 3, 4], None);
        let expected = body.content_length().unwrap();
        let mut stream = body.read().unwrap();
        let mut total = 0;
        while let Some(chunk) = stream.next().await {
            total += chunk.unwrap().len() as u64;
        }
        assert_eq!(total, expected);
    }

    #[test]
    fn text_sniffs_json() {
        let body = Body::from_text("{\"a\": 1}", None);
        assert_eq!(
            body.body_type().unwrap().mime().essence_str(),
            "application/json"
        );
    }

    #[test]
    fn bytes_sniff_png() {
        let body = Body::from_bytes(
            vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 1, 2],
            None,
        );
        assert_eq!(body.body_type().unwrap().mime(), &mime::IMAGE_PNG);
    }

    #[test]
    fn declared_type_skips_sniffing() {
        let body = Body::from_text(
            "{\"a\": 1}",
            Some(BodyType::new(mime::TEXT_PLAIN)),
        );
        assert_eq!(body.body_type().unwrap().mime(), &mime::TEXT_PLAIN);
    }

    #[tokio::test]
    async fn latin1_round_trip() {
        let body_type = BodyType::with_charset(mime::TEXT_PLAIN, Charset::Latin1);
        let body = Body::from_text("café", Some(body_type));
        // é is one byte in latin-1
        assert_eq!(body.content_length(), Some(4));
        assert_eq!(body.read_string(None).await.unwrap(), "café");
    }

    #[tokio::test]
    async fn charset_priority_is_body_type_then_caller() {
        let bytes = vec![0xE9]; // é in latin-1, invalid utf-8
        let body = Body::from_bytes(bytes.clone(), Some(BodyType::new(mime::APPLICATION_OCTET_STREAM)));
        assert_eq!(body.read_string(Some(Charset::Latin1)).await.unwrap(), "é");

        let body = Body::from_bytes(bytes, None);
        assert!(matches!(
            body.read_string(None).await,
            Err(BodyError::InvalidText { .. })
        ));
    }

    #[tokio::test]
    async fn empty_body() {
        let body = Body::empty();
        assert_eq!(body.content_length(), Some(0));
        assert_eq!(body.read_bytes().await.unwrap().len(), 0);
    }

    #[test]
    fn charset_labels() {
        assert_eq!(Charset::from_label("UTF-8"), Some(Charset::Utf8));
        assert_eq!(Charset::from_label("ISO-8859-1"), Some(Charset::Latin1));
        assert_eq!(Charset::from_label("utf-16"), None);
    }
}
