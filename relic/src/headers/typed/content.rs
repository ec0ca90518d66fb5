//! Entity and framing headers.

use http::header::HeaderValue;
use mime::Mime;

use crate::headers::util::{
    comma_items, is_token, join_value, quote_if_needed, split_once_trim, str_value, unquote,
};
use crate::headers::{ParseHeaderError, TypedHeader};

/// `Content-Type`: the media type of the body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentType(Mime);

impl ContentType {
    /// Wrap a media type.
    pub fn new(mime: Mime) -> Self {
        ContentType(mime)
    }

    /// `application/json`.
    pub fn json() -> Self {
        ContentType(mime::APPLICATION_JSON)
    }

    /// `text/plain; charset=utf-8`.
    pub fn text_utf8() -> Self {
        ContentType(mime::TEXT_PLAIN_UTF_8)
    }

    /// `text/html; charset=utf-8`.
    pub fn html_utf8() -> Self {
        ContentType(mime::TEXT_HTML_UTF_8)
    }

    /// `application/octet-stream`.
    pub fn octet_stream() -> Self {
        ContentType(mime::APPLICATION_OCTET_STREAM)
    }

    /// The wrapped media type.
    pub fn mime(&self) -> &Mime {
        &self.0
    }

    /// Consume into the media type.
    pub fn into_mime(self) -> Mime {
        self.0
    }
}

impl From<Mime> for ContentType {
    fn from(mime: Mime) -> Self {
        ContentType(mime)
    }
}

impl TypedHeader for ContentType {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::CONTENT_TYPE)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        if values.len() != 1 {
            return Err(ParseHeaderError::new("expected exactly one media type"));
        }
        str_value(&values[0])?
            .trim()
            .parse::<Mime>()
            .map(ContentType)
            .map_err(|e| ParseHeaderError::new(format!("invalid media type: {e}")))
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(
            HeaderValue::from_str(self.0.as_ref())
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
        );
    }
}

/// `Content-Length`: the body size in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContentLength(u64);

impl ContentLength {
    /// Wrap a byte count.
    pub fn new(bytes: u64) -> Self {
        ContentLength(bytes)
    }

    /// The byte count.
    pub fn bytes(&self) -> u64 {
        self.0
    }
}

impl TypedHeader for ContentLength {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::CONTENT_LENGTH)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        // duplicate Content-Length lines are only acceptable when they agree
        let mut parsed: Option<u64> = None;
        for value in values {
            let s = str_value(value)?.trim();
            let n: u64 = s
                .parse()
                .map_err(|_| ParseHeaderError::new(format!("invalid content length `{s}`")))?;
            match parsed {
                Some(previous) if previous != n => {
                    return Err(ParseHeaderError::new("conflicting content lengths"));
                }
                _ => parsed = Some(n),
            }
        }
        parsed
            .map(ContentLength)
            .ok_or_else(|| ParseHeaderError::new("empty content length"))
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(HeaderValue::from(self.0));
    }
}

/// A content or transfer coding token (`gzip`, `chunked`, …).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Coding {
    /// No transformation.
    Identity,
    /// LZ77 with 32-bit CRC.
    Gzip,
    /// zlib.
    Deflate,
    /// Brotli.
    Brotli,
    /// Zstandard.
    Zstd,
    /// Chunked transfer framing.
    Chunked,
    /// `*` (only meaningful in `Accept-Encoding`).
    Any,
    /// A coding this library has no name for.
    Other(String),
}

impl Coding {
    pub(crate) fn parse_token(s: &str) -> Result<Self, ParseHeaderError> {
        let token = s.trim();
        Ok(match token {
            "identity" => Coding::Identity,
            "gzip" | "x-gzip" => Coding::Gzip,
            "deflate" => Coding::Deflate,
            "br" => Coding::Brotli,
            "zstd" => Coding::Zstd,
            "chunked" => Coding::Chunked,
            "*" => Coding::Any,
            other if is_token(other) => Coding::Other(other.to_ascii_lowercase()),
            other => {
                return Err(ParseHeaderError::new(format!("invalid coding `{other}`")));
            }
        })
    }

    pub(crate) fn token(&self) -> &str {
        match self {
            Coding::Identity => "identity",
            Coding::Gzip => "gzip",
            Coding::Deflate => "deflate",
            Coding::Brotli => "br",
            Coding::Zstd => "zstd",
            Coding::Chunked => "chunked",
            Coding::Any => "*",
            Coding::Other(token) => token,
        }
    }
}

macro_rules! coding_list_header {
    ($(#[$doc:meta])* $type:ident, $name:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub struct $type(pub Vec<Coding>);

        impl $type {
            /// The codings, in application order.
            pub fn codings(&self) -> &[Coding] {
                &self.0
            }
        }

        impl TypedHeader for $type {
            fn name() -> &'static http::header::HeaderName {
                header_name!($name)
            }

            fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
                let items = comma_items(values)?;
                if items.is_empty() {
                    return Err(ParseHeaderError::new("empty coding list"));
                }
                items
                    .iter()
                    .map(|item| Coding::parse_token(item))
                    .collect::<Result<Vec<_>, _>>()
                    .map($type)
            }

            fn encode(&self, values: &mut Vec<HeaderValue>) {
                values.push(join_value(
                    self.0.iter().map(|c| c.token().to_owned()),
                ));
            }
        }
    };
}

coding_list_header! {
    /// `Content-Encoding`: codings applied to the representation.
    ContentEncoding, http::header::CONTENT_ENCODING
}

coding_list_header! {
    /// `Transfer-Encoding`: codings applied to the message body in transit.
    TransferEncoding, http::header::TRANSFER_ENCODING
}

impl TransferEncoding {
    /// The canonical `chunked` value.
    pub fn chunked() -> Self {
        TransferEncoding(vec![Coding::Chunked])
    }

    /// Whether `chunked` is the final coding.
    pub fn is_chunked(&self) -> bool {
        self.0.last() == Some(&Coding::Chunked)
    }
}

/// `Content-Language`: natural language(s) of the representation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentLanguage(pub Vec<String>);

impl TypedHeader for ContentLanguage {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::CONTENT_LANGUAGE)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        let items = comma_items(values)?;
        if items.is_empty() {
            return Err(ParseHeaderError::new("empty language list"));
        }
        for item in &items {
            if !item
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
            {
                return Err(ParseHeaderError::new(format!("invalid language tag `{item}`")));
            }
        }
        Ok(ContentLanguage(items))
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(join_value(self.0.iter().cloned()));
    }
}

/// `Content-Disposition`: presentation hint, typically `inline` or
/// `attachment; filename="report.pdf"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDisposition {
    kind: String,
    filename: Option<String>,
    name: Option<String>,
}

impl ContentDisposition {
    /// `inline`.
    pub fn inline() -> Self {
        ContentDisposition {
            kind: "inline".to_owned(),
            filename: None,
            name: None,
        }
    }

    /// `attachment`, optionally with a filename.
    pub fn attachment(filename: Option<&str>) -> Self {
        ContentDisposition {
            kind: "attachment".to_owned(),
            filename: filename.map(str::to_owned),
            name: None,
        }
    }

    /// The disposition type, lowercased.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The `filename` parameter, if present.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// The `name` parameter (multipart form fields), if present.
    pub fn field_name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl TypedHeader for ContentDisposition {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::CONTENT_DISPOSITION)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        if values.len() != 1 {
            return Err(ParseHeaderError::new("expected exactly one value"));
        }
        let s = str_value(&values[0])?;
        let mut parts = s.split(';');
        let kind = parts
            .next()
            .map(str::trim)
            .filter(|k| is_token(k))
            .ok_or_else(|| ParseHeaderError::new("missing disposition type"))?
            .to_ascii_lowercase();
        let mut filename = None;
        let mut name = None;
        for part in parts {
            let (key, raw) = split_once_trim(part, '=')
                .ok_or_else(|| ParseHeaderError::new(format!("invalid parameter `{part}`")))?;
            match key.to_ascii_lowercase().as_str() {
                "filename" => filename = Some(unquote(raw)?),
                "name" => name = Some(unquote(raw)?),
                // unknown parameters (filename*, …) are preserved verbatim
                // nowhere; they are not part of the typed view
                _ => {}
            }
        }
        Ok(ContentDisposition {
            kind,
            filename,
            name,
        })
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        let mut out = self.kind.clone();
        if let Some(name) = &self.name {
            out.push_str("; name=");
            out.push_str(&quote_if_needed(name));
        }
        if let Some(filename) = &self.filename {
            out.push_str("; filename=");
            out.push_str(&quote_if_needed(filename));
        }
        values.push(HeaderValue::from_str(&out).unwrap_or_else(|_| HeaderValue::from_static("inline")));
    }
}

/// `Content-Range`: which slice of the representation a `206` body carries,
/// `bytes 0-4/16` or `bytes */16` for an unsatisfied range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentRange {
    range: Option<(u64, u64)>,
    complete_length: Option<u64>,
}

impl ContentRange {
    /// A satisfied range `first-last/complete`.
    pub fn bytes(first: u64, last: u64, complete_length: Option<u64>) -> Self {
        ContentRange {
            range: Some((first, last)),
            complete_length,
        }
    }

    /// The unsatisfied form `*/complete`.
    pub fn unsatisfied(complete_length: u64) -> Self {
        ContentRange {
            range: None,
            complete_length: Some(complete_length),
        }
    }

    /// The `(first, last)` byte positions, if satisfied.
    pub fn range(&self) -> Option<(u64, u64)> {
        self.range
    }

    /// The complete representation length, if known.
    pub fn complete_length(&self) -> Option<u64> {
        self.complete_length
    }
}

impl TypedHeader for ContentRange {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::CONTENT_RANGE)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        if values.len() != 1 {
            return Err(ParseHeaderError::new("expected exactly one value"));
        }
        let s = str_value(&values[0])?.trim();
        let rest = s
            .strip_prefix("bytes ")
            .ok_or_else(|| ParseHeaderError::new("only the bytes unit is supported"))?;
        let (range, complete) = rest
            .split_once('/')
            .ok_or_else(|| ParseHeaderError::new("missing `/`"))?;
        let complete_length = match complete.trim() {
            "*" => None,
            n => Some(
                n.parse::<u64>()
                    .map_err(|_| ParseHeaderError::new("invalid complete length"))?,
            ),
        };
        let range = match range.trim() {
            "*" => None,
            span => {
                let (first, last) = span
                    .split_once('-')
                    .ok_or_else(|| ParseHeaderError::new("invalid byte range"))?;
                let first: u64 = first
                    .parse()
                    .map_err(|_| ParseHeaderError::new("invalid first byte position"))?;
                let last: u64 = last
                    .parse()
                    .map_err(|_| ParseHeaderError::new("invalid last byte position"))?;
                if last < first {
                    return Err(ParseHeaderError::new("range end precedes start"));
                }
                Some((first, last))
            }
        };
        if range.is_none() && complete_length.is_none() {
            return Err(ParseHeaderError::new("`*/*` is not a valid content range"));
        }
        Ok(ContentRange {
            range,
            complete_length,
        })
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        let complete = match self.complete_length {
            Some(n) => n.to_string(),
            None => "*".to_owned(),
        };
        let rendered = match self.range {
            Some((first, last)) => format!("bytes {first}-{last}/{complete}"),
            None => format!("bytes */{complete}"),
        };
        values.push(
            HeaderValue::from_str(&rendered).unwrap_or_else(|_| HeaderValue::from_static("bytes */0")),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_round_trip() {
        let original = ContentType::new("text/html; charset=utf-8".parse().unwrap());
        let mut values = Vec::new();
        original.encode(&mut values);
        assert_eq!(ContentType::parse(&values).unwrap(), original);
    }

    #[test]
    fn content_length_agreeing_duplicates() {
        let values = [
            HeaderValue::from_static("10"),
            HeaderValue::from_static("10"),
        ];
        assert_eq!(ContentLength::parse(&values).unwrap().bytes(), 10);

        let values = [
            HeaderValue::from_static("10"),
            HeaderValue::from_static("11"),
        ];
        assert!(ContentLength::parse(&values).is_err());
    }

    #[test]
    fn transfer_encoding_chunked() {
        let values = [HeaderValue::from_static("gzip, chunked")];
        let te = TransferEncoding::parse(&values).unwrap();
        assert!(te.is_chunked());
        assert_eq!(te.codings()[0], Coding::Gzip);
    }

    #[test]
    fn disposition_with_quoted_filename() {
        let values = [HeaderValue::from_static(
            r#"attachment; filename="annual report.pdf""#,
        )];
        let cd = ContentDisposition::parse(&values).unwrap();
        assert_eq!(cd.kind(), "attachment");
        assert_eq!(cd.filename(), Some("annual report.pdf"));

        let mut encoded = Vec::new();
        cd.encode(&mut encoded);
        assert_eq!(ContentDisposition::parse(&encoded).unwrap(), cd);
    }

    #[test]
    fn content_range_forms() {
        let values = [HeaderValue::from_static("bytes 0-4/16")];
        let cr = ContentRange::parse(&values).unwrap();
        assert_eq!(cr.range(), Some((0, 4)));
        assert_eq!(cr.complete_length(), Some(16));

        let values = [HeaderValue::from_static("bytes */16")];
        let cr = ContentRange::parse(&values).unwrap();
        assert_eq!(cr.range(), None);

        let values = [HeaderValue::from_static("bytes 4-2/16")];
        assert!(ContentRange::parse(&values).is_err());
    }
}
