//! Typed HTTP headers over an ordered, case-insensitive multimap.
//!
//! Raw header values are kept verbatim as received. The first typed access
//! through [`Headers::get`] runs the header's codec and caches the parsed
//! value; later accesses are lookups. Nothing is parsed up front — most
//! headers of most requests are never read.
//!
//! Mutation always goes through a codec: [`Headers::with`] and
//! [`HeadersBuilder::typed`] encode the typed value into raw wire form, so a
//! `Headers` can never hold a typed lie.
//!
//! ```rust
//! use relic::headers::{Headers, typed::ContentType};
//!
//! let headers = Headers::builder()
//!     .typed(&ContentType::json())
//!     .build();
//!
//! let content_type = headers.get::<ContentType>().unwrap().unwrap();
//! assert_eq!(content_type.mime().essence_str(), "application/json");
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use http::header::{HeaderMap, HeaderName, HeaderValue};

pub mod typed;
pub(crate) mod util;

pub use self::util::Quality;

/// A typed header codec: how one recognized header parses from and encodes
/// to its raw wire values.
///
/// `parse` receives every raw value present under the header's name, in
/// order — headers that admit a list form (`Accept`, `Via`, …) see split
/// header lines the same as a single comma-joined line. `encode` appends the
/// wire form; most headers emit one value, `Set-Cookie` emits one per
/// cookie.
pub trait TypedHeader: Clone + Send + Sync + 'static {
    /// The header name this codec owns.
    fn name() -> &'static HeaderName;

    /// Decode the typed value from the raw values (never empty).
    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError>;

    /// Append the raw wire form of `self`.
    fn encode(&self, values: &mut Vec<HeaderValue>);
}

/// The reason a raw value did not parse as its typed header.
///
/// This is the codec-internal error; [`Headers::get`] wraps it into a
/// [`HeaderError`] carrying the header name and offending value.
#[derive(Clone, Debug)]
pub struct ParseHeaderError {
    reason: String,
}

impl ParseHeaderError {
    /// Create an error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        ParseHeaderError {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParseHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for ParseHeaderError {}

/// A header failed to parse as its typed form.
#[derive(Debug)]
pub struct HeaderError {
    name: HeaderName,
    value: String,
    reason: String,
}

impl HeaderError {
    pub(crate) fn new(name: &HeaderName, values: &[HeaderValue], cause: ParseHeaderError) -> Self {
        let value = values
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        HeaderError {
            name: name.clone(),
            value,
            reason: cause.reason,
        }
    }

    /// The header that failed.
    pub fn name(&self) -> &HeaderName {
        &self.name
    }

    /// The offending raw value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Why it failed.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid `{}` header `{}`: {}",
            self.name, self.value, self.reason
        )
    }
}

impl std::error::Error for HeaderError {}

/// An ordered, case-insensitive multimap of header names to raw values,
/// with a lazy cache of typed decodings.
///
/// Name grammar (RFC 7230 tokens) and value safety (no CR/LF) are enforced
/// by construction through [`HeaderName`] and [`HeaderValue`].
///
/// `Headers` is immutable; every transform returns a new instance. The
/// typed-value cache never transfers to a transformed copy.
pub struct Headers {
    map: HeaderMap,
    cache: Mutex<HashMap<HeaderName, Arc<dyn Any + Send + Sync>>>,
}

impl Headers {
    /// An empty header map.
    pub fn new() -> Self {
        Headers::from_map(HeaderMap::new())
    }

    /// Start building a header map.
    pub fn builder() -> HeadersBuilder {
        HeadersBuilder {
            map: HeaderMap::new(),
        }
    }

    pub(crate) fn from_map(map: HeaderMap) -> Self {
        Headers {
            map,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Decode the typed header `H`, caching the result.
    ///
    /// `Ok(None)` when the header is absent; an error when present but
    /// malformed. Parse failures are not cached, every access to a broken
    /// header reports it.
    pub fn get<H: TypedHeader>(&self) -> Result<Option<H>, HeaderError> {
        let name = H::name();
        let values: Vec<HeaderValue> = self.map.get_all(name).iter().cloned().collect();
        if values.is_empty() {
            return Ok(None);
        }
        if let Some(cached) = self.cache.lock().expect("header cache poisoned").get(name) {
            if let Some(typed) = cached.downcast_ref::<H>() {
                return Ok(Some(typed.clone()));
            }
        }
        let typed = H::parse(&values).map_err(|cause| HeaderError::new(name, &values, cause))?;
        self.cache
            .lock()
            .expect("header cache poisoned")
            .insert(name.clone(), Arc::new(typed.clone()));
        Ok(Some(typed))
    }

    /// Whether a header with `name` is present.
    pub fn contains(&self, name: &HeaderName) -> bool {
        self.map.contains_key(name)
    }

    /// All raw values under `name`, in order.
    pub fn raw(&self, name: &HeaderName) -> impl Iterator<Item = &HeaderValue> {
        self.map.get_all(name).iter()
    }

    /// The first raw value under `name`, as a string if it is visible ASCII.
    pub fn raw_str(&self, name: &HeaderName) -> Option<&str> {
        self.map.get(name).and_then(|v| v.to_str().ok())
    }

    /// A copy with `value` encoded under its header name, replacing any
    /// previous values of that header.
    pub fn with<H: TypedHeader>(&self, value: &H) -> Headers {
        let mut map = self.map.clone();
        replace_encoded(&mut map, value);
        Headers::from_map(map)
    }

    /// A copy with a raw `name: value` pair replacing previous values.
    pub fn with_raw(&self, name: HeaderName, value: HeaderValue) -> Headers {
        let mut map = self.map.clone();
        map.insert(name, value);
        Headers::from_map(map)
    }

    /// A copy without any value under `name`.
    pub fn without(&self, name: &HeaderName) -> Headers {
        let mut map = self.map.clone();
        map.remove(name);
        Headers::from_map(map)
    }

    /// Every `(name, value)` pair in order. Names repeat for multi-valued
    /// headers.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.map.iter()
    }

    /// Number of `(name, value)` pairs.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// `true` when no headers are present.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// A builder pre-seeded with this map's contents.
    pub fn to_builder(&self) -> HeadersBuilder {
        HeadersBuilder {
            map: self.map.clone(),
        }
    }

    /// Eagerly run the codec of every recognized header that is present.
    ///
    /// This is the strict-headers mode of the server: malformed values fail
    /// the request up front instead of at first typed access.
    pub fn validate_known(&self) -> Result<(), HeaderError> {
        typed::validate_known(self)
    }

    pub(crate) fn as_map(&self) -> &HeaderMap {
        &self.map
    }
}

impl Default for Headers {
    fn default() -> Self {
        Headers::new()
    }
}

impl Clone for Headers {
    fn clone(&self) -> Self {
        // the parse cache stays behind, it repopulates on access
        Headers::from_map(self.map.clone())
    }
}

impl PartialEq for Headers {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.map.iter().map(|(n, v)| (n.as_str(), v)))
            .finish()
    }
}

/// Accumulates header pairs and freezes them into a [`Headers`].
#[derive(Debug, Default)]
pub struct HeadersBuilder {
    map: HeaderMap,
}

impl HeadersBuilder {
    /// Encode `value` under its header name, replacing previous values.
    pub fn typed<H: TypedHeader>(mut self, value: &H) -> Self {
        replace_encoded(&mut self.map, value);
        self
    }

    /// Set a raw pair, replacing previous values of `name`.
    pub fn raw(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.map.insert(name, value);
        self
    }

    /// Append a raw pair, keeping previous values of `name`.
    pub fn append_raw(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.map.append(name, value);
        self
    }

    /// Freeze into an immutable [`Headers`].
    pub fn build(self) -> Headers {
        Headers::from_map(self.map)
    }
}

fn replace_encoded<H: TypedHeader>(map: &mut HeaderMap, value: &H) {
    let mut encoded = Vec::with_capacity(1);
    value.encode(&mut encoded);
    map.remove(H::name());
    for raw in encoded {
        map.append(H::name().clone(), raw);
    }
}

#[cfg(test)]
mod tests {
    use super::typed::{ContentLength, ContentType};
    use super::*;

    #[test]
    fn typed_access_is_cached() {
        let headers = Headers::builder()
            .raw(http::header::CONTENT_LENGTH, HeaderValue::from_static("42"))
            .build();

        let first = headers.get::<ContentLength>().unwrap().unwrap();
        let second = headers.get::<ContentLength>().unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.bytes(), 42);
    }

    #[test]
    fn absent_header_is_none() {
        let headers = Headers::new();
        assert!(headers.get::<ContentType>().unwrap().is_none());
    }

    #[test]
    fn malformed_header_reports_name_and_value() {
        let headers = Headers::builder()
            .raw(
                http::header::CONTENT_LENGTH,
                HeaderValue::from_static("forty-two"),
            )
            .build();

        let err = headers.get::<ContentLength>().unwrap_err();
        assert_eq!(err.name(), &http::header::CONTENT_LENGTH);
        assert_eq!(err.value(), "forty-two");
    }

    #[test]
    fn typed_mutation_encodes() {
        let headers = Headers::new().with(&ContentLength::new(7));
        assert_eq!(
            headers.raw_str(&http::header::CONTENT_LENGTH),
            Some("7")
        );
    }

    #[test]
    fn names_are_case_insensitive() {
        let headers = Headers::builder()
            .raw(
                HeaderName::from_static("x-custom"),
                HeaderValue::from_static("a"),
            )
            .build();
        assert!(headers.contains(&HeaderName::from_static("x-custom")));
        assert_eq!(
            headers.raw_str(&"X-Custom".parse::<HeaderName>().unwrap()),
            Some("a")
        );
    }

    #[test]
    fn transforms_do_not_alias() {
        let a = Headers::new().with(&ContentLength::new(1));
        let b = a.with(&ContentLength::new(2));
        assert_eq!(a.get::<ContentLength>().unwrap().unwrap().bytes(), 1);
        assert_eq!(b.get::<ContentLength>().unwrap().unwrap().bytes(), 2);
    }
}
