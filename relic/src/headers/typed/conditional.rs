//! Conditional-request headers: entity tags and date gates.

use std::fmt;
use std::time::SystemTime;

use http::header::HeaderValue;

use super::date::{date_header, parse_single_date, HttpDate};
use crate::headers::util::{comma_items, str_value};
use crate::headers::{ParseHeaderError, TypedHeader};

/// An entity tag: an opaque validator, optionally weak.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityTag {
    weak: bool,
    opaque: String,
}

impl EntityTag {
    /// A strong tag with the given opaque value (no quotes).
    pub fn strong(opaque: impl Into<String>) -> Self {
        EntityTag {
            weak: false,
            opaque: opaque.into(),
        }
    }

    /// A weak tag (`W/"…"`).
    pub fn weak(opaque: impl Into<String>) -> Self {
        EntityTag {
            weak: true,
            opaque: opaque.into(),
        }
    }

    /// Whether the tag is weak.
    pub fn is_weak(&self) -> bool {
        self.weak
    }

    /// The opaque value without quotes.
    pub fn opaque(&self) -> &str {
        &self.opaque
    }

    /// Strong comparison: both strong, same opaque value.
    pub fn strong_eq(&self, other: &EntityTag) -> bool {
        !self.weak && !other.weak && self.opaque == other.opaque
    }

    /// Weak comparison: same opaque value, weakness ignored.
    pub fn weak_eq(&self, other: &EntityTag) -> bool {
        self.opaque == other.opaque
    }

    pub(crate) fn parse_str(s: &str) -> Result<Self, ParseHeaderError> {
        let s = s.trim();
        let (weak, rest) = match s.strip_prefix("W/") {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let opaque = rest
            .strip_prefix('"')
            .and_then(|r| r.strip_suffix('"'))
            .ok_or_else(|| ParseHeaderError::new(format!("entity tag `{s}` is not quoted")))?;
        if opaque.bytes().any(|b| b == b'"' || b == b'\r' || b == b'\n') {
            return Err(ParseHeaderError::new("entity tag contains illegal bytes"));
        }
        Ok(EntityTag {
            weak,
            opaque: opaque.to_owned(),
        })
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.weak {
            write!(f, "W/\"{}\"", self.opaque)
        } else {
            write!(f, "\"{}\"", self.opaque)
        }
    }
}

/// `ETag`: the current representation's entity tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ETag(pub EntityTag);

impl TypedHeader for ETag {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::ETAG)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        if values.len() != 1 {
            return Err(ParseHeaderError::new("expected exactly one entity tag"));
        }
        EntityTag::parse_str(str_value(&values[0])?).map(ETag)
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        values.push(
            HeaderValue::from_str(&self.0.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("\"\"")),
        );
    }
}

/// A set of entity tags, or the wildcard `*`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagSet {
    /// `*`: matches any current representation.
    Any,
    /// An explicit list of tags.
    Tags(Vec<EntityTag>),
}

impl TagSet {
    /// Whether `tag` is matched under weak comparison (used by
    /// `If-None-Match`).
    pub fn matches_weak(&self, tag: &EntityTag) -> bool {
        match self {
            TagSet::Any => true,
            TagSet::Tags(tags) => tags.iter().any(|t| t.weak_eq(tag)),
        }
    }

    /// Whether `tag` is matched under strong comparison (used by
    /// `If-Match`).
    pub fn matches_strong(&self, tag: &EntityTag) -> bool {
        match self {
            TagSet::Any => true,
            TagSet::Tags(tags) => tags.iter().any(|t| t.strong_eq(tag)),
        }
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        let items = comma_items(values)?;
        if items.iter().any(|i| i == "*") {
            if items.len() != 1 {
                return Err(ParseHeaderError::new("`*` cannot be combined with tags"));
            }
            return Ok(TagSet::Any);
        }
        if items.is_empty() {
            return Err(ParseHeaderError::new("empty tag list"));
        }
        items
            .iter()
            .map(|item| EntityTag::parse_str(item))
            .collect::<Result<Vec<_>, _>>()
            .map(TagSet::Tags)
    }

    fn encode_into(&self, values: &mut Vec<HeaderValue>) {
        let rendered = match self {
            TagSet::Any => "*".to_owned(),
            TagSet::Tags(tags) => tags
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        };
        values.push(
            HeaderValue::from_str(&rendered).unwrap_or_else(|_| HeaderValue::from_static("*")),
        );
    }
}

macro_rules! tag_set_header {
    ($(#[$doc:meta])* $type:ident, $name:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub struct $type(pub TagSet);

        impl TypedHeader for $type {
            fn name() -> &'static http::header::HeaderName {
                header_name!($name)
            }

            fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
                TagSet::parse(values).map($type)
            }

            fn encode(&self, values: &mut Vec<HeaderValue>) {
                self.0.encode_into(values);
            }
        }
    };
}

tag_set_header! {
    /// `If-Match`: proceed only when one of the tags matches (strong).
    IfMatch, http::header::IF_MATCH
}

tag_set_header! {
    /// `If-None-Match`: proceed only when no tag matches (weak).
    IfNoneMatch, http::header::IF_NONE_MATCH
}

date_header! {
    /// `Last-Modified`: when the representation last changed.
    LastModified, http::header::LAST_MODIFIED
}

date_header! {
    /// `If-Modified-Since`: full response only when modified after this.
    IfModifiedSince, http::header::IF_MODIFIED_SINCE
}

date_header! {
    /// `If-Unmodified-Since`: proceed only when unmodified since this.
    IfUnmodifiedSince, http::header::IF_UNMODIFIED_SINCE
}

/// `If-Range`: honor an accompanying `Range` only when the validator still
/// matches; an entity tag or a date.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IfRange {
    /// Validate against the representation's entity tag.
    Tag(EntityTag),
    /// Validate against the representation's modification date.
    Date(HttpDate),
}

impl TypedHeader for IfRange {
    fn name() -> &'static http::header::HeaderName {
        header_name!(http::header::IF_RANGE)
    }

    fn parse(values: &[HeaderValue]) -> Result<Self, ParseHeaderError> {
        if values.len() != 1 {
            return Err(ParseHeaderError::new("expected exactly one value"));
        }
        let s = str_value(&values[0])?.trim();
        if s.starts_with('"') || s.starts_with("W/") {
            EntityTag::parse_str(s).map(IfRange::Tag)
        } else {
            parse_single_date(values).map(IfRange::Date)
        }
    }

    fn encode(&self, values: &mut Vec<HeaderValue>) {
        match self {
            IfRange::Tag(tag) => values.push(
                HeaderValue::from_str(&tag.to_string())
                    .unwrap_or_else(|_| HeaderValue::from_static("\"\"")),
            ),
            IfRange::Date(date) => values.push(date.to_value()),
        }
    }
}

impl IfRange {
    /// Whether the stored validator still selects the representation
    /// described by `etag` / `last_modified`.
    ///
    /// Tag comparison is strong, date comparison is exact to the second,
    /// per RFC 7233 §3.2.
    pub fn matches(&self, etag: Option<&EntityTag>, last_modified: Option<SystemTime>) -> bool {
        match self {
            IfRange::Tag(tag) => etag.is_some_and(|e| e.strong_eq(tag)),
            IfRange::Date(date) => {
                last_modified.is_some_and(|m| HttpDate::from(m) == *date)
            }
        }
    }
}
